//! Arithmetic: add/sub/mul/div/rem in 32- and 64-bit widths, immediate
//! forms, negated-add immediates and the upper-half multiplies.
//!
//! 32-bit operations compute modulo 2^32 and write their destination
//! sign-extended to 64 bits. Division never traps: divide-by-zero yields
//! 2^64-1, `INT_MIN / -1` yields the unsigned representation of `INT_MIN`;
//! remainder-by-zero yields the dividend and `INT_MIN mod -1` yields 0.

use crate::config::{
    OPCODE_ADD_32, OPCODE_ADD_64, OPCODE_ADD_IMM_32, OPCODE_ADD_IMM_64, OPCODE_DIV_S_32,
    OPCODE_DIV_S_64, OPCODE_DIV_U_32, OPCODE_DIV_U_64, OPCODE_MUL_32, OPCODE_MUL_64,
    OPCODE_MUL_IMM_32, OPCODE_MUL_IMM_64, OPCODE_MUL_UPPER_S_S, OPCODE_MUL_UPPER_S_U,
    OPCODE_MUL_UPPER_U_U, OPCODE_NEG_ADD_IMM_32, OPCODE_NEG_ADD_IMM_64, OPCODE_REM_S_32,
    OPCODE_REM_S_64, OPCODE_REM_U_32, OPCODE_REM_U_64, OPCODE_SUB_32, OPCODE_SUB_64,
};
use crate::instructions::base::{
    parse_three_registers, parse_two_registers_and_immediate, sign_extend, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

/// Write a 32-bit result: keep the low half, sign-extend to 64.
fn set_reg_32(registers: &mut [u64; 13], reg: u8, value: u64) {
    registers[reg as usize] = sign_extend(value & 0xffff_ffff, 4);
}

// --- Scalar operations, shared by register and immediate forms ---

fn add_32(a: u64, b: u64) -> u64 {
    a.wrapping_add(b) & 0xffff_ffff
}

fn sub_32(a: u64, b: u64) -> u64 {
    (a & 0xffff_ffff).wrapping_sub(b & 0xffff_ffff) & 0xffff_ffff
}

fn mul_32(a: u64, b: u64) -> u64 {
    (a & 0xffff_ffff).wrapping_mul(b & 0xffff_ffff) & 0xffff_ffff
}

fn div_u_32(a: u64, b: u64) -> u64 {
    let (a, b) = (a & 0xffff_ffff, b & 0xffff_ffff);
    if b == 0 {
        return u64::MAX;
    }
    sign_extend(a / b, 4)
}

fn div_s_32(a: u64, b: u64) -> u64 {
    let (a, b) = (a & 0xffff_ffff, b & 0xffff_ffff);
    if b == 0 {
        return u64::MAX;
    }
    if a == 0x8000_0000 && b == 0xffff_ffff {
        return sign_extend(a, 4);
    }
    let q = (sign_extend(a, 4) as i64) / (sign_extend(b, 4) as i64);
    sign_extend(q as u64 & 0xffff_ffff, 4)
}

fn rem_u_32(a: u64, b: u64) -> u64 {
    let (a, b) = (a & 0xffff_ffff, b & 0xffff_ffff);
    sign_extend(if b == 0 { a } else { a % b }, 4)
}

fn rem_s_32(a: u64, b: u64) -> u64 {
    let (a, b) = (a & 0xffff_ffff, b & 0xffff_ffff);
    if a == 0x8000_0000 && b == 0xffff_ffff {
        return 0;
    }
    if b == 0 {
        return sign_extend(a, 4);
    }
    let r = (sign_extend(a, 4) as i64) % (sign_extend(b, 4) as i64);
    sign_extend(r as u64 & 0xffff_ffff, 4)
}

fn div_u_64(a: u64, b: u64) -> u64 {
    if b == 0 {
        u64::MAX
    } else {
        a / b
    }
}

fn div_s_64(a: u64, b: u64) -> u64 {
    if b == 0 {
        return u64::MAX;
    }
    (a as i64).wrapping_div(b as i64) as u64
}

fn rem_u_64(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        a % b
    }
}

fn rem_s_64(a: u64, b: u64) -> u64 {
    if b == 0 {
        return a;
    }
    (a as i64).wrapping_rem(b as i64) as u64
}

// --- Handler families ---

// Three-register form: reg_D = op(reg_A, reg_B); the op yields a
// ready-to-store 64-bit value (32-bit ops return a pre-extended result).
macro_rules! binary_reg {
    ($name:ident, $opcode:ident, $label:literal, $op:expr, extend32) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (reg_d, reg_a, reg_b) = parse_three_registers(context.operands);
                let result = ($op)(
                    context.registers[reg_a as usize],
                    context.registers[reg_b as usize],
                );
                set_reg_32(context.registers, reg_d, result);
                InstructionResult::cont()
            }
        }
    };
    ($name:ident, $opcode:ident, $label:literal, $op:expr) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (reg_d, reg_a, reg_b) = parse_three_registers(context.operands);
                context.registers[reg_d as usize] = ($op)(
                    context.registers[reg_a as usize],
                    context.registers[reg_b as usize],
                );
                InstructionResult::cont()
            }
        }
    };
}

binary_reg!(Add32, OPCODE_ADD_32, "ADD_32", add_32, extend32);
binary_reg!(Sub32, OPCODE_SUB_32, "SUB_32", sub_32, extend32);
binary_reg!(Mul32, OPCODE_MUL_32, "MUL_32", mul_32, extend32);
binary_reg!(DivU32, OPCODE_DIV_U_32, "DIV_U_32", div_u_32);
binary_reg!(DivS32, OPCODE_DIV_S_32, "DIV_S_32", div_s_32);
binary_reg!(RemU32, OPCODE_REM_U_32, "REM_U_32", rem_u_32);
binary_reg!(RemS32, OPCODE_REM_S_32, "REM_S_32", rem_s_32);
binary_reg!(Add64, OPCODE_ADD_64, "ADD_64", u64::wrapping_add);
binary_reg!(Sub64, OPCODE_SUB_64, "SUB_64", u64::wrapping_sub);
binary_reg!(Mul64, OPCODE_MUL_64, "MUL_64", u64::wrapping_mul);
binary_reg!(DivU64, OPCODE_DIV_U_64, "DIV_U_64", div_u_64);
binary_reg!(DivS64, OPCODE_DIV_S_64, "DIV_S_64", div_s_64);
binary_reg!(RemU64, OPCODE_REM_U_64, "REM_U_64", rem_u_64);
binary_reg!(RemS64, OPCODE_REM_S_64, "REM_S_64", rem_s_64);

// Immediate form: reg_A = op(reg_B, immed_X).
macro_rules! binary_imm {
    ($name:ident, $opcode:ident, $label:literal, $op:expr, extend32) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (reg_a, reg_b, immediate) =
                    parse_two_registers_and_immediate(context.operands, context.fskip);
                let result = ($op)(context.registers[reg_b as usize], immediate as u64);
                set_reg_32(context.registers, reg_a, result);
                InstructionResult::cont()
            }
        }
    };
    ($name:ident, $opcode:ident, $label:literal, $op:expr) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (reg_a, reg_b, immediate) =
                    parse_two_registers_and_immediate(context.operands, context.fskip);
                context.registers[reg_a as usize] =
                    ($op)(context.registers[reg_b as usize], immediate as u64);
                InstructionResult::cont()
            }
        }
    };
}

binary_imm!(AddImm32, OPCODE_ADD_IMM_32, "ADD_IMM_32", add_32, extend32);
binary_imm!(MulImm32, OPCODE_MUL_IMM_32, "MUL_IMM_32", mul_32, extend32);
binary_imm!(NegAddImm32, OPCODE_NEG_ADD_IMM_32, "NEG_ADD_IMM_32", |b, x| sub_32(x, b), extend32);
binary_imm!(AddImm64, OPCODE_ADD_IMM_64, "ADD_IMM_64", u64::wrapping_add);
binary_imm!(MulImm64, OPCODE_MUL_IMM_64, "MUL_IMM_64", u64::wrapping_mul);
binary_imm!(NegAddImm64, OPCODE_NEG_ADD_IMM_64, "NEG_ADD_IMM_64", |b: u64, x: u64| x.wrapping_sub(b));

// Upper-half multiplies.
binary_reg!(MulUpperSS, OPCODE_MUL_UPPER_S_S, "MUL_UPPER_S_S", |a, b| {
    ((i128::from(a as i64) * i128::from(b as i64)) >> 64) as u64
});
binary_reg!(MulUpperUU, OPCODE_MUL_UPPER_U_U, "MUL_UPPER_U_U", |a, b| {
    ((u128::from(a) * u128::from(b)) >> 64) as u64
});
binary_reg!(MulUpperSU, OPCODE_MUL_UPPER_S_U, "MUL_UPPER_S_U", |a, b| {
    ((i128::from(a as i64) * i128::from(b)) >> 64) as u64
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GasModel, OPCODE_ADD_32, OPCODE_DIV_U_32};
    use crate::parser::Program;
    use crate::ram::PagedRam;
    use crate::pvm::Pvm;

    #[test]
    fn division_by_zero_never_traps() {
        assert_eq!(div_u_32(7, 0), u64::MAX);
        assert_eq!(div_s_32(7, 0), u64::MAX);
        assert_eq!(div_u_64(7, 0), u64::MAX);
        assert_eq!(div_s_64(7, 0), u64::MAX);
        assert_eq!(rem_u_32(7, 0), 7);
        assert_eq!(rem_s_32(7, 0), 7);
        assert_eq!(rem_u_64(7, 0), 7);
        assert_eq!(rem_s_64(7, 0), 7);
    }

    #[test]
    fn signed_overflow_cases() {
        // INT_MIN / -1 yields the unsigned representation of INT_MIN.
        assert_eq!(div_s_32(0x8000_0000, 0xffff_ffff), 0xFFFF_FFFF_8000_0000);
        assert_eq!(div_s_64(i64::MIN as u64, u64::MAX), i64::MIN as u64);
        // INT_MIN mod -1 yields 0.
        assert_eq!(rem_s_32(0x8000_0000, 0xffff_ffff), 0);
        assert_eq!(rem_s_64(i64::MIN as u64, u64::MAX), 0);
    }

    #[test]
    fn signed_remainder_follows_the_dividend_sign() {
        // -7 mod 3 = -1, 7 mod -3 = 1.
        assert_eq!(rem_s_64((-7i64) as u64, 3), (-1i64) as u64);
        assert_eq!(rem_s_64(7, (-3i64) as u64), 1);
        assert_eq!(rem_s_32(0xFFFF_FFF9, 3), (-1i64) as u64);
    }

    #[test]
    fn thirty_two_bit_results_are_sign_extended() {
        assert_eq!(add_32(0x7FFF_FFFF, 1), 0x8000_0000);
        assert_eq!(sign_extend(add_32(0x7FFF_FFFF, 1), 4), 0xFFFF_FFFF_8000_0000);
        assert_eq!(sub_32(0, 1), 0xFFFF_FFFF);
        assert_eq!(mul_32(0xFFFF_FFFF, 2), 0xFFFF_FFFE);
    }

    fn run_one(code: Vec<u8>, bitmask: Vec<u8>, registers: [u64; 13]) -> Pvm {
        let program = Program::from_parts(code, bitmask, vec![]);
        let mut vm = Pvm::new(program, 0, 10, registers, PagedRam::new(), GasModel::default());
        assert!(vm.step());
        vm
    }

    #[test]
    fn add_32_overflow_through_the_vm() {
        // r3 = r1 + r2 with r1 = 0x7FFFFFFF, r2 = 1.
        let mut registers = [0u64; 13];
        registers[1] = 0x7FFF_FFFF;
        registers[2] = 1;
        let vm = run_one(vec![OPCODE_ADD_32, 0x21, 0x03], vec![1, 0, 0], registers);
        assert_eq!(vm.registers[3], 0xFFFF_FFFF_8000_0000);
        assert_eq!(vm.registers[3] & 0xffff_ffff, 0x8000_0000);
        assert_eq!(vm.gas, 9);
    }

    #[quickcheck_macros::quickcheck]
    fn thirty_two_bit_destinations_have_coherent_high_halves(a: u32, b: u32) -> bool {
        // For every 32-bit op the high half of the destination is all zeros
        // or all ones, matching bit 31 of the low half.
        [
            add_32(u64::from(a), u64::from(b)),
            sub_32(u64::from(a), u64::from(b)),
            mul_32(u64::from(a), u64::from(b)),
        ]
        .into_iter()
        .map(|low| sign_extend(low, 4))
        .chain([
            div_u_32(u64::from(a), u64::from(b)),
            rem_u_32(u64::from(a), u64::from(b)),
            div_s_32(u64::from(a), u64::from(b)),
            rem_s_32(u64::from(a), u64::from(b)),
        ])
        .all(|v| {
            let high = v >> 32;
            let bit31 = (v >> 31) & 1;
            (bit31 == 1 && high == 0xffff_ffff) || (bit31 == 0 && high == 0)
        })
    }

    #[test]
    fn div_u_32_by_zero_through_the_vm() {
        // r3 = r1 / r2 with r2 = 0.
        let mut registers = [0u64; 13];
        registers[1] = 1234;
        let vm = run_one(vec![OPCODE_DIV_U_32, 0x21, 0x03], vec![1, 0, 0], registers);
        assert_eq!(vm.registers[3], 0xFFFF_FFFF_FFFF_FFFF);
        assert_eq!(vm.gas, 9);
    }
}
