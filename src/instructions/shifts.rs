//! Shifts and rotates: logical left/right, arithmetic right and rotations
//! in 32- and 64-bit widths, as register, immediate and alt-immediate forms
//! (the alt forms swap which operand supplies the shifted value and which
//! the amount). Shift amounts are always taken modulo the width.

use crate::config::{
    OPCODE_ROT_L_32, OPCODE_ROT_L_64, OPCODE_ROT_R_32, OPCODE_ROT_R_32_IMM,
    OPCODE_ROT_R_32_IMM_ALT, OPCODE_ROT_R_64, OPCODE_ROT_R_64_IMM, OPCODE_ROT_R_64_IMM_ALT,
    OPCODE_SHAR_R_32, OPCODE_SHAR_R_IMM_32, OPCODE_SHAR_R_IMM_64, OPCODE_SHAR_R_IMM_ALT_32,
    OPCODE_SHAR_R_IMM_ALT_64, OPCODE_SHAR_R_64, OPCODE_SHLO_L_32, OPCODE_SHLO_L_64,
    OPCODE_SHLO_L_IMM_32, OPCODE_SHLO_L_IMM_64, OPCODE_SHLO_L_IMM_ALT_32,
    OPCODE_SHLO_L_IMM_ALT_64, OPCODE_SHLO_R_32, OPCODE_SHLO_R_64, OPCODE_SHLO_R_IMM_32,
    OPCODE_SHLO_R_IMM_64, OPCODE_SHLO_R_IMM_ALT_32, OPCODE_SHLO_R_IMM_ALT_64,
};
use crate::instructions::base::{
    parse_three_registers, parse_two_registers_and_immediate, sign_extend, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

// 32-bit ops mask the value, shift modulo 32 and sign-extend the result.

fn shlo_l_32(value: u64, amount: u64) -> u64 {
    sign_extend(((value & 0xffff_ffff) << (amount % 32)) & 0xffff_ffff, 4)
}

fn shlo_r_32(value: u64, amount: u64) -> u64 {
    sign_extend((value & 0xffff_ffff) >> (amount % 32), 4)
}

fn shar_r_32(value: u64, amount: u64) -> u64 {
    let shifted = (sign_extend(value & 0xffff_ffff, 4) as i64) >> (amount % 32);
    sign_extend(shifted as u64 & 0xffff_ffff, 4)
}

fn rot_r_32(value: u64, amount: u64) -> u64 {
    sign_extend(u64::from(((value & 0xffff_ffff) as u32).rotate_right((amount % 32) as u32)), 4)
}

fn rot_l_32(value: u64, amount: u64) -> u64 {
    sign_extend(u64::from(((value & 0xffff_ffff) as u32).rotate_left((amount % 32) as u32)), 4)
}

fn shlo_l_64(value: u64, amount: u64) -> u64 {
    value << (amount % 64)
}

fn shlo_r_64(value: u64, amount: u64) -> u64 {
    value >> (amount % 64)
}

fn shar_r_64(value: u64, amount: u64) -> u64 {
    ((value as i64) >> (amount % 64)) as u64
}

fn rot_r_64(value: u64, amount: u64) -> u64 {
    value.rotate_right((amount % 64) as u32)
}

fn rot_l_64(value: u64, amount: u64) -> u64 {
    value.rotate_left((amount % 64) as u32)
}

// Three-register form: reg_D = op(reg_A, amount = reg_B).
macro_rules! shift_reg {
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

// Immediate form: reg_A = op(reg_B, amount = immed_X).
macro_rules! shift_imm {
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

// Alt-immediate form: reg_A = op(immed_X, amount = reg_B).
macro_rules! shift_imm_alt {
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
                    ($op)(immediate as u64, context.registers[reg_b as usize]);
                InstructionResult::cont()
            }
        }
    };
}

shift_reg!(ShloL32, OPCODE_SHLO_L_32, "SHLO_L_32", shlo_l_32);
shift_reg!(ShloR32, OPCODE_SHLO_R_32, "SHLO_R_32", shlo_r_32);
shift_reg!(SharR32, OPCODE_SHAR_R_32, "SHAR_R_32", shar_r_32);
shift_reg!(ShloL64, OPCODE_SHLO_L_64, "SHLO_L_64", shlo_l_64);
shift_reg!(ShloR64, OPCODE_SHLO_R_64, "SHLO_R_64", shlo_r_64);
shift_reg!(SharR64, OPCODE_SHAR_R_64, "SHAR_R_64", shar_r_64);
shift_reg!(RotL32, OPCODE_ROT_L_32, "ROT_L_32", rot_l_32);
shift_reg!(RotL64, OPCODE_ROT_L_64, "ROT_L_64", rot_l_64);
shift_reg!(RotR32, OPCODE_ROT_R_32, "ROT_R_32", rot_r_32);
shift_reg!(RotR64, OPCODE_ROT_R_64, "ROT_R_64", rot_r_64);

shift_imm!(ShloLImm32, OPCODE_SHLO_L_IMM_32, "SHLO_L_IMM_32", shlo_l_32);
shift_imm!(ShloRImm32, OPCODE_SHLO_R_IMM_32, "SHLO_R_IMM_32", shlo_r_32);
shift_imm!(SharRImm32, OPCODE_SHAR_R_IMM_32, "SHAR_R_IMM_32", shar_r_32);
shift_imm!(ShloLImm64, OPCODE_SHLO_L_IMM_64, "SHLO_L_IMM_64", shlo_l_64);
shift_imm!(ShloRImm64, OPCODE_SHLO_R_IMM_64, "SHLO_R_IMM_64", shlo_r_64);
shift_imm!(SharRImm64, OPCODE_SHAR_R_IMM_64, "SHAR_R_IMM_64", shar_r_64);
shift_imm!(RotR32Imm, OPCODE_ROT_R_32_IMM, "ROT_R_32_IMM", rot_r_32);
shift_imm!(RotR64Imm, OPCODE_ROT_R_64_IMM, "ROT_R_64_IMM", rot_r_64);

shift_imm_alt!(ShloLImmAlt32, OPCODE_SHLO_L_IMM_ALT_32, "SHLO_L_IMM_ALT_32", shlo_l_32);
shift_imm_alt!(ShloRImmAlt32, OPCODE_SHLO_R_IMM_ALT_32, "SHLO_R_IMM_ALT_32", shlo_r_32);
shift_imm_alt!(SharRImmAlt32, OPCODE_SHAR_R_IMM_ALT_32, "SHAR_R_IMM_ALT_32", shar_r_32);
shift_imm_alt!(ShloLImmAlt64, OPCODE_SHLO_L_IMM_ALT_64, "SHLO_L_IMM_ALT_64", shlo_l_64);
shift_imm_alt!(ShloRImmAlt64, OPCODE_SHLO_R_IMM_ALT_64, "SHLO_R_IMM_ALT_64", shlo_r_64);
shift_imm_alt!(SharRImmAlt64, OPCODE_SHAR_R_IMM_ALT_64, "SHAR_R_IMM_ALT_64", shar_r_64);
shift_imm_alt!(RotR32ImmAlt, OPCODE_ROT_R_32_IMM_ALT, "ROT_R_32_IMM_ALT", rot_r_32);
shift_imm_alt!(RotR64ImmAlt, OPCODE_ROT_R_64_IMM_ALT, "ROT_R_64_IMM_ALT", rot_r_64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_amounts_wrap_at_the_width() {
        assert_eq!(shlo_l_32(1, 33), 2);
        assert_eq!(shlo_l_64(1, 65), 2);
        assert_eq!(shlo_r_32(4, 34), 1);
        assert_eq!(shlo_r_64(4, 66), 1);
    }

    #[test]
    fn left_shift_32_sign_extends_the_result() {
        // 1 << 31 sets bit 31, so the high half fills with ones.
        assert_eq!(shlo_l_32(1, 31), 0xFFFF_FFFF_8000_0000);
    }

    #[test]
    fn arithmetic_right_shift_keeps_the_sign() {
        assert_eq!(shar_r_32(0x8000_0000, 4), 0xFFFF_FFFF_F800_0000);
        assert_eq!(shar_r_64(i64::MIN as u64, 63), u64::MAX);
        assert_eq!(shar_r_64(8, 2), 2);
    }

    #[test]
    fn rotations_are_width_local() {
        assert_eq!(rot_r_64(1, 1), 1 << 63);
        assert_eq!(rot_l_64(1 << 63, 1), 1);
        assert_eq!(rot_r_32(1, 1), 0xFFFF_FFFF_8000_0000);
        assert_eq!(rot_l_32(0x8000_0000, 1), 1);
    }
}
