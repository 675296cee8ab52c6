//! Comparisons and conditional selection: SET_LT/SET_GT families, CMOV_IZ /
//! CMOV_NZ and MIN / MAX in signed and unsigned flavours.

use crate::config::{
    OPCODE_CMOV_IZ, OPCODE_CMOV_IZ_IMM, OPCODE_CMOV_NZ, OPCODE_CMOV_NZ_IMM, OPCODE_MAX,
    OPCODE_MAX_U, OPCODE_MIN, OPCODE_MIN_U, OPCODE_SET_GT_S_IMM, OPCODE_SET_GT_U_IMM,
    OPCODE_SET_LT_S, OPCODE_SET_LT_S_IMM, OPCODE_SET_LT_U, OPCODE_SET_LT_U_IMM,
};
use crate::instructions::base::{
    parse_three_registers, parse_two_registers_and_immediate, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

// reg_D = predicate(reg_A, reg_B) as 0/1.
macro_rules! set_cmp_reg {
    ($name:ident, $opcode:ident, $label:literal, $pred:expr) => {
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
                let hit = ($pred)(
                    context.registers[reg_a as usize],
                    context.registers[reg_b as usize],
                );
                context.registers[reg_d as usize] = u64::from(hit);
                InstructionResult::cont()
            }
        }
    };
}

// reg_A = predicate(reg_B, immed_X) as 0/1.
macro_rules! set_cmp_imm {
    ($name:ident, $opcode:ident, $label:literal, $pred:expr) => {
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
                let hit = ($pred)(context.registers[reg_b as usize], immediate as u64);
                context.registers[reg_a as usize] = u64::from(hit);
                InstructionResult::cont()
            }
        }
    };
}

set_cmp_reg!(SetLtU, OPCODE_SET_LT_U, "SET_LT_U", |a, b| a < b);
set_cmp_reg!(SetLtS, OPCODE_SET_LT_S, "SET_LT_S", |a, b| (a as i64) < (b as i64));
set_cmp_imm!(SetLtUImm, OPCODE_SET_LT_U_IMM, "SET_LT_U_IMM", |b, x| b < x);
set_cmp_imm!(SetLtSImm, OPCODE_SET_LT_S_IMM, "SET_LT_S_IMM", |b, x| (b as i64) < (x as i64));
set_cmp_imm!(SetGtUImm, OPCODE_SET_GT_U_IMM, "SET_GT_U_IMM", |b, x| b > x);
set_cmp_imm!(SetGtSImm, OPCODE_SET_GT_S_IMM, "SET_GT_S_IMM", |b, x| (b as i64) > (x as i64));

// reg_D = reg_A when reg_B passes the zero test, else unchanged.
macro_rules! cmov_reg {
    ($name:ident, $opcode:ident, $label:literal, $take:expr) => {
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
                if ($take)(context.registers[reg_b as usize]) {
                    context.registers[reg_d as usize] = context.registers[reg_a as usize];
                }
                InstructionResult::cont()
            }
        }
    };
}

// reg_A = immed_X when reg_B passes the zero test, else unchanged.
macro_rules! cmov_imm {
    ($name:ident, $opcode:ident, $label:literal, $take:expr) => {
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
                if ($take)(context.registers[reg_b as usize]) {
                    context.registers[reg_a as usize] = immediate as u64;
                }
                InstructionResult::cont()
            }
        }
    };
}

cmov_reg!(CmovIz, OPCODE_CMOV_IZ, "CMOV_IZ", |b| b == 0);
cmov_reg!(CmovNz, OPCODE_CMOV_NZ, "CMOV_NZ", |b| b != 0);
cmov_imm!(CmovIzImm, OPCODE_CMOV_IZ_IMM, "CMOV_IZ_IMM", |b| b == 0);
cmov_imm!(CmovNzImm, OPCODE_CMOV_NZ_IMM, "CMOV_NZ_IMM", |b| b != 0);

macro_rules! min_max {
    ($name:ident, $opcode:ident, $label:literal, $pick:expr) => {
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
                context.registers[reg_d as usize] = ($pick)(
                    context.registers[reg_a as usize],
                    context.registers[reg_b as usize],
                );
                InstructionResult::cont()
            }
        }
    };
}

min_max!(Min, OPCODE_MIN, "MIN", |a: u64, b: u64| if (a as i64) < (b as i64) { a } else { b });
min_max!(Max, OPCODE_MAX, "MAX", |a: u64, b: u64| if (a as i64) > (b as i64) { a } else { b });
min_max!(MinU, OPCODE_MIN_U, "MIN_U", u64::min);
min_max!(MaxU, OPCODE_MAX_U, "MAX_U", u64::max);
