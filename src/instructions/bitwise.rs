//! Bitwise operations: AND/OR/XOR with immediate forms, plus the inverted
//! variants AND_INV, OR_INV and XNOR. Always full 64-bit, no sign extension.

use crate::config::{
    OPCODE_AND, OPCODE_AND_IMM, OPCODE_AND_INV, OPCODE_OR, OPCODE_OR_IMM, OPCODE_OR_INV,
    OPCODE_XNOR, OPCODE_XOR, OPCODE_XOR_IMM,
};
use crate::instructions::base::{
    parse_three_registers, parse_two_registers_and_immediate, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

macro_rules! bitwise_reg {
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

macro_rules! bitwise_imm {
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

bitwise_reg!(And, OPCODE_AND, "AND", |a, b| a & b);
bitwise_reg!(Or, OPCODE_OR, "OR", |a, b| a | b);
bitwise_reg!(Xor, OPCODE_XOR, "XOR", |a, b| a ^ b);
bitwise_reg!(AndInv, OPCODE_AND_INV, "AND_INV", |a: u64, b: u64| a & !b);
bitwise_reg!(OrInv, OPCODE_OR_INV, "OR_INV", |a: u64, b: u64| a | !b);
bitwise_reg!(Xnor, OPCODE_XNOR, "XNOR", |a: u64, b: u64| !(a ^ b));

bitwise_imm!(AndImm, OPCODE_AND_IMM, "AND_IMM", |b, x| b & x);
bitwise_imm!(OrImm, OPCODE_OR_IMM, "OR_IMM", |b, x| b | x);
bitwise_imm!(XorImm, OPCODE_XOR_IMM, "XOR_IMM", |b, x| b ^ x);
