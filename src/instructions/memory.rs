//! Loads and stores: immediate, direct and register-indirect addressing in
//! every width, plus LOAD_IMM / LOAD_IMM_64. Signed loads sign-extend,
//! unsigned loads zero-extend; all addresses are 32-bit. Access-rights
//! violations report FAULT with the offending page base.

use crate::config::{
    OPCODE_LOAD_I16, OPCODE_LOAD_I32, OPCODE_LOAD_I8, OPCODE_LOAD_IMM, OPCODE_LOAD_IMM_64,
    OPCODE_LOAD_IND_I16, OPCODE_LOAD_IND_I32, OPCODE_LOAD_IND_I8, OPCODE_LOAD_IND_U16,
    OPCODE_LOAD_IND_U32, OPCODE_LOAD_IND_U64, OPCODE_LOAD_IND_U8, OPCODE_LOAD_U16,
    OPCODE_LOAD_U32, OPCODE_LOAD_U64, OPCODE_LOAD_U8, OPCODE_STORE_IMM_IND_U16,
    OPCODE_STORE_IMM_IND_U32, OPCODE_STORE_IMM_IND_U64, OPCODE_STORE_IMM_IND_U8,
    OPCODE_STORE_IMM_U16, OPCODE_STORE_IMM_U32, OPCODE_STORE_IMM_U64, OPCODE_STORE_IMM_U8,
    OPCODE_STORE_IND_U16, OPCODE_STORE_IND_U32, OPCODE_STORE_IND_U64, OPCODE_STORE_IND_U8,
    OPCODE_STORE_U16, OPCODE_STORE_U32, OPCODE_STORE_U64, OPCODE_STORE_U8,
};
use crate::instructions::base::{
    bytes_to_value_le, immediate_unsigned, parse_one_register_and_immediate,
    parse_register_and_two_immediates, parse_two_immediates, parse_two_registers_and_immediate,
    reg_low, sign_extend, value_to_bytes_le, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

fn load_into(
    context: &mut InstructionContext<'_>,
    reg: u8,
    address: u32,
    size: usize,
    signed: bool,
) -> InstructionResult {
    match context.ram.read_octets(address, size as u32) {
        Ok(bytes) => {
            let raw = bytes_to_value_le(&bytes);
            let value = if signed { sign_extend(raw, size as i32) } else { raw };
            context.registers[reg as usize] = value;
            InstructionResult::cont()
        }
        Err(fault) => InstructionResult::fault(fault),
    }
}

fn store_from(context: &mut InstructionContext<'_>, address: u32, value: u64, size: usize) -> InstructionResult {
    match context.ram.write_octets(address, &value_to_bytes_le(value, size)) {
        Ok(()) => InstructionResult::cont(),
        Err(fault) => InstructionResult::fault(fault),
    }
}

/// LOAD_IMM_64: `reg_A = immed` (full 8 raw bytes, no sign games).
pub struct LoadImm64;

impl InstructionHandler for LoadImm64 {
    fn opcode(&self) -> u8 {
        OPCODE_LOAD_IMM_64
    }
    fn name(&self) -> &'static str {
        "LOAD_IMM_64"
    }
    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let reg = reg_low(context.operands.first().copied().unwrap_or(0));
        let value = immediate_unsigned(context.operands, 1, 8);
        context.registers[reg as usize] = value;
        InstructionResult::cont()
    }
}

/// LOAD_IMM: `reg_A = sext(immed_X)`.
pub struct LoadImm;

impl InstructionHandler for LoadImm {
    fn opcode(&self) -> u8 {
        OPCODE_LOAD_IMM
    }
    fn name(&self) -> &'static str {
        "LOAD_IMM"
    }
    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (reg, immediate) = parse_one_register_and_immediate(context.operands, context.fskip);
        context.registers[reg as usize] = immediate as u64;
        InstructionResult::cont()
    }
}

// Direct loads: address is an unsigned immediate.
macro_rules! load_direct {
    ($name:ident, $opcode:ident, $label:literal, $size:expr, $signed:expr) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let reg = reg_low(context.operands.first().copied().unwrap_or(0));
                let length = (context.fskip - 1).clamp(0, 4);
                let address = immediate_unsigned(context.operands, 1, length) as u32;
                load_into(context, reg, address, $size, $signed)
            }
        }
    };
}

load_direct!(LoadU8, OPCODE_LOAD_U8, "LOAD_U8", 1, false);
load_direct!(LoadI8, OPCODE_LOAD_I8, "LOAD_I8", 1, true);
load_direct!(LoadU16, OPCODE_LOAD_U16, "LOAD_U16", 2, false);
load_direct!(LoadI16, OPCODE_LOAD_I16, "LOAD_I16", 2, true);
load_direct!(LoadU32, OPCODE_LOAD_U32, "LOAD_U32", 4, false);
load_direct!(LoadI32, OPCODE_LOAD_I32, "LOAD_I32", 4, true);
load_direct!(LoadU64, OPCODE_LOAD_U64, "LOAD_U64", 8, false);

// Direct stores: value from reg_A, address from an unsigned immediate.
macro_rules! store_direct {
    ($name:ident, $opcode:ident, $label:literal, $size:expr) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let reg = reg_low(context.operands.first().copied().unwrap_or(0));
                let length = (context.fskip - 1).clamp(0, 4);
                let address = immediate_unsigned(context.operands, 1, length) as u32;
                let value = context.registers[reg as usize];
                store_from(context, address, value, $size)
            }
        }
    };
}

store_direct!(StoreU8, OPCODE_STORE_U8, "STORE_U8", 1);
store_direct!(StoreU16, OPCODE_STORE_U16, "STORE_U16", 2);
store_direct!(StoreU32, OPCODE_STORE_U32, "STORE_U32", 4);
store_direct!(StoreU64, OPCODE_STORE_U64, "STORE_U64", 8);

// Immediate stores: address from immed_X, value from immed_Y.
macro_rules! store_imm {
    ($name:ident, $opcode:ident, $label:literal, $size:expr) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (immediate_x, immediate_y) =
                    parse_two_immediates(context.operands, context.fskip);
                let address = (immediate_x as u64 & 0xffff_ffff) as u32;
                store_from(context, address, immediate_y as u64, $size)
            }
        }
    };
}

store_imm!(StoreImmU8, OPCODE_STORE_IMM_U8, "STORE_IMM_U8", 1);
store_imm!(StoreImmU16, OPCODE_STORE_IMM_U16, "STORE_IMM_U16", 2);
store_imm!(StoreImmU32, OPCODE_STORE_IMM_U32, "STORE_IMM_U32", 4);
store_imm!(StoreImmU64, OPCODE_STORE_IMM_U64, "STORE_IMM_U64", 8);

// Immediate-indirect stores: address = reg_A + immed_X, value = immed_Y.
macro_rules! store_imm_ind {
    ($name:ident, $opcode:ident, $label:literal, $size:expr) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (reg, immediate_x, immediate_y) =
                    parse_register_and_two_immediates(context.operands, context.fskip);
                let address = (context.registers[reg as usize]
                    .wrapping_add(immediate_x as u64)
                    & 0xffff_ffff) as u32;
                store_from(context, address, immediate_y as u64, $size)
            }
        }
    };
}

store_imm_ind!(StoreImmIndU8, OPCODE_STORE_IMM_IND_U8, "STORE_IMM_IND_U8", 1);
store_imm_ind!(StoreImmIndU16, OPCODE_STORE_IMM_IND_U16, "STORE_IMM_IND_U16", 2);
store_imm_ind!(StoreImmIndU32, OPCODE_STORE_IMM_IND_U32, "STORE_IMM_IND_U32", 4);
store_imm_ind!(StoreImmIndU64, OPCODE_STORE_IMM_IND_U64, "STORE_IMM_IND_U64", 8);

// Register-indirect loads: reg_A = mem[reg_B + immed_X].
macro_rules! load_ind {
    ($name:ident, $opcode:ident, $label:literal, $size:expr, $signed:expr) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (reg_a, reg_b, immediate_x) =
                    parse_two_registers_and_immediate(context.operands, context.fskip);
                let address = (context.registers[reg_b as usize]
                    .wrapping_add(immediate_x as u64)
                    & 0xffff_ffff) as u32;
                load_into(context, reg_a, address, $size, $signed)
            }
        }
    };
}

load_ind!(LoadIndU8, OPCODE_LOAD_IND_U8, "LOAD_IND_U8", 1, false);
load_ind!(LoadIndI8, OPCODE_LOAD_IND_I8, "LOAD_IND_I8", 1, true);
load_ind!(LoadIndU16, OPCODE_LOAD_IND_U16, "LOAD_IND_U16", 2, false);
load_ind!(LoadIndI16, OPCODE_LOAD_IND_I16, "LOAD_IND_I16", 2, true);
load_ind!(LoadIndU32, OPCODE_LOAD_IND_U32, "LOAD_IND_U32", 4, false);
load_ind!(LoadIndI32, OPCODE_LOAD_IND_I32, "LOAD_IND_I32", 4, true);
load_ind!(LoadIndU64, OPCODE_LOAD_IND_U64, "LOAD_IND_U64", 8, false);

// Register-indirect stores: mem[reg_B + immed_X] = reg_A.
macro_rules! store_ind {
    ($name:ident, $opcode:ident, $label:literal, $size:expr) => {
        pub struct $name;

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }
            fn name(&self) -> &'static str {
                $label
            }
            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (reg_a, reg_b, immediate_x) =
                    parse_two_registers_and_immediate(context.operands, context.fskip);
                let address = (context.registers[reg_b as usize]
                    .wrapping_add(immediate_x as u64)
                    & 0xffff_ffff) as u32;
                let value = context.registers[reg_a as usize];
                store_from(context, address, value, $size)
            }
        }
    };
}

store_ind!(StoreIndU8, OPCODE_STORE_IND_U8, "STORE_IND_U8", 1);
store_ind!(StoreIndU16, OPCODE_STORE_IND_U16, "STORE_IND_U16", 2);
store_ind!(StoreIndU32, OPCODE_STORE_IND_U32, "STORE_IND_U32", 4);
store_ind!(StoreIndU64, OPCODE_STORE_IND_U64, "STORE_IND_U64", 8);
