//! Control flow: TRAP, FALLTHROUGH, JUMP, JUMP_IND, LOAD_IMM_JUMP,
//! LOAD_IMM_JUMP_IND.

use crate::config::{
    OPCODE_FALLTHROUGH, OPCODE_JUMP, OPCODE_JUMP_IND, OPCODE_LOAD_IMM_JUMP,
    OPCODE_LOAD_IMM_JUMP_IND, OPCODE_TRAP, RESULT_CODE_PANIC,
};
use crate::instructions::base::{
    dynamic_jump, parse_one_offset, parse_one_register_and_immediate,
    parse_register_and_two_immediates, parse_two_registers_and_two_immediates,
    validate_branch_target, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

/// TRAP: unconditional panic.
pub struct Trap;

impl InstructionHandler for Trap {
    fn opcode(&self) -> u8 {
        OPCODE_TRAP
    }
    fn name(&self) -> &'static str {
        "TRAP"
    }
    fn execute(&self, _context: &mut InstructionContext<'_>) -> InstructionResult {
        InstructionResult::terminal(RESULT_CODE_PANIC)
    }
}

/// FALLTHROUGH: basic-block boundary, no effect.
pub struct Fallthrough;

impl InstructionHandler for Fallthrough {
    fn opcode(&self) -> u8 {
        OPCODE_FALLTHROUGH
    }
    fn name(&self) -> &'static str {
        "FALLTHROUGH"
    }
    fn execute(&self, _context: &mut InstructionContext<'_>) -> InstructionResult {
        InstructionResult::cont()
    }
}

/// JUMP: PC-relative unconditional jump to a basic-block start.
pub struct Jump;

impl InstructionHandler for Jump {
    fn opcode(&self) -> u8 {
        OPCODE_JUMP
    }
    fn name(&self) -> &'static str {
        "JUMP"
    }
    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let target = parse_one_offset(context.operands, context.fskip, context.program_counter);
        if let Some(panic) = validate_branch_target(target, context.code, context.bitmask) {
            return panic;
        }
        context.program_counter = target;
        InstructionResult::cont()
    }
}

/// JUMP_IND: `djump((reg_A + immed_X) mod 2^32)`.
pub struct JumpInd;

impl InstructionHandler for JumpInd {
    fn opcode(&self) -> u8 {
        OPCODE_JUMP_IND
    }
    fn name(&self) -> &'static str {
        "JUMP_IND"
    }
    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (reg, immediate) = parse_one_register_and_immediate(context.operands, context.fskip);
        let address =
            context.registers[reg as usize].wrapping_add(immediate as u64) & 0xffff_ffff;
        dynamic_jump(context, address)
    }
}

/// LOAD_IMM_JUMP: `reg_A = immed_X`, then PC-relative jump by `immed_Y`.
pub struct LoadImmJump;

impl InstructionHandler for LoadImmJump {
    fn opcode(&self) -> u8 {
        OPCODE_LOAD_IMM_JUMP
    }
    fn name(&self) -> &'static str {
        "LOAD_IMM_JUMP"
    }
    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (reg, immediate_x, immediate_y) =
            parse_register_and_two_immediates(context.operands, context.fskip);
        let target = (i64::from(context.program_counter)).wrapping_add(immediate_y) as u32;
        if let Some(panic) = validate_branch_target(target, context.code, context.bitmask) {
            return panic;
        }
        context.registers[reg as usize] = immediate_x as u64;
        context.program_counter = target;
        InstructionResult::cont()
    }
}

/// LOAD_IMM_JUMP_IND: `reg_A = immed_X`, then
/// `djump((reg_B + immed_Y) mod 2^32)`. `reg_B` is read before `reg_A` is
/// written so the two may alias.
pub struct LoadImmJumpInd;

impl InstructionHandler for LoadImmJumpInd {
    fn opcode(&self) -> u8 {
        OPCODE_LOAD_IMM_JUMP_IND
    }
    fn name(&self) -> &'static str {
        "LOAD_IMM_JUMP_IND"
    }
    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (reg_a, reg_b, immediate_x, immediate_y) =
            parse_two_registers_and_two_immediates(context.operands, context.fskip);
        let base = context.registers[reg_b as usize];
        context.registers[reg_a as usize] = immediate_x as u64;
        let address = base.wrapping_add(immediate_y as u64) & 0xffff_ffff;
        dynamic_jump(context, address)
    }
}
