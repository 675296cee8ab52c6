//! Conditional branches: register-vs-immediate and register-vs-register
//! forms. A taken branch installs `PC + signed(offset)` after validating it
//! as a basic-block start; an untaken branch falls through.

use crate::config::{
    OPCODE_BRANCH_EQ, OPCODE_BRANCH_EQ_IMM, OPCODE_BRANCH_GE_S, OPCODE_BRANCH_GE_S_IMM,
    OPCODE_BRANCH_GE_U, OPCODE_BRANCH_GE_U_IMM, OPCODE_BRANCH_GT_S_IMM, OPCODE_BRANCH_GT_U_IMM,
    OPCODE_BRANCH_LE_S_IMM, OPCODE_BRANCH_LE_U_IMM, OPCODE_BRANCH_LT_S, OPCODE_BRANCH_LT_S_IMM,
    OPCODE_BRANCH_LT_U, OPCODE_BRANCH_LT_U_IMM, OPCODE_BRANCH_NE, OPCODE_BRANCH_NE_IMM,
};
use crate::instructions::base::{
    parse_branch_operands, parse_register_branch_operands, validate_branch_target,
    InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

fn take_branch(context: &mut InstructionContext<'_>, target: u32) -> InstructionResult {
    if let Some(panic) = validate_branch_target(target, context.code, context.bitmask) {
        return panic;
    }
    context.program_counter = target;
    InstructionResult::cont()
}

// Branch when predicate(reg_A, immed_X).
macro_rules! branch_imm {
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
                let (reg, immediate, target) =
                    parse_branch_operands(context.operands, context.program_counter);
                if ($pred)(context.registers[reg as usize], immediate as u64) {
                    take_branch(context, target)
                } else {
                    InstructionResult::cont()
                }
            }
        }
    };
}

// Branch when predicate(reg_A, reg_B).
macro_rules! branch_reg {
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
                let (reg_a, reg_b, target) =
                    parse_register_branch_operands(context.operands, context.program_counter);
                if ($pred)(
                    context.registers[reg_a as usize],
                    context.registers[reg_b as usize],
                ) {
                    take_branch(context, target)
                } else {
                    InstructionResult::cont()
                }
            }
        }
    };
}

branch_imm!(BranchEqImm, OPCODE_BRANCH_EQ_IMM, "BRANCH_EQ_IMM", |a, x| a == x);
branch_imm!(BranchNeImm, OPCODE_BRANCH_NE_IMM, "BRANCH_NE_IMM", |a, x| a != x);
branch_imm!(BranchLtUImm, OPCODE_BRANCH_LT_U_IMM, "BRANCH_LT_U_IMM", |a, x| a < x);
branch_imm!(BranchLeUImm, OPCODE_BRANCH_LE_U_IMM, "BRANCH_LE_U_IMM", |a, x| a <= x);
branch_imm!(BranchGeUImm, OPCODE_BRANCH_GE_U_IMM, "BRANCH_GE_U_IMM", |a, x| a >= x);
branch_imm!(BranchGtUImm, OPCODE_BRANCH_GT_U_IMM, "BRANCH_GT_U_IMM", |a, x| a > x);
branch_imm!(BranchLtSImm, OPCODE_BRANCH_LT_S_IMM, "BRANCH_LT_S_IMM", |a, x| (a as i64) < (x as i64));
branch_imm!(BranchLeSImm, OPCODE_BRANCH_LE_S_IMM, "BRANCH_LE_S_IMM", |a, x| (a as i64) <= (x as i64));
branch_imm!(BranchGeSImm, OPCODE_BRANCH_GE_S_IMM, "BRANCH_GE_S_IMM", |a, x| (a as i64) >= (x as i64));
branch_imm!(BranchGtSImm, OPCODE_BRANCH_GT_S_IMM, "BRANCH_GT_S_IMM", |a, x| (a as i64) > (x as i64));

branch_reg!(BranchEq, OPCODE_BRANCH_EQ, "BRANCH_EQ", |a, b| a == b);
branch_reg!(BranchNe, OPCODE_BRANCH_NE, "BRANCH_NE", |a, b| a != b);
branch_reg!(BranchLtU, OPCODE_BRANCH_LT_U, "BRANCH_LT_U", |a, b| a < b);
branch_reg!(BranchLtS, OPCODE_BRANCH_LT_S, "BRANCH_LT_S", |a, b| (a as i64) < (b as i64));
branch_reg!(BranchGeU, OPCODE_BRANCH_GE_U, "BRANCH_GE_U", |a, b| a >= b);
branch_reg!(BranchGeS, OPCODE_BRANCH_GE_S, "BRANCH_GE_S", |a, b| (a as i64) >= (b as i64));

#[cfg(test)]
mod tests {
    use crate::config::{
        GasModel, OPCODE_BRANCH_EQ_IMM, OPCODE_FALLTHROUGH, OPCODE_TRAP, RESULT_CODE_PANIC,
    };
    use crate::parser::Program;
    use crate::pvm::Pvm;
    use crate::ram::PagedRam;

    fn vm_with_r1(code: Vec<u8>, bitmask: Vec<u8>, r1: u64) -> Pvm {
        let program = Program::from_parts(code, bitmask, vec![]);
        let mut registers = [0u64; 13];
        registers[1] = r1;
        Pvm::new(program, 0, 100, registers, PagedRam::new(), GasModel::default())
    }

    #[test]
    fn taken_branch_jumps_to_the_block_start() {
        // branch_eq_imm r1 == 5, offset +4: operands are the register byte
        // with l_X = 1 in the high nibble, the immediate, then the offset.
        let code = vec![OPCODE_BRANCH_EQ_IMM, 0x11, 0x05, 0x04, OPCODE_FALLTHROUGH, OPCODE_TRAP];
        let mut vm = vm_with_r1(code, vec![1, 0, 0, 0, 1, 1], 5);
        assert!(vm.step());
        assert_eq!(vm.pc, 4);
    }

    #[test]
    fn untaken_branch_falls_through() {
        let code = vec![OPCODE_BRANCH_EQ_IMM, 0x11, 0x05, 0x04, OPCODE_FALLTHROUGH, OPCODE_TRAP];
        let mut vm = vm_with_r1(code, vec![1, 0, 0, 0, 1, 1], 6);
        assert!(vm.step());
        assert_eq!(vm.pc, 4);
    }

    #[test]
    fn branch_into_the_middle_of_an_instruction_panics() {
        // Offset +1 lands inside this very instruction's operands.
        let code = vec![OPCODE_BRANCH_EQ_IMM, 0x11, 0x05, 0x01, OPCODE_TRAP];
        let mut vm = vm_with_r1(code, vec![1, 0, 0, 0, 1], 5);
        assert!(!vm.step());
        assert_eq!(vm.result_code(), Some(RESULT_CODE_PANIC));
    }
}
