//! ECALLI: the sole bridge to the host. Reports HOST with the requested
//! call id; the step loop hands control to the context mutator and resumes
//! afterwards.

use crate::config::{OPCODE_ECALLI, RESULT_CODE_HOST};
use crate::instructions::base::{immediate_unsigned, InstructionHandler};
use crate::types::{InstructionContext, InstructionResult};

pub struct Ecalli;

impl InstructionHandler for Ecalli {
    fn opcode(&self) -> u8 {
        OPCODE_ECALLI
    }
    fn name(&self) -> &'static str {
        "ECALLI"
    }
    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let host_call_id = immediate_unsigned(context.operands, 0, context.fskip.clamp(0, 4));
        context.host_call_id = Some(host_call_id);
        InstructionResult::terminal(RESULT_CODE_HOST)
    }
}
