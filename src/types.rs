//! Shared engine types: the register file, per-instruction results and the
//! execution context handed to instruction handlers.

use crate::ram::PagedRam;

/// 13 general-purpose 64-bit registers, r0-r12.
pub type RegisterState = [u64; 13];

/// Per-page access rights. `Write` implies readability.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PageAccess {
    #[default]
    None = 0,
    Read = 1,
    Write = 2,
}

impl PageAccess {
    #[must_use]
    pub const fn allows_read(self) -> bool {
        !matches!(self, PageAccess::None)
    }

    #[must_use]
    pub const fn allows_write(self) -> bool {
        matches!(self, PageAccess::Write)
    }
}

/// Outcome of executing one instruction. `CONTINUE` (-1) keeps the loop
/// running; otherwise a `RESULT_CODE_*` terminal (or HOST) value.
#[derive(Clone, Copy, Debug)]
pub struct InstructionResult {
    pub result_code: i32,
    pub fault_address: Option<u32>,
}

impl InstructionResult {
    pub const CONTINUE: i32 = -1;

    #[must_use]
    pub const fn cont() -> Self {
        Self {
            result_code: Self::CONTINUE,
            fault_address: None,
        }
    }

    #[must_use]
    pub const fn terminal(result_code: u8) -> Self {
        Self {
            result_code: result_code as i32,
            fault_address: None,
        }
    }

    #[must_use]
    pub const fn fault(fault_address: u32) -> Self {
        Self {
            result_code: crate::config::RESULT_CODE_FAULT as i32,
            fault_address: Some(fault_address),
        }
    }

    #[must_use]
    pub const fn should_continue(&self) -> bool {
        self.result_code == Self::CONTINUE
    }
}

/// Everything an instruction handler may read or mutate. The handler either
/// leaves `program_counter` alone (the loop advances it by `1 + fskip`) or
/// overwrites it with a validated branch target.
pub struct InstructionContext<'a> {
    /// Extended code (original code plus 16 zero bytes).
    pub code: &'a [u8],
    /// Extended opcode bitmask (one byte per code byte, tail all ones).
    pub bitmask: &'a [u8],
    pub registers: &'a mut RegisterState,
    pub program_counter: u32,
    pub gas_remaining: i64,
    /// The `fskip` operand bytes following the opcode.
    pub operands: &'a [u8],
    pub fskip: i32,
    pub jump_table: &'a [u32],
    pub ram: &'a mut PagedRam,
    /// Written by ECALLI with the requested host-call id.
    pub host_call_id: Option<u64>,
}
