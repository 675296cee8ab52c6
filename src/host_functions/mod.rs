//! Host-call plumbing: the context-mutator trait the step loop yields to,
//! the result type host calls report, and the general host functions shared
//! by every invocation wrapper.

pub mod general;

use crate::pvm::Pvm;

/// Sentinel result code meaning "resume the loop".
pub const HOST_RESULT_CONTINUE: u8 = 255;

/// Result of servicing one host call: continue, or a terminal result code
/// to propagate out of the VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCallResult {
    pub result_code: u8,
}

impl HostCallResult {
    #[must_use]
    pub const fn continue_execution() -> Self {
        Self {
            result_code: HOST_RESULT_CONTINUE,
        }
    }

    #[must_use]
    pub const fn halt() -> Self {
        Self {
            result_code: crate::config::RESULT_CODE_HALT,
        }
    }

    #[must_use]
    pub const fn panic() -> Self {
        Self {
            result_code: crate::config::RESULT_CODE_PANIC,
        }
    }

    #[must_use]
    pub const fn fault() -> Self {
        Self {
            result_code: crate::config::RESULT_CODE_FAULT,
        }
    }

    #[must_use]
    pub const fn oog() -> Self {
        Self {
            result_code: crate::config::RESULT_CODE_OOG,
        }
    }

    #[must_use]
    pub const fn should_continue(&self) -> bool {
        self.result_code == HOST_RESULT_CONTINUE
    }
}

/// The context mutator: the single point of interaction between a running
/// VM and the outside world. Each invocation wrapper supplies one, owning
/// whatever context its host calls operate on; the step loop has already
/// charged the 10-gas prologue when `dispatch` runs.
pub trait HostCallMutator {
    fn dispatch(&mut self, host_call_id: u64, vm: &mut Pvm) -> HostCallResult;
}

/// Unknown host-call fallback: `r7 = WHAT`, execution continues.
pub fn unknown_host_call(vm: &mut Pvm, host_call_id: u64) -> HostCallResult {
    tracing::debug!(host_call_id, "unknown host call id");
    vm.registers[7] = crate::config::REG_WHAT;
    HostCallResult::continue_execution()
}
