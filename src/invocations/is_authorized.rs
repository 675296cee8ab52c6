//! The is-authorized invocation `Ψ_I`: run a work package's authorization
//! code against a core index. Its context is the unit type; the mutator
//! serves only `gas`, `fetch` and LOG, answering everything else with WHAT.

use crate::config::{FUNC_FETCH, FUNC_GAS, FUNC_LOG, MAX_AUTH_CODE_SIZE, PACKAGE_AUTH_GAS};
use crate::host_functions::general::{self, FetchSource};
use crate::host_functions::{unknown_host_call, HostCallMutator, HostCallResult};
use crate::invocation::{invoke_marshalled, MarshalledResult};
use crate::pvm::Pvm;

/// Outcome of `Ψ_I`: the authorizer's output blob, or one of the two error
/// markers the work-report pipeline records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    Ok(Vec<u8>),
    /// Code unavailable, or the authorizer panicked.
    Bad,
    /// Code oversized, or the gas allowance ran out.
    Big,
}

struct IsAuthorizedMutator {
    fetch: FetchSource,
    log_messages: Vec<String>,
}

impl HostCallMutator for IsAuthorizedMutator {
    fn dispatch(&mut self, host_call_id: u64, vm: &mut Pvm) -> HostCallResult {
        match host_call_id {
            FUNC_GAS => general::gas(vm),
            FUNC_FETCH => general::fetch(vm, &self.fetch),
            FUNC_LOG => general::log(vm, &mut self.log_messages),
            _ => unknown_host_call(vm, host_call_id),
        }
    }
}

/// `Ψ_I(auth_code, core_index)`. The authorization code must be supplied
/// explicitly; `fetch` carries the work-package blobs (auth config and
/// token) the authorizer may pull. Returns the outcome and gas consumed.
pub fn is_authorized(
    auth_code: Option<&[u8]>,
    core_index: u16,
    fetch: FetchSource,
) -> (AuthOutcome, u64) {
    let Some(auth_code) = auth_code else {
        return (AuthOutcome::Bad, 0);
    };
    if auth_code.len() > MAX_AUTH_CODE_SIZE {
        return (AuthOutcome::Big, 0);
    }

    let argument = core_index.to_le_bytes();
    let mut mutator = IsAuthorizedMutator {
        fetch,
        log_messages: Vec::new(),
    };
    let (gas_consumed, result) =
        invoke_marshalled(auth_code, 0, PACKAGE_AUTH_GAS, &argument, &mut mutator);

    let outcome = match result {
        MarshalledResult::Blob(blob) => AuthOutcome::Ok(blob),
        MarshalledResult::Panic => AuthOutcome::Bad,
        MarshalledResult::Oog => AuthOutcome::Big,
    };
    (outcome, gas_consumed)
}
