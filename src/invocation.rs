//! The marshalling invocation `Ψ_M`: initialize with `Y`, run `Ψ` to
//! termination, extract the result blob from `(r7, r8)` and classify the
//! outcome.

use crate::codec::decode_program;
use crate::config::{GasModel, RESULT_CODE_HALT, RESULT_CODE_OOG};
use crate::host_functions::HostCallMutator;
use crate::init::standard_program_init;
use crate::pvm::{execute_with_host, Pvm};

/// What a marshalled run produced: a result blob on clean halt, or one of
/// the two failure classes the outer wrappers distinguish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarshalledResult {
    Blob(Vec<u8>),
    Panic,
    Oog,
}

impl MarshalledResult {
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, MarshalledResult::Panic)
    }

    #[must_use]
    pub const fn is_oog(&self) -> bool {
        matches!(self, MarshalledResult::Oog)
    }
}

/// `Ψ_M` under the default per-instruction gas model.
pub fn invoke_marshalled<M: HostCallMutator>(
    program_blob: &[u8],
    initial_pc: u32,
    gas_limit: i64,
    argument: &[u8],
    mutator: &mut M,
) -> (u64, MarshalledResult) {
    invoke_marshalled_with_model(
        program_blob,
        initial_pc,
        gas_limit,
        argument,
        mutator,
        GasModel::default(),
    )
}

/// `Ψ_M(program, pc, gas, argument, mutator)`: decode and initialize, run
/// to a terminal state and classify. Decode and layout failures cost zero
/// gas and classify as PANIC.
pub fn invoke_marshalled_with_model<M: HostCallMutator>(
    program_blob: &[u8],
    initial_pc: u32,
    gas_limit: i64,
    argument: &[u8],
    mutator: &mut M,
    gas_model: GasModel,
) -> (u64, MarshalledResult) {
    let Ok(sections) = decode_program(program_blob) else {
        return (0, MarshalledResult::Panic);
    };
    let Some((program, registers, ram)) = standard_program_init(&sections, argument) else {
        return (0, MarshalledResult::Panic);
    };

    let mut vm = Pvm::new(program, initial_pc, gas_limit, registers, ram, gas_model);
    let code = execute_with_host(&mut vm, mutator);
    let gas_consumed = (gas_limit - vm.gas.max(0)).max(0) as u64;
    tracing::debug!(code, gas_consumed, "marshalled invocation finished");

    let result = match code {
        RESULT_CODE_OOG => MarshalledResult::Oog,
        RESULT_CODE_HALT => {
            // (r7, r8) designate the result; an unreadable range yields the
            // empty blob rather than an error.
            let offset = vm.registers[7] as u32;
            let length = vm.registers[8] as u32;
            MarshalledResult::Blob(vm.ram.read_octets(offset, length).unwrap_or_default())
        }
        _ => MarshalledResult::Panic,
    };
    (gas_consumed, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OPCODE_ECALLI, OPCODE_FALLTHROUGH, OPCODE_JUMP_IND, OPCODE_TRAP};
    use crate::host_functions::HostCallResult;
    use crate::testutil::{halting_program_blob, program_blob};
    use quickcheck_macros::quickcheck;

    /// Records every dispatch and lets execution continue untouched.
    struct RecordingMutator {
        calls: Vec<(u64, i64)>,
    }

    impl RecordingMutator {
        fn new() -> Self {
            Self { calls: Vec::new() }
        }
    }

    impl HostCallMutator for RecordingMutator {
        fn dispatch(&mut self, host_call_id: u64, vm: &mut Pvm) -> HostCallResult {
            self.calls.push((host_call_id, vm.gas));
            HostCallResult::continue_execution()
        }
    }

    #[test]
    fn trap_program_panics_after_one_gas() {
        let blob = program_blob(&[OPCODE_TRAP], &[1], &[]);
        let (gas, result) =
            invoke_marshalled(&blob, 0, 100, &[], &mut RecordingMutator::new());
        assert_eq!(gas, 1);
        assert_eq!(result, MarshalledResult::Panic);
    }

    #[test]
    fn fallthrough_runs_into_the_padded_trap() {
        let blob = program_blob(&[OPCODE_FALLTHROUGH], &[1], &[]);
        let (gas, result) =
            invoke_marshalled(&blob, 0, 100, &[], &mut RecordingMutator::new());
        assert_eq!(gas, 2);
        assert_eq!(result, MarshalledResult::Panic);
    }

    #[test]
    fn immediate_halt_returns_the_argument_verbatim() {
        let (gas, result) = invoke_marshalled(
            &halting_program_blob(),
            0,
            100,
            b"ABCDE",
            &mut RecordingMutator::new(),
        );
        assert_eq!(gas, 1);
        assert_eq!(result, MarshalledResult::Blob(b"ABCDE".to_vec()));
    }

    #[test]
    fn undecodable_blob_panics_at_zero_gas() {
        let (gas, result) =
            invoke_marshalled(&[0xff, 0x01], 0, 100, &[], &mut RecordingMutator::new());
        assert_eq!(gas, 0);
        assert_eq!(result, MarshalledResult::Panic);
    }

    #[test]
    fn host_call_prologue_costs_eleven_gas_before_the_mutator() {
        // ecalli 7, then halt.
        let blob = program_blob(
            &[OPCODE_ECALLI, 0x07, OPCODE_JUMP_IND, 0x00],
            &[1, 0, 1, 0],
            &[],
        );
        let mut mutator = RecordingMutator::new();
        let (gas, result) = invoke_marshalled(&blob, 0, 100, &[], &mut mutator);
        assert_eq!(mutator.calls, vec![(7, 100 - 11)]);
        // ecalli (1) + prologue (10) + halt (1).
        assert_eq!(gas, 12);
        assert_eq!(result, MarshalledResult::Blob(vec![]));
    }

    #[test]
    fn gas_limit_bounds_consumption() {
        let blob = program_blob(&[OPCODE_FALLTHROUGH; 8], &[1; 8], &[]);
        let (gas, result) = invoke_marshalled(&blob, 0, 3, &[], &mut RecordingMutator::new());
        assert_eq!(result, MarshalledResult::Oog);
        assert_eq!(gas, 3);
    }

    #[quickcheck]
    fn argument_round_trips_and_is_deterministic(argument: Vec<u8>) -> bool {
        let run = || {
            invoke_marshalled(
                &halting_program_blob(),
                0,
                1000,
                &argument,
                &mut RecordingMutator::new(),
            )
        };
        let first = run();
        first == run() && first.1 == MarshalledResult::Blob(argument.clone())
    }
}
