//! The PVM core: fetch/decode/execute under a gas budget, PC advancement by
//! `1 + Fskip`, and the host-call sub-protocol that hands control to the
//! invocation's context mutator on ECALLI.

use crate::config::{
    GasModel, HOST_CALL_BASE_GAS, RESULT_CODE_HOST, RESULT_CODE_OOG, RESULT_CODE_PANIC,
};
use crate::host_functions::HostCallMutator;
use crate::instructions::registry;
use crate::parser::Program;
use crate::ram::PagedRam;
use crate::types::{InstructionContext, RegisterState};

/// One virtual machine, owned by a single invocation. Created by the
/// program initializer, mutated by instructions, discarded after the outer
/// wrapper extracts its result.
pub struct Pvm {
    pub program: Program,
    pub pc: u32,
    pub registers: RegisterState,
    pub ram: PagedRam,
    /// Signed so a final balance below zero collapses to "all spent".
    pub gas: i64,
    gas_model: GasModel,
    /// Terminal (or HOST) code once the loop stops; `None` while runnable.
    result_code: Option<u8>,
    /// Set alongside a FAULT result.
    pub fault_address: Option<u32>,
    /// Set alongside a HOST result: the id ECALLI requested.
    pub host_call_id: Option<u64>,
    /// PC to install when the mutator lets execution continue.
    host_resume_pc: Option<u32>,
}

impl Pvm {
    #[must_use]
    pub fn new(
        program: Program,
        initial_pc: u32,
        gas_limit: i64,
        registers: RegisterState,
        ram: PagedRam,
        gas_model: GasModel,
    ) -> Self {
        Self {
            program,
            pc: initial_pc,
            registers,
            ram,
            gas: gas_limit,
            gas_model,
            result_code: None,
            fault_address: None,
            host_call_id: None,
            host_resume_pc: None,
        }
    }

    /// The terminal (or HOST) result code, once the loop has stopped.
    #[must_use]
    pub fn result_code(&self) -> Option<u8> {
        self.result_code
    }

    fn stop(&mut self, code: u8) {
        self.result_code = Some(code);
    }

    /// Execute one instruction. Returns `false` once the machine has reached
    /// a terminal or HOST state.
    pub fn step(&mut self) -> bool {
        if self.result_code.is_some() {
            return false;
        }

        let pc = self.pc as usize;
        if pc >= self.program.code.len() {
            self.stop(RESULT_CODE_PANIC);
            return false;
        }

        let opcode = self.program.code[pc];
        let fskip = self.program.skip(self.pc);
        let instruction_length = 1 + fskip as u32;

        // Gas is checked and debited before the instruction may act.
        let cost = self.gas_model.instruction_cost(opcode);
        if self.gas < cost {
            self.stop(RESULT_CODE_OOG);
            return false;
        }
        self.gas -= cost;

        let Some(handler) = registry().handler(opcode) else {
            self.stop(RESULT_CODE_PANIC);
            return false;
        };

        let operands_end = (pc + instruction_length as usize).min(self.program.code.len());
        let mut context = InstructionContext {
            code: &self.program.code,
            bitmask: &self.program.bitmask,
            registers: &mut self.registers,
            program_counter: self.pc,
            gas_remaining: self.gas,
            operands: &self.program.code[pc + 1..operands_end],
            fskip,
            jump_table: &self.program.jump_table,
            ram: &mut self.ram,
            host_call_id: None,
        };
        let result = handler.execute(&mut context);
        let pc_after = context.program_counter;
        let host_call_id = context.host_call_id;

        if result.result_code == RESULT_CODE_HOST as i32 {
            // PC is not advanced: the resume point is recorded and installed
            // only when the mutator lets the loop continue.
            self.host_call_id = host_call_id;
            self.host_resume_pc = Some(self.pc + instruction_length);
            self.stop(RESULT_CODE_HOST);
            return false;
        }
        if !result.should_continue() {
            self.fault_address = result.fault_address;
            self.stop(result.result_code as u8);
            return false;
        }

        self.pc = if pc_after != self.pc {
            pc_after
        } else {
            self.pc + instruction_length
        };
        true
    }

    /// Drive the loop until a terminal or HOST state; returns the code.
    pub fn run(&mut self) -> u8 {
        while self.step() {}
        self.result_code.unwrap_or(RESULT_CODE_PANIC)
    }

    /// Resume after a host call: install the recorded resume PC (unless the
    /// mutator redirected the PC itself) and clear the HOST state.
    pub fn resume_after_host(&mut self) {
        if let Some(resume_pc) = self.host_resume_pc.take() {
            self.pc = resume_pc;
        }
        self.host_call_id = None;
        self.result_code = None;
    }
}

/// `Ψ`: run `vm` to a true terminal state, servicing every host call
/// through `mutator`. Each host call is charged a 10-gas prologue before
/// the mutator runs; exhaustion there terminates with OOG untouched.
pub fn execute_with_host<M: HostCallMutator>(vm: &mut Pvm, mutator: &mut M) -> u8 {
    loop {
        let code = vm.run();
        if code != RESULT_CODE_HOST {
            return code;
        }
        let host_call_id = vm.host_call_id.unwrap_or(0);
        if vm.gas < HOST_CALL_BASE_GAS {
            vm.stop(RESULT_CODE_OOG);
            return RESULT_CODE_OOG;
        }
        vm.gas -= HOST_CALL_BASE_GAS;
        tracing::trace!(host_call_id, gas = vm.gas, "host call");
        let outcome = mutator.dispatch(host_call_id, vm);
        if outcome.should_continue() {
            vm.resume_after_host();
        } else {
            vm.stop(outcome.result_code);
            return outcome.result_code;
        }
    }
}
