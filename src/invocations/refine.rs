//! The refine invocation `Ψ_R`: execute a work item's service code over its
//! payload. The refine context carries exported segments and a set of inner
//! guest machines the program may spawn, drive and inspect through host
//! calls 8-13.

use crate::accounts::{ServiceAccounts, ServiceId};
use crate::codec::strip_preimage_metadata;
use crate::config::{
    FUNC_EXPORT, FUNC_EXPUNGE, FUNC_FETCH, FUNC_GAS, FUNC_HISTORICAL_LOOKUP, FUNC_INVOKE,
    FUNC_LOG, FUNC_MACHINE, FUNC_PAGES, FUNC_PEEK, FUNC_POKE, GasModel, MAX_PACKAGE_EXPORTS,
    MAX_SERVICE_CODE_SIZE, PACKAGE_REF_GAS, PAGE_SIZE, REG_HUH, REG_OK, REG_OOB, REG_WHO,
    RESULT_CODE_HOST, SEGMENT_SIZE,
};
use crate::host_functions::general::{self, FetchSource};
use crate::host_functions::{unknown_host_call, HostCallMutator, HostCallResult};
use crate::invocation::{invoke_marshalled, MarshalledResult};
use crate::parser::Program;
use crate::pvm::Pvm;
use crate::ram::PagedRam;
use crate::types::PageAccess;
use std::collections::BTreeMap;

/// Outcome of `Ψ_R`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefineOutcome {
    Ok(Vec<u8>),
    /// Service or code unavailable.
    Bad,
    /// Code oversized, or the gas allowance ran out.
    Big,
}

/// Inputs to one refine run. `accounts` supplies the service code and the
/// historical-lookup store; `fetch` carries the package blobs and imported
/// segments the program may pull.
pub struct RefineParams<'a> {
    pub core_index: u32,
    pub work_item_index: u32,
    pub service_id: ServiceId,
    pub payload: &'a [u8],
    pub accounts: &'a ServiceAccounts,
    /// Timeslot anchoring historical preimage lookups.
    pub lookup_timeslot: u32,
    /// Base index of this item's exports within the package.
    pub export_offset: u64,
    pub gas_limit: i64,
    pub initial_pc: u32,
    pub fetch: FetchSource,
}

impl<'a> RefineParams<'a> {
    /// Conventional budget and entry point for a package item.
    #[must_use]
    pub fn new(service_id: ServiceId, payload: &'a [u8], accounts: &'a ServiceAccounts) -> Self {
        Self {
            core_index: 0,
            work_item_index: 0,
            service_id,
            payload,
            accounts,
            lookup_timeslot: 0,
            export_offset: 0,
            gas_limit: PACKAGE_REF_GAS,
            initial_pc: 0,
            fetch: FetchSource::default(),
        }
    }
}

/// One guest machine spawned by the MACHINE host call.
struct GuestMachine {
    vm: Pvm,
}

impl GuestMachine {
    fn new(program: Program, initial_pc: u32) -> Self {
        Self {
            vm: Pvm::new(
                program,
                initial_pc,
                0,
                [0; 13],
                PagedRam::new(),
                GasModel::default(),
            ),
        }
    }
}

struct RefineMutator<'a> {
    service_id: ServiceId,
    accounts: &'a ServiceAccounts,
    lookup_timeslot: u32,
    export_offset: u64,
    exports: Vec<Vec<u8>>,
    machines: BTreeMap<u64, GuestMachine>,
    next_machine_id: u64,
    fetch: FetchSource,
    log_messages: Vec<String>,
}

impl HostCallMutator for RefineMutator<'_> {
    fn dispatch(&mut self, host_call_id: u64, vm: &mut Pvm) -> HostCallResult {
        match host_call_id {
            FUNC_GAS => general::gas(vm),
            FUNC_FETCH => general::fetch(vm, &self.fetch),
            FUNC_HISTORICAL_LOOKUP => general::historical_lookup(
                vm,
                self.service_id,
                self.accounts,
                self.lookup_timeslot,
            ),
            FUNC_EXPORT => self.export(vm),
            FUNC_MACHINE => self.machine(vm),
            FUNC_PEEK => self.peek(vm),
            FUNC_POKE => self.poke(vm),
            FUNC_PAGES => self.pages(vm),
            FUNC_INVOKE => self.invoke(vm),
            FUNC_EXPUNGE => self.expunge(vm),
            FUNC_LOG => general::log(vm, &mut self.log_messages),
            _ => unknown_host_call(vm, host_call_id),
        }
    }
}

impl RefineMutator<'_> {
    /// EXPORT (7): read `min(r8, SEGMENT_SIZE)` bytes at `r7`, zero-pad to a
    /// full segment and append; `r7 = export_offset + index` or FULL.
    fn export(&mut self, vm: &mut Pvm) -> HostCallResult {
        let offset = vm.registers[7] as u32;
        let length = (vm.registers[8] as u32).min(SEGMENT_SIZE);
        let Ok(data) = vm.ram.read_octets(offset, length) else {
            vm.registers[7] = 0;
            return HostCallResult::panic();
        };

        if self.exports.len() >= MAX_PACKAGE_EXPORTS {
            vm.registers[7] = crate::config::REG_FULL;
            return HostCallResult::continue_execution();
        }
        let mut segment = vec![0u8; SEGMENT_SIZE as usize];
        segment[..data.len()].copy_from_slice(&data);
        self.exports.push(segment);
        vm.registers[7] = self.export_offset + self.exports.len() as u64;
        HostCallResult::continue_execution()
    }

    /// MACHINE (8): decode a program blob from `(r7, r8)` and spawn a guest
    /// at PC `r9`; `r7 = machine id`, or HUH on an undecodable blob.
    fn machine(&mut self, vm: &mut Pvm) -> HostCallResult {
        let offset = vm.registers[7] as u32;
        let length = vm.registers[8] as u32;
        let initial_pc = vm.registers[9] as u32;

        let Ok(blob) = vm.ram.read_octets(offset, length) else {
            return HostCallResult::fault();
        };
        let Ok(program) = Program::from_blob(&blob) else {
            vm.registers[7] = REG_HUH;
            return HostCallResult::continue_execution();
        };

        let id = self.next_machine_id;
        self.next_machine_id += 1;
        self.machines.insert(id, GuestMachine::new(program, initial_pc));
        vm.registers[7] = id;
        HostCallResult::continue_execution()
    }

    /// PEEK (9): copy `r10` bytes from guest `r7` offset `r9` into own
    /// memory at `r8`. WHO without a machine, OOB on unreadable guest range.
    fn peek(&mut self, vm: &mut Pvm) -> HostCallResult {
        let machine_id = vm.registers[7];
        let dest = vm.registers[8] as u32;
        let source = vm.registers[9] as u32;
        let length = vm.registers[10] as u32;

        let Some(guest) = self.machines.get(&machine_id) else {
            vm.registers[7] = REG_WHO;
            return HostCallResult::continue_execution();
        };
        let Ok(data) = guest.vm.ram.read_octets(source, length) else {
            vm.registers[7] = REG_OOB;
            return HostCallResult::continue_execution();
        };
        if vm.ram.write_octets(dest, &data).is_err() {
            return HostCallResult::panic();
        }
        vm.registers[7] = REG_OK;
        HostCallResult::continue_execution()
    }

    /// POKE (10): copy `r10` bytes from own memory at `r8` into guest `r7`
    /// at `r9`. Own unreadable range panics, missing machine is WHO, guest
    /// unwritable range is OOB.
    fn poke(&mut self, vm: &mut Pvm) -> HostCallResult {
        let machine_id = vm.registers[7];
        let source = vm.registers[8] as u32;
        let dest = vm.registers[9] as u32;
        let length = vm.registers[10] as u32;

        let Ok(data) = vm.ram.read_octets(source, length) else {
            return HostCallResult::panic();
        };
        let Some(guest) = self.machines.get_mut(&machine_id) else {
            vm.registers[7] = REG_WHO;
            return HostCallResult::continue_execution();
        };
        if guest.vm.ram.write_octets(dest, &data).is_err() {
            vm.registers[7] = REG_OOB;
            return HostCallResult::continue_execution();
        }
        vm.registers[7] = REG_OK;
        HostCallResult::continue_execution()
    }

    /// PAGES (11): set access on guest pages `[r8, r8 + r9)` to mode `r10`
    /// (0 none, 1/3 read, 2/4 write; 3 and 4 zero the pages first and
    /// require the range to already be readable). The range end is
    /// exclusive, so it may reach the top of the address space but not
    /// cross it; the reserved low pages stay off limits.
    fn pages(&mut self, vm: &mut Pvm) -> HostCallResult {
        const MIN_PAGE: u64 = 16;
        const MAX_PAGE: u64 = (1 << 32) / PAGE_SIZE as u64;

        let machine_id = vm.registers[7];
        let page_start = vm.registers[8];
        let page_count = vm.registers[9];
        let mode = vm.registers[10];

        let Some(guest) = self.machines.get_mut(&machine_id) else {
            vm.registers[7] = REG_WHO;
            return HostCallResult::continue_execution();
        };
        let out_of_range = page_start
            .checked_add(page_count)
            .map_or(true, |end| end > MAX_PAGE);
        if mode > 4 || page_start < MIN_PAGE || out_of_range {
            vm.registers[7] = REG_HUH;
            return HostCallResult::continue_execution();
        }

        let base = (page_start as u32) * PAGE_SIZE;
        let length = (page_count as u32).wrapping_mul(PAGE_SIZE);
        if mode > 2 {
            // The zeroing modes reinitialize pages the guest already holds.
            if guest.vm.ram.check_readable(base, length).is_err() {
                vm.registers[7] = REG_HUH;
                return HostCallResult::continue_execution();
            }
            guest.vm.ram.zero_pages(page_start as u32, page_count as u32);
        }
        let access = match mode {
            1 | 3 => PageAccess::Read,
            2 | 4 => PageAccess::Write,
            _ => PageAccess::None,
        };
        guest.vm.ram.set_page_access_rights(base, length, access, false);
        vm.registers[7] = REG_OK;
        HostCallResult::continue_execution()
    }

    /// INVOKE (12): read an 8-byte gas + 13x8-byte register record at `r8`,
    /// run guest `r7` until it stops, write the record back and report
    /// `(r7, r8) = (result code, fault address | host-call id | 0)`.
    fn invoke(&mut self, vm: &mut Pvm) -> HostCallResult {
        const RECORD_LEN: u32 = 8 + 13 * 8;

        let machine_id = vm.registers[7];
        let record_offset = vm.registers[8] as u32;

        let Ok(record) = vm.ram.read_octets(record_offset, RECORD_LEN) else {
            return HostCallResult::panic();
        };
        let Some(guest) = self.machines.get_mut(&machine_id) else {
            vm.registers[7] = REG_WHO;
            return HostCallResult::continue_execution();
        };

        let gas_limit = u64::from_le_bytes(record[0..8].try_into().expect("record sized"));
        guest.vm.gas = gas_limit.min(i64::MAX as u64) as i64;
        for (i, chunk) in record[8..].chunks_exact(8).enumerate() {
            guest.vm.registers[i] = u64::from_le_bytes(chunk.try_into().expect("record sized"));
        }

        let code = guest.vm.run();
        let extra = if code == RESULT_CODE_HOST {
            let id = guest.vm.host_call_id.unwrap_or(0);
            // Leave the guest resumable past its ECALLI for the next invoke.
            guest.vm.resume_after_host();
            id
        } else {
            u64::from(guest.vm.fault_address.unwrap_or(0))
        };

        let mut out = Vec::with_capacity(RECORD_LEN as usize);
        out.extend_from_slice(&(guest.vm.gas.max(0) as u64).to_le_bytes());
        for reg in guest.vm.registers {
            out.extend_from_slice(&reg.to_le_bytes());
        }
        if vm.ram.write_octets(record_offset, &out).is_err() {
            return HostCallResult::panic();
        }

        vm.registers[7] = u64::from(code);
        vm.registers[8] = extra;
        HostCallResult::continue_execution()
    }

    /// EXPUNGE (13): drop guest `r7`; `r7 = its PC`, or WHO.
    fn expunge(&mut self, vm: &mut Pvm) -> HostCallResult {
        let machine_id = vm.registers[7];
        match self.machines.remove(&machine_id) {
            Some(guest) => {
                vm.registers[7] = u64::from(guest.vm.pc);
                HostCallResult::continue_execution()
            }
            None => {
                vm.registers[7] = REG_WHO;
                HostCallResult::continue_execution()
            }
        }
    }
}

/// `Ψ_R`: resolve the work item's service code, encode the argument header
/// and run the marshalled invocation with the refine mutator. Returns the
/// outcome, the exported segments and the gas consumed.
pub fn refine(params: RefineParams<'_>) -> (RefineOutcome, Vec<Vec<u8>>, u64) {
    let Some(account) = params.accounts.get(&params.service_id) else {
        return (RefineOutcome::Bad, Vec::new(), 0);
    };
    let Some(preimage) = account.code() else {
        return (RefineOutcome::Bad, Vec::new(), 0);
    };
    if preimage.len() > MAX_SERVICE_CODE_SIZE {
        return (RefineOutcome::Big, Vec::new(), 0);
    }
    let Ok(program_blob) = strip_preimage_metadata(preimage) else {
        return (RefineOutcome::Bad, Vec::new(), 0);
    };

    let mut argument = Vec::with_capacity(16 + params.payload.len());
    argument.extend_from_slice(&params.core_index.to_be_bytes());
    argument.extend_from_slice(&params.work_item_index.to_be_bytes());
    argument.extend_from_slice(&params.service_id.to_be_bytes());
    argument.extend_from_slice(&(params.payload.len() as u32).to_be_bytes());
    argument.extend_from_slice(params.payload);

    let mut mutator = RefineMutator {
        service_id: params.service_id,
        accounts: params.accounts,
        lookup_timeslot: params.lookup_timeslot,
        export_offset: params.export_offset,
        exports: Vec::new(),
        machines: BTreeMap::new(),
        next_machine_id: 0,
        fetch: params.fetch,
        log_messages: Vec::new(),
    };
    let (gas_consumed, result) = invoke_marshalled(
        program_blob,
        params.initial_pc,
        params.gas_limit,
        &argument,
        &mut mutator,
    );

    let outcome = match result {
        MarshalledResult::Blob(blob) => RefineOutcome::Ok(blob),
        MarshalledResult::Panic => RefineOutcome::Bad,
        MarshalledResult::Oog => RefineOutcome::Big,
    };
    (outcome, mutator.exports, gas_consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::ServiceAccount;
    use crate::config::{
        OPCODE_ADD_IMM_32, OPCODE_ECALLI, OPCODE_FALLTHROUGH, OPCODE_JUMP_IND, OPCODE_TRAP,
        RESULT_CODE_PANIC,
    };
    use crate::testutil::instruction_blob;

    const BASE: u32 = 32 * PAGE_SIZE;
    const GUEST_PAGE: u64 = 16;
    const GUEST_BASE: u32 = GUEST_PAGE as u32 * PAGE_SIZE;

    fn host_vm() -> Pvm {
        let mut ram = PagedRam::new();
        ram.set_page_access_rights(BASE, 2 * PAGE_SIZE, PageAccess::Write, false);
        Pvm::new(Program::default(), 0, 1000, [0; 13], ram, GasModel::default())
    }

    fn mutator(accounts: &ServiceAccounts) -> RefineMutator<'_> {
        RefineMutator {
            service_id: 7,
            accounts,
            lookup_timeslot: 0,
            export_offset: 0,
            exports: Vec::new(),
            machines: BTreeMap::new(),
            next_machine_id: 0,
            fetch: FetchSource::default(),
            log_messages: Vec::new(),
        }
    }

    /// MACHINE on a blob previously written to host memory; returns the id.
    fn spawn_guest(m: &mut RefineMutator<'_>, vm: &mut Pvm, code: &[u8], bitmask: &[u8]) -> u64 {
        let blob = instruction_blob(code, bitmask, &[]);
        vm.ram.write_octets(BASE, &blob).unwrap();
        vm.registers[7] = u64::from(BASE);
        vm.registers[8] = blob.len() as u64;
        vm.registers[9] = 0; // initial PC
        assert!(m.dispatch(FUNC_MACHINE, vm).should_continue());
        vm.registers[7]
    }

    /// PAGES on guest `id`: mode over `count` pages from `start`.
    fn set_guest_pages(
        m: &mut RefineMutator<'_>,
        vm: &mut Pvm,
        id: u64,
        start: u64,
        count: u64,
        mode: u64,
    ) -> u64 {
        vm.registers[7] = id;
        vm.registers[8] = start;
        vm.registers[9] = count;
        vm.registers[10] = mode;
        assert!(m.dispatch(FUNC_PAGES, vm).should_continue());
        vm.registers[7]
    }

    fn write_invoke_record(vm: &mut Pvm, offset: u32, gas: u64, registers: &[u64; 13]) {
        let mut record = gas.to_le_bytes().to_vec();
        for reg in registers {
            record.extend_from_slice(&reg.to_le_bytes());
        }
        vm.ram.write_octets(offset, &record).unwrap();
    }

    fn read_invoke_record(vm: &Pvm, offset: u32) -> (u64, [u64; 13]) {
        let record = vm.ram.read_octets(offset, 8 + 13 * 8).unwrap();
        let gas = u64::from_le_bytes(record[0..8].try_into().unwrap());
        let mut registers = [0u64; 13];
        for (i, chunk) in record[8..].chunks_exact(8).enumerate() {
            registers[i] = u64::from_le_bytes(chunk.try_into().unwrap());
        }
        (gas, registers)
    }

    #[test]
    fn unknown_service_is_bad() {
        let accounts = ServiceAccounts::new();
        let (outcome, exports, gas) = refine(RefineParams::new(7, b"", &accounts));
        assert_eq!(outcome, RefineOutcome::Bad);
        assert!(exports.is_empty());
        assert_eq!(gas, 0);
    }

    #[test]
    fn missing_code_preimage_is_bad() {
        let mut accounts = ServiceAccounts::new();
        accounts.insert(7, ServiceAccount::default());
        let (outcome, _, _) = refine(RefineParams::new(7, b"", &accounts));
        assert_eq!(outcome, RefineOutcome::Bad);
    }

    #[test]
    fn oversized_code_is_big() {
        let mut accounts = ServiceAccounts::new();
        let mut account = ServiceAccount::default();
        let code = vec![0u8; MAX_SERVICE_CODE_SIZE + 1];
        account.code_hash = crate::crypto::blake2b256(&code);
        account.preimages.insert(account.code_hash, code);
        accounts.insert(7, account);
        let (outcome, _, _) = refine(RefineParams::new(7, b"", &accounts));
        assert_eq!(outcome, RefineOutcome::Big);
    }

    #[test]
    fn exporting_program_returns_ok_with_the_segment() {
        // ecalli 7 exports memory[r7 .. r7 + r8]; at entry that is exactly
        // the argument region, so the segment carries the encoded argument.
        // Then halt through r0.
        let program = crate::testutil::program_blob(
            &[OPCODE_ECALLI, 0x07, OPCODE_JUMP_IND, 0x00],
            &[1, 0, 1, 0],
            &[],
        );
        let preimage = crate::testutil::service_preimage(b"", &program);
        let mut accounts = ServiceAccounts::new();
        let mut account = ServiceAccount::default();
        account.code_hash = crate::crypto::blake2b256(&preimage);
        account.preimages.insert(account.code_hash, preimage);
        accounts.insert(7, account);

        let (outcome, exports, gas) = refine(RefineParams::new(7, b"PAYLOAD", &accounts));
        // EXPORT left the segment index in r7, so the result range is
        // unreadable and the clean halt yields the empty blob.
        assert_eq!(outcome, RefineOutcome::Ok(vec![]));
        assert_eq!(gas, 12);
        assert_eq!(exports.len(), 1);
        let segment = &exports[0];
        assert_eq!(segment.len(), SEGMENT_SIZE as usize);
        // BE header: core, item index, service id, payload length, payload.
        assert_eq!(&segment[0..4], &0u32.to_be_bytes());
        assert_eq!(&segment[8..12], &7u32.to_be_bytes());
        assert_eq!(&segment[12..16], &7u32.to_be_bytes());
        assert_eq!(&segment[16..23], b"PAYLOAD");
        assert!(segment[23..].iter().all(|&b| b == 0));
    }

    #[test]
    fn machine_rejects_an_undecodable_blob() {
        let accounts = ServiceAccounts::new();
        let mut m = mutator(&accounts);
        let mut vm = host_vm();
        vm.ram.write_octets(BASE, &[0xff; 4]).unwrap();
        vm.registers[7] = u64::from(BASE);
        vm.registers[8] = 4;
        assert!(m.dispatch(FUNC_MACHINE, &mut vm).should_continue());
        assert_eq!(vm.registers[7], REG_HUH);
        assert!(m.machines.is_empty());
    }

    #[test]
    fn peek_and_poke_round_trip_through_a_guest() {
        let accounts = ServiceAccounts::new();
        let mut m = mutator(&accounts);
        let mut vm = host_vm();
        let id = spawn_guest(&mut m, &mut vm, &[OPCODE_TRAP], &[1]);
        assert_eq!(id, 0);
        assert_eq!(set_guest_pages(&mut m, &mut vm, id, GUEST_PAGE, 1, 2), REG_OK);

        // POKE: host bytes into the guest page.
        vm.ram.write_octets(BASE + 256, &[1, 2, 3, 4]).unwrap();
        vm.registers[7] = id;
        vm.registers[8] = u64::from(BASE + 256);
        vm.registers[9] = u64::from(GUEST_BASE);
        vm.registers[10] = 4;
        assert!(m.dispatch(FUNC_POKE, &mut vm).should_continue());
        assert_eq!(vm.registers[7], REG_OK);

        // PEEK: back out of the guest into a different host address.
        vm.registers[7] = id;
        vm.registers[8] = u64::from(BASE + 512);
        vm.registers[9] = u64::from(GUEST_BASE);
        vm.registers[10] = 4;
        assert!(m.dispatch(FUNC_PEEK, &mut vm).should_continue());
        assert_eq!(vm.registers[7], REG_OK);
        assert_eq!(vm.ram.read_octets(BASE + 512, 4).unwrap(), vec![1, 2, 3, 4]);

        // Unknown machine ids answer WHO; an unmapped guest range is OOB.
        vm.registers[7] = 99;
        assert!(m.dispatch(FUNC_PEEK, &mut vm).should_continue());
        assert_eq!(vm.registers[7], REG_WHO);
        vm.registers[7] = id;
        vm.registers[8] = u64::from(BASE + 512);
        vm.registers[9] = u64::from(GUEST_BASE + 2 * PAGE_SIZE);
        assert!(m.dispatch(FUNC_PEEK, &mut vm).should_continue());
        assert_eq!(vm.registers[7], REG_OOB);
    }

    #[test]
    fn pages_guards_the_range_and_zeroing_modes() {
        let accounts = ServiceAccounts::new();
        let mut m = mutator(&accounts);
        let mut vm = host_vm();
        let id = spawn_guest(&mut m, &mut vm, &[OPCODE_TRAP], &[1]);
        const MAX_PAGE: u64 = (1 << 32) / PAGE_SIZE as u64;

        // Reserved low pages and ranges crossing the top are HUH; a range
        // ending exactly at the top is legal (exclusive end).
        assert_eq!(set_guest_pages(&mut m, &mut vm, id, 15, 1, 2), REG_HUH);
        assert_eq!(set_guest_pages(&mut m, &mut vm, id, MAX_PAGE - 1, 2, 2), REG_HUH);
        assert_eq!(set_guest_pages(&mut m, &mut vm, id, GUEST_PAGE, u64::MAX, 2), REG_HUH);
        assert_eq!(set_guest_pages(&mut m, &mut vm, id, 5, 1, 2), REG_HUH);
        assert_eq!(set_guest_pages(&mut m, &mut vm, id, MAX_PAGE - 1, 1, 2), REG_OK);
        assert_eq!(set_guest_pages(&mut m, &mut vm, id, GUEST_PAGE, 1, 9), REG_HUH);
        assert_eq!(set_guest_pages(&mut m, &mut vm, 99, GUEST_PAGE, 1, 2), REG_WHO);

        // Mode 4 zeroes previously written contents but needs readable
        // pages; on a fresh unmapped page it is HUH.
        assert_eq!(set_guest_pages(&mut m, &mut vm, id, GUEST_PAGE, 1, 2), REG_OK);
        let guest = m.machines.get_mut(&id).unwrap();
        guest.vm.ram.write_octets(GUEST_BASE, &[7; 8]).unwrap();
        assert_eq!(set_guest_pages(&mut m, &mut vm, id, GUEST_PAGE, 1, 4), REG_OK);
        let guest = m.machines.get(&id).unwrap();
        assert_eq!(guest.vm.ram.read_octets(GUEST_BASE, 8).unwrap(), vec![0; 8]);
        assert_eq!(
            set_guest_pages(&mut m, &mut vm, id, GUEST_PAGE + 1, 1, 3),
            REG_HUH
        );
    }

    #[test]
    fn invoke_runs_a_guest_through_the_record() {
        let accounts = ServiceAccounts::new();
        let mut m = mutator(&accounts);
        let mut vm = host_vm();
        // Guest: r1 = r0 + 7, then trap.
        let id = spawn_guest(
            &mut m,
            &mut vm,
            &[OPCODE_ADD_IMM_32, 0x01, 0x07, OPCODE_TRAP],
            &[1, 0, 0, 1],
        );

        let record_at = BASE + 1024;
        write_invoke_record(&mut vm, record_at, 10, &[0; 13]);
        vm.registers[7] = id;
        vm.registers[8] = u64::from(record_at);
        assert!(m.dispatch(FUNC_INVOKE, &mut vm).should_continue());
        assert_eq!(vm.registers[7], u64::from(RESULT_CODE_PANIC));
        assert_eq!(vm.registers[8], 0);

        let (gas_left, registers) = read_invoke_record(&vm, record_at);
        // add_imm (1) + trap (1) out of 10.
        assert_eq!(gas_left, 8);
        assert_eq!(registers[1], 7);
    }

    #[test]
    fn invoke_surfaces_guest_host_calls_and_resumes_past_them() {
        let accounts = ServiceAccounts::new();
        let mut m = mutator(&accounts);
        let mut vm = host_vm();
        // Guest: ecalli 5, then fallthrough into the padded trap.
        let id = spawn_guest(
            &mut m,
            &mut vm,
            &[OPCODE_ECALLI, 0x05, OPCODE_FALLTHROUGH, OPCODE_TRAP],
            &[1, 0, 1, 1],
        );

        let record_at = BASE + 1024;
        write_invoke_record(&mut vm, record_at, 10, &[0; 13]);
        vm.registers[7] = id;
        vm.registers[8] = u64::from(record_at);
        assert!(m.dispatch(FUNC_INVOKE, &mut vm).should_continue());
        assert_eq!(vm.registers[7], u64::from(RESULT_CODE_HOST));
        assert_eq!(vm.registers[8], 5);
        let (gas_left, _) = read_invoke_record(&vm, record_at);
        assert_eq!(gas_left, 9);

        // The guest is left resumable past its ECALLI: the next invoke
        // continues with the fallthrough and the trap.
        write_invoke_record(&mut vm, record_at, 10, &[0; 13]);
        vm.registers[7] = id;
        vm.registers[8] = u64::from(record_at);
        assert!(m.dispatch(FUNC_INVOKE, &mut vm).should_continue());
        assert_eq!(vm.registers[7], u64::from(RESULT_CODE_PANIC));
        assert_eq!(vm.registers[8], 0);
        let (gas_left, _) = read_invoke_record(&vm, record_at);
        assert_eq!(gas_left, 8);
    }

    #[test]
    fn expunge_reports_the_pc_and_forgets_the_guest() {
        let accounts = ServiceAccounts::new();
        let mut m = mutator(&accounts);
        let mut vm = host_vm();
        let id = spawn_guest(&mut m, &mut vm, &[OPCODE_TRAP], &[1]);

        vm.registers[7] = id;
        assert!(m.dispatch(FUNC_EXPUNGE, &mut vm).should_continue());
        assert_eq!(vm.registers[7], 0); // the guest never ran past PC 0

        vm.registers[7] = id;
        assert!(m.dispatch(FUNC_EXPUNGE, &mut vm).should_continue());
        assert_eq!(vm.registers[7], REG_WHO);
    }
}
