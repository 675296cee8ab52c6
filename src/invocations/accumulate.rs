//! The accumulate invocation `Ψ_A`: run a service's accumulation code over
//! a block's inputs against a pair of implications records. Host calls
//! mutate the regular record; CHECKPOINT snapshots it into the exceptional
//! one, and the collapse step picks a side by terminal code.

use crate::accounts::{min_balance, ServiceAccount, ServiceAccounts, ServiceId};
use crate::codec::{encode_fixed_length, encode_natural, strip_preimage_metadata};
use crate::config::{
    C_MEMO_SIZE, FUNC_ASSIGN, FUNC_BLESS, FUNC_CHECKPOINT, FUNC_DESIGNATE, FUNC_EJECT,
    FUNC_FETCH, FUNC_FORGET, FUNC_GAS, FUNC_INFO, FUNC_LOG, FUNC_LOOKUP, FUNC_NEW,
    FUNC_PROVIDE, FUNC_QUERY, FUNC_READ, FUNC_SOLICIT, FUNC_TRANSFER, FUNC_UPGRADE,
    FUNC_WRITE, FUNC_YIELD, MAX_SERVICE_CODE_SIZE, MIN_PUBLIC_INDEX, REG_CASH, REG_CORE,
    REG_FULL, REG_HUH, REG_LOW, REG_NONE, REG_OK, REG_WHO, C_AUTH_QUEUE_SIZE, C_EXPUNGE_PERIOD,
};
use crate::crypto::blake2b256;
use crate::host_functions::general::{self, FetchSource};
use crate::host_functions::{unknown_host_call, HostCallMutator, HostCallResult};
use crate::invocation::{invoke_marshalled, MarshalledResult};
use crate::pvm::Pvm;

/// Modulus for public service-id allocation: `2^32 - 2^8 - Cminpublicindex`.
const NEXT_FREE_ID_MODULUS: u64 = (1 << 32) - 256 - MIN_PUBLIC_INDEX as u64;
/// Footprint of a fresh availability request.
const OCTETS_PER_REQUEST: u64 = 81;
/// A new service carries one request, hence two items.
const NEW_SERVICE_ITEMS: u32 = 2;
/// Bytes per validator key record consumed by DESIGNATE.
const VALIDATOR_KEY_SIZE: u32 = 336;

/// A transfer deferred to the destination's next accumulation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeferredTransfer {
    pub source: ServiceId,
    pub dest: ServiceId,
    pub amount: u64,
    /// Always exactly 128 bytes.
    pub memo: Vec<u8>,
    pub gas_limit: u64,
}

/// An always-accumulate assignment: service and its gas allowance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlwaysAccer {
    pub service: ServiceId,
    pub gas: u64,
}

/// The slice of chain state accumulation may rewrite.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartialState {
    pub accounts: ServiceAccounts,
    pub manager: ServiceId,
    pub delegator: ServiceId,
    pub registrar: ServiceId,
    /// Authorizer-assigner service per core.
    pub assigners: Vec<ServiceId>,
    pub always_accers: Vec<AlwaysAccer>,
    /// Authorization queue per core, 80 32-byte entries each.
    pub auth_queue: Vec<Vec<[u8; 32]>>,
    /// Staged validator key records (336 bytes each).
    pub staging_set: Vec<Vec<u8>>,
}

/// Accumulation's running record of side effects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Implications {
    pub id: ServiceId,
    pub state: PartialState,
    pub next_free_id: ServiceId,
    pub xfers: Vec<DeferredTransfer>,
    pub yield_hash: Option<[u8; 32]>,
    /// Preimages provided for other services: `(service, preimage)`.
    pub provisions: Vec<(ServiceId, Vec<u8>)>,
}

/// `(regular, exceptional)`: the exceptional side is used when execution
/// ends in PANIC or OOG, the regular side on HALT.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImplicationsPair {
    pub regular: Implications,
    pub exceptional: Implications,
}

/// One accumulation input. Deferred transfers carry balance into the
/// service before its code runs; operands are work-item results passed
/// through to the program via FETCH.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccumulateInput {
    Operand(Vec<u8>),
    Transfer(DeferredTransfer),
}

impl AccumulateInput {
    /// Wire form served by FETCH selectors 14/15: a type tag followed by
    /// the body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AccumulateInput::Operand(blob) => {
                let mut out = vec![0u8];
                out.extend_from_slice(&encode_natural(blob.len() as u64));
                out.extend_from_slice(blob);
                out
            }
            AccumulateInput::Transfer(xfer) => {
                let mut out = vec![1u8];
                out.extend_from_slice(&xfer.source.to_le_bytes());
                out.extend_from_slice(&xfer.dest.to_le_bytes());
                out.extend_from_slice(&xfer.amount.to_le_bytes());
                out.extend_from_slice(&xfer.memo);
                out.extend_from_slice(&xfer.gas_limit.to_le_bytes());
                out
            }
        }
    }
}

/// Outcome of `Ψ_A` after the collapse step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccumulateOutcome {
    pub post_state: PartialState,
    pub xfers: Vec<DeferredTransfer>,
    pub yield_hash: Option<[u8; 32]>,
    pub gas_used: u64,
    pub provisions: Vec<(ServiceId, Vec<u8>)>,
}

/// `Ψ_A(partial_state, timeslot, service_id, gas, inputs)`. `entropy` feeds
/// the service-id derivation; `initial_pc` is the accumulation entry point
/// (5 by the current deployment convention). `None` means the service or
/// its code preimage is absent (BAD).
pub fn accumulate(
    partial_state: &PartialState,
    timeslot: u32,
    service_id: ServiceId,
    gas: i64,
    inputs: &[AccumulateInput],
    entropy: &[u8; 32],
    initial_pc: u32,
) -> Option<AccumulateOutcome> {
    let account = partial_state.accounts.get(&service_id)?;
    let preimage = account.code()?.to_vec();

    // Degenerate code sizes succeed with no effects and no gas charged.
    if preimage.is_empty() || preimage.len() > MAX_SERVICE_CODE_SIZE {
        return Some(AccumulateOutcome {
            post_state: partial_state.clone(),
            xfers: Vec::new(),
            yield_hash: None,
            gas_used: 0,
            provisions: Vec::new(),
        });
    }

    // Incoming deferred transfers land on the balance before the code runs.
    let mut post_transfer_state = partial_state.clone();
    let incoming: u64 = inputs
        .iter()
        .filter_map(|input| match input {
            AccumulateInput::Transfer(x)
                if x.dest == service_id && x.memo.len() == C_MEMO_SIZE =>
            {
                Some(x.amount)
            }
            _ => None,
        })
        .sum();
    if let Some(account) = post_transfer_state.accounts.get_mut(&service_id) {
        account.balance = account.balance.saturating_add(incoming);
    }

    let next_free_id = derive_next_free_id(service_id, entropy, timeslot);

    let implications = Implications {
        id: service_id,
        state: post_transfer_state,
        next_free_id,
        xfers: Vec::new(),
        yield_hash: None,
        provisions: Vec::new(),
    };
    let pair = ImplicationsPair {
        exceptional: implications.clone(),
        regular: implications,
    };

    let mut argument = Vec::new();
    argument.extend_from_slice(&timeslot.to_le_bytes());
    argument.extend_from_slice(&service_id.to_le_bytes());
    argument.extend_from_slice(&encode_natural(inputs.len() as u64));

    let mut mutator = AccumulateMutator {
        pair,
        timeslot,
        expunge_period: C_EXPUNGE_PERIOD,
        fetch: FetchSource {
            entropy: Some(entropy.to_vec()),
            accumulate_inputs: Some(inputs.iter().map(AccumulateInput::encode).collect()),
            ..FetchSource::default()
        },
        log_messages: Vec::new(),
    };
    let program_blob = strip_preimage_metadata(&preimage).ok()?;
    let (gas_used, result) =
        invoke_marshalled(program_blob, initial_pc, gas, &argument, &mut mutator);

    // Collapse: the regular record survives a clean halt, the exceptional
    // one survives PANIC and OOG.
    let chosen = match result {
        MarshalledResult::Blob(_) => mutator.pair.regular,
        MarshalledResult::Panic | MarshalledResult::Oog => mutator.pair.exceptional,
    };
    Some(AccumulateOutcome {
        post_state: chosen.state,
        xfers: chosen.xfers,
        yield_hash: chosen.yield_hash,
        gas_used,
        provisions: chosen.provisions,
    })
}

/// `next_free_id`: BLAKE2b over `E4(service_id) ‖ entropy ‖ E4(timeslot)`,
/// first four bytes big-endian, folded into the public-id range.
#[must_use]
pub fn derive_next_free_id(service_id: ServiceId, entropy: &[u8; 32], timeslot: u32) -> ServiceId {
    let mut preimage = Vec::with_capacity(40);
    preimage.extend_from_slice(&encode_fixed_length(u64::from(service_id), 4));
    preimage.extend_from_slice(entropy);
    preimage.extend_from_slice(&encode_fixed_length(u64::from(timeslot), 4));
    let digest = blake2b256(&preimage);
    let h = u32::from_be_bytes(digest[0..4].try_into().expect("digest is 32 bytes"));
    ((u64::from(h) % NEXT_FREE_ID_MODULUS) + u64::from(MIN_PUBLIC_INDEX)) as ServiceId
}

struct AccumulateMutator {
    pair: ImplicationsPair,
    timeslot: u32,
    expunge_period: u32,
    fetch: FetchSource,
    log_messages: Vec<String>,
}

impl HostCallMutator for AccumulateMutator {
    fn dispatch(&mut self, host_call_id: u64, vm: &mut Pvm) -> HostCallResult {
        let own_id = self.pair.regular.id;
        match host_call_id {
            FUNC_GAS => general::gas(vm),
            FUNC_FETCH => general::fetch(vm, &self.fetch),
            FUNC_LOOKUP => general::lookup(vm, own_id, &self.pair.regular.state.accounts),
            FUNC_READ => general::read(vm, own_id, &self.pair.regular.state.accounts),
            FUNC_WRITE => general::write(vm, own_id, &mut self.pair.regular.state.accounts),
            FUNC_INFO => general::info(vm, own_id, &self.pair.regular.state.accounts),
            FUNC_BLESS => self.bless(vm),
            FUNC_ASSIGN => self.assign(vm),
            FUNC_DESIGNATE => self.designate(vm),
            FUNC_CHECKPOINT => self.checkpoint(vm),
            FUNC_NEW => self.new_service(vm),
            FUNC_UPGRADE => self.upgrade(vm),
            FUNC_TRANSFER => self.transfer(vm),
            FUNC_EJECT => self.eject(vm),
            FUNC_QUERY => self.query(vm),
            FUNC_SOLICIT => self.solicit(vm),
            FUNC_FORGET => self.forget(vm),
            FUNC_YIELD => self.yield_hash(vm),
            FUNC_PROVIDE => self.provide(vm),
            FUNC_LOG => general::log(vm, &mut self.log_messages),
            _ => unknown_host_call(vm, host_call_id),
        }
    }
}

fn reply(vm: &mut Pvm, code: u64) -> HostCallResult {
    vm.registers[7] = code;
    HostCallResult::continue_execution()
}

fn read_hash(vm: &mut Pvm, offset: u64) -> Result<[u8; 32], HostCallResult> {
    match vm.ram.read_octets(offset as u32, 32) {
        Ok(bytes) => {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes);
            Ok(hash)
        }
        Err(_) => Err(HostCallResult::panic()),
    }
}

impl AccumulateMutator {
    fn own_account(&mut self) -> Option<&mut ServiceAccount> {
        let id = self.pair.regular.id;
        self.pair.regular.state.accounts.get_mut(&id)
    }

    /// BLESS (14): `(r7..r12) = (manager, assigners offset, delegator,
    /// registrar, always-accers offset, count)`. Only the current manager
    /// may re-bless.
    fn bless(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (manager, assigners_offset, delegator) =
            (vm.registers[7], vm.registers[8], vm.registers[9]);
        let (registrar, accers_offset, count) =
            (vm.registers[10], vm.registers[11], vm.registers[12]);

        let num_cores = self.pair.regular.state.assigners.len().max(1);
        let Ok(assigner_bytes) = vm
            .ram
            .read_octets(assigners_offset as u32, 4 * num_cores as u32)
        else {
            return HostCallResult::panic();
        };
        let accers_len = 12u64
            .saturating_mul(count)
            .min(u64::from(u32::MAX)) as u32;
        let Ok(accer_bytes) = vm.ram.read_octets(accers_offset as u32, accers_len) else {
            return HostCallResult::panic();
        };

        if self.pair.regular.id != self.pair.regular.state.manager {
            return reply(vm, REG_HUH);
        }
        let ids_valid = manager < 1 << 32 && delegator < 1 << 32 && registrar < 1 << 32;
        if !ids_valid {
            return reply(vm, REG_WHO);
        }

        let state = &mut self.pair.regular.state;
        state.manager = manager as ServiceId;
        state.delegator = delegator as ServiceId;
        state.registrar = registrar as ServiceId;
        state.assigners = assigner_bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().expect("chunked by 4")))
            .collect();
        state.always_accers = accer_bytes
            .chunks_exact(12)
            .map(|c| AlwaysAccer {
                service: u32::from_le_bytes(c[0..4].try_into().expect("chunked by 12")),
                gas: u64::from_le_bytes(c[4..12].try_into().expect("chunked by 12")),
            })
            .collect();
        reply(vm, REG_OK)
    }

    /// ASSIGN (15): `(r7, r8, r9) = (core, queue offset, assigner)`. Only
    /// the core's current assigner may reassign it.
    fn assign(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (core, queue_offset, assigner) = (vm.registers[7], vm.registers[8], vm.registers[9]);

        let Ok(queue_bytes) = vm
            .ram
            .read_octets(queue_offset as u32, 32 * C_AUTH_QUEUE_SIZE)
        else {
            return HostCallResult::panic();
        };

        let state = &mut self.pair.regular.state;
        let Some(core_index) = usize::try_from(core).ok().filter(|c| *c < state.assigners.len())
        else {
            return reply(vm, REG_CORE);
        };
        if assigner >= 1 << 32 {
            return reply(vm, REG_WHO);
        }
        if state.assigners[core_index] != self.pair.regular.id {
            return reply(vm, REG_HUH);
        }

        let queue: Vec<[u8; 32]> = queue_bytes
            .chunks_exact(32)
            .map(|c| {
                let mut entry = [0u8; 32];
                entry.copy_from_slice(c);
                entry
            })
            .collect();
        if state.auth_queue.len() <= core_index {
            state.auth_queue.resize(core_index + 1, Vec::new());
        }
        state.auth_queue[core_index] = queue;
        state.assigners[core_index] = assigner as ServiceId;
        reply(vm, REG_OK)
    }

    /// DESIGNATE (16): `r7` points at the staged validator-key records.
    /// Only the delegator may designate.
    fn designate(&mut self, vm: &mut Pvm) -> HostCallResult {
        let offset = vm.registers[7];
        let num_validators = self.pair.regular.state.staging_set.len().max(1) as u32;

        let Ok(bytes) = vm
            .ram
            .read_octets(offset as u32, VALIDATOR_KEY_SIZE * num_validators)
        else {
            return HostCallResult::panic();
        };
        if self.pair.regular.id != self.pair.regular.state.delegator {
            return reply(vm, REG_HUH);
        }
        self.pair.regular.state.staging_set = bytes
            .chunks_exact(VALIDATOR_KEY_SIZE as usize)
            .map(<[u8]>::to_vec)
            .collect();
        reply(vm, REG_OK)
    }

    /// CHECKPOINT (17): `exceptional = regular`; `r7 = remaining gas`.
    fn checkpoint(&mut self, vm: &mut Pvm) -> HostCallResult {
        self.pair.exceptional = self.pair.regular.clone();
        reply(vm, vm.gas.max(0) as u64)
    }

    /// NEW (18): create a service. `(r7..r12) = (code-hash offset, code
    /// length, min acc gas, min memo gas, gratis, desired id)`; the new
    /// account is seeded with one availability request for its code.
    fn new_service(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (hash_offset, code_length) = (vm.registers[7], vm.registers[8]);
        let (min_acc_gas, min_memo_gas) = (vm.registers[9], vm.registers[10]);
        let (gratis, desired_id) = (vm.registers[11], vm.registers[12]);

        if code_length > u64::from(u32::MAX) {
            return HostCallResult::panic();
        }
        let code_hash = match read_hash(vm, hash_offset) {
            Ok(hash) => hash,
            Err(result) => return result,
        };

        let own_id = self.pair.regular.id;
        let is_manager = own_id == self.pair.regular.state.manager;
        let is_registrar = own_id == self.pair.regular.state.registrar;
        if gratis != 0 && !is_manager {
            return reply(vm, REG_HUH);
        }

        let new_octets = OCTETS_PER_REQUEST + code_length;
        let new_min_balance = min_balance(u64::from(NEW_SERVICE_ITEMS), new_octets, gratis);

        let Some(current) = self.own_account() else {
            return reply(vm, REG_HUH);
        };
        if current.balance < new_min_balance {
            return reply(vm, REG_CASH);
        }
        let balance_after = current.balance - new_min_balance;
        if balance_after < current.min_balance() {
            return reply(vm, REG_CASH);
        }

        let use_reserved =
            gratis == 0 && is_registrar && desired_id < u64::from(MIN_PUBLIC_INDEX);
        let accounts = &self.pair.regular.state.accounts;
        let (new_id, bump_next_free) = if use_reserved {
            if accounts.contains_key(&(desired_id as ServiceId)) {
                return reply(vm, REG_FULL);
            }
            (desired_id as ServiceId, false)
        } else {
            (self.pair.regular.next_free_id, true)
        };

        let mut account = ServiceAccount {
            code_hash,
            balance: new_min_balance,
            min_acc_gas,
            min_memo_gas,
            octets: new_octets,
            gratis,
            items: NEW_SERVICE_ITEMS,
            created: self.timeslot,
            parent: own_id,
            ..ServiceAccount::default()
        };
        account.requests.insert((code_hash, code_length), Vec::new());

        if let Some(current) = self.own_account() {
            current.balance = balance_after;
        }
        self.pair.regular.state.accounts.insert(new_id, account);
        if bump_next_free {
            self.pair.regular.next_free_id = next_unused_id(
                &self.pair.regular.state.accounts,
                u64::from(new_id),
            );
        }
        reply(vm, u64::from(new_id))
    }

    /// UPGRADE (19): `(r7, r8, r9) = (code-hash offset, min acc gas, min
    /// memo gas)`; rewrites the calling service's code hash and gas floors.
    fn upgrade(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (hash_offset, min_acc_gas, min_memo_gas) =
            (vm.registers[7], vm.registers[8], vm.registers[9]);
        let code_hash = match read_hash(vm, hash_offset) {
            Ok(hash) => hash,
            Err(result) => return result,
        };
        let Some(account) = self.own_account() else {
            return reply(vm, REG_HUH);
        };
        account.code_hash = code_hash;
        account.min_acc_gas = min_acc_gas;
        account.min_memo_gas = min_memo_gas;
        reply(vm, REG_OK)
    }

    /// TRANSFER (20): `(r7..r10) = (dest, amount, gas limit, memo offset)`.
    /// On success the amount is deducted, a deferred transfer is recorded
    /// and the call costs an extra `gas limit` on top of the prologue.
    fn transfer(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (dest, amount, gas_limit, memo_offset) = (
            vm.registers[7],
            vm.registers[8],
            vm.registers[9],
            vm.registers[10],
        );

        let Ok(memo) = vm.ram.read_octets(memo_offset as u32, C_MEMO_SIZE as u32) else {
            return HostCallResult::panic();
        };

        let own_id = self.pair.regular.id;
        let accounts = &self.pair.regular.state.accounts;
        if !accounts.contains_key(&own_id) {
            return reply(vm, REG_HUH);
        }
        let Some(dest_account) = crate::accounts::account_by_reg(accounts, dest) else {
            return reply(vm, REG_WHO);
        };
        if gas_limit < dest_account.min_memo_gas {
            return reply(vm, REG_LOW);
        }

        let account = self
            .own_account()
            .expect("own account checked above");
        if account.balance < amount {
            return reply(vm, REG_CASH);
        }
        let balance_after = account.balance - amount;
        if balance_after < account.min_balance() {
            return reply(vm, REG_CASH);
        }
        account.balance = balance_after;
        self.pair.regular.xfers.push(DeferredTransfer {
            source: own_id,
            dest: dest as ServiceId,
            amount,
            memo,
            gas_limit,
        });
        vm.gas -= gas_limit.min(i64::MAX as u64) as i64;
        reply(vm, REG_OK)
    }

    /// EJECT (21): `(r7, r8) = (service, hash offset)`. Removes a service
    /// whose code hash names the caller and whose availability request has
    /// lapsed, folding its balance into the caller.
    fn eject(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (target_id, hash_offset) = (vm.registers[7], vm.registers[8]);
        let hash = match read_hash(vm, hash_offset) {
            Ok(hash) => hash,
            Err(result) => return result,
        };

        let own_id = self.pair.regular.id;
        if target_id == u64::from(own_id) {
            return reply(vm, REG_WHO);
        }
        let accounts = &self.pair.regular.state.accounts;
        let Some(target) = crate::accounts::account_by_reg(accounts, target_id) else {
            return reply(vm, REG_WHO);
        };

        // The target must have ceded itself to the caller: its code hash is
        // the caller's id.
        let expected: Vec<u8> = encode_fixed_length(u64::from(own_id), 32);
        if target.code_hash.as_slice() != expected.as_slice() {
            return reply(vm, REG_WHO);
        }
        if target.items != NEW_SERVICE_ITEMS {
            return reply(vm, REG_HUH);
        }

        let request_length = target.octets.max(OCTETS_PER_REQUEST) - OCTETS_PER_REQUEST;
        let Some(history) = target.requests.get(&(hash, request_length)) else {
            return reply(vm, REG_HUH);
        };
        let lapsed = matches!(history.as_slice(), [_, y]
            if u64::from(*y) + u64::from(self.expunge_period) < u64::from(self.timeslot));
        if !lapsed {
            return reply(vm, REG_HUH);
        }

        let balance = target.balance;
        self.pair
            .regular
            .state
            .accounts
            .remove(&(target_id as ServiceId));
        if let Some(account) = self.own_account() {
            account.balance = account.balance.saturating_add(balance);
        }
        reply(vm, REG_OK)
    }

    /// QUERY (22): `(r7, r8) = (hash offset, length)`. Reports the request's
    /// timeslot history packed into `(r7, r8)`.
    fn query(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (hash_offset, length) = (vm.registers[7], vm.registers[8]);
        let hash = match read_hash(vm, hash_offset) {
            Ok(hash) => hash,
            Err(result) => return result,
        };
        let Some(account) = self.own_account() else {
            return reply(vm, REG_HUH);
        };
        let Some(history) = account.requests.get(&(hash, length)) else {
            vm.registers[8] = 0;
            return reply(vm, REG_NONE);
        };
        let (a, b) = match history.as_slice() {
            [] => (0, 0),
            [x] => (1 + (u64::from(*x) << 32), 0),
            [x, y] => (2 + (u64::from(*x) << 32), u64::from(*y)),
            [x, y, z] => (3 + (u64::from(*x) << 32), u64::from(*y) + (u64::from(*z) << 32)),
            _ => return reply(vm, REG_HUH),
        };
        vm.registers[8] = b;
        reply(vm, a)
    }

    /// SOLICIT (23): `(r7, r8) = (hash offset, length)`. Opens a fresh
    /// availability request, or re-opens a lapsed `[x, y]` one by appending
    /// the current timeslot.
    fn solicit(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (hash_offset, length) = (vm.registers[7], vm.registers[8]);
        let hash = match read_hash(vm, hash_offset) {
            Ok(hash) => hash,
            Err(result) => return result,
        };
        let timeslot = self.timeslot;
        let Some(account) = self.own_account() else {
            return reply(vm, REG_HUH);
        };

        let (new_history, is_new) = match account.requests.get(&(hash, length)) {
            None => (Vec::new(), true),
            Some(history) if history.len() == 2 => {
                let mut history = history.clone();
                history.push(timeslot);
                (history, false)
            }
            Some(_) => return reply(vm, REG_HUH),
        };

        let (new_items, new_octets) = if is_new {
            let Some(new_octets) = OCTETS_PER_REQUEST
                .checked_add(length)
                .and_then(|delta| account.octets.checked_add(delta))
            else {
                return reply(vm, REG_FULL);
            };
            (account.items.saturating_add(2), new_octets)
        } else {
            (account.items, account.octets)
        };
        if min_balance(u64::from(new_items), new_octets, account.gratis) > account.balance {
            return reply(vm, REG_FULL);
        }

        account.requests.insert((hash, length), new_history);
        account.items = new_items;
        account.octets = new_octets;
        reply(vm, REG_OK)
    }

    /// FORGET (24): `(r7, r8) = (hash offset, length)`. Drops or winds down
    /// an availability request depending on its history and the expunge
    /// period.
    fn forget(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (hash_offset, length) = (vm.registers[7], vm.registers[8]);
        let hash = match read_hash(vm, hash_offset) {
            Ok(hash) => hash,
            Err(result) => return result,
        };
        let timeslot = self.timeslot;
        let expunge_period = self.expunge_period;
        let Some(account) = self.own_account() else {
            return reply(vm, REG_HUH);
        };
        let Some(history) = account.requests.get(&(hash, length)).cloned() else {
            return reply(vm, REG_HUH);
        };

        let lapsed = |y: u32| u64::from(y) + u64::from(expunge_period) < u64::from(timeslot);
        match history.as_slice() {
            [] => drop_request(account, &hash, length),
            [_, y] if lapsed(*y) => drop_request(account, &hash, length),
            [x] => {
                account.requests.insert((hash, length), vec![*x, timeslot]);
            }
            [_, y, z] if lapsed(*y) => {
                account.requests.insert((hash, length), vec![*z, timeslot]);
            }
            _ => return reply(vm, REG_HUH),
        }
        reply(vm, REG_OK)
    }

    /// YIELD (25): `r7` points at a 32-byte hash stored as the accumulation
    /// yield.
    fn yield_hash(&mut self, vm: &mut Pvm) -> HostCallResult {
        let hash = match read_hash(vm, vm.registers[7]) {
            Ok(hash) => hash,
            Err(result) => return result,
        };
        self.pair.regular.yield_hash = Some(hash);
        reply(vm, REG_OK)
    }

    /// PROVIDE (26): `(r7, r8, r9) = (service, preimage offset, length)`.
    /// Records a preimage for a service that has an open request for it.
    fn provide(&mut self, vm: &mut Pvm) -> HostCallResult {
        let (selector, offset, length) = (vm.registers[7], vm.registers[8], vm.registers[9]);
        let Ok(preimage) = vm.ram.read_octets(offset as u32, length as u32) else {
            return HostCallResult::panic();
        };

        let own_id = self.pair.regular.id;
        let target_id = if selector == REG_NONE {
            own_id
        } else if let Ok(id) = u32::try_from(selector) {
            id
        } else {
            return reply(vm, REG_WHO);
        };
        let Some(target) = self.pair.regular.state.accounts.get(&target_id) else {
            return reply(vm, REG_WHO);
        };

        let hash = blake2b256(&preimage);
        match target.requests.get(&(hash, length)) {
            Some(history) if history.is_empty() => {}
            _ => return reply(vm, REG_HUH),
        }
        if self
            .pair
            .regular
            .provisions
            .iter()
            .any(|(id, blob)| *id == target_id && *blob == preimage)
        {
            return reply(vm, REG_HUH);
        }
        self.pair.regular.provisions.push((target_id, preimage));
        reply(vm, REG_OK)
    }
}

fn drop_request(account: &mut ServiceAccount, hash: &[u8; 32], length: u64) {
    account.requests.remove(&(*hash, length));
    account.preimages.remove(hash);
    account.items = account.items.saturating_sub(2);
    account.octets = account
        .octets
        .saturating_sub(OCTETS_PER_REQUEST + length);
}

/// Walk the public-id sequence until an unused id is found.
fn next_unused_id(accounts: &ServiceAccounts, from: u64) -> ServiceId {
    let min = u64::from(MIN_PUBLIC_INDEX);
    let mut candidate = min + ((from - min + 42) % NEXT_FREE_ID_MODULUS);
    while accounts.contains_key(&(candidate as ServiceId)) {
        candidate = min + ((candidate - min + 1) % NEXT_FREE_ID_MODULUS);
    }
    candidate as ServiceId
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_service(service_id: ServiceId, code: &[u8]) -> PartialState {
        let mut state = PartialState::default();
        let mut account = ServiceAccount {
            balance: 1_000_000,
            ..ServiceAccount::default()
        };
        account.code_hash = blake2b256(code);
        account.preimages.insert(account.code_hash, code.to_vec());
        state.accounts.insert(service_id, account);
        state
    }

    #[test]
    fn absent_service_is_bad() {
        let state = PartialState::default();
        assert!(accumulate(&state, 1, 9, 1000, &[], &[0; 32], 5).is_none());
    }

    #[test]
    fn absent_code_preimage_is_bad() {
        let mut state = PartialState::default();
        state.accounts.insert(9, ServiceAccount::default());
        assert!(accumulate(&state, 1, 9, 1000, &[], &[0; 32], 5).is_none());
    }

    #[test]
    fn oversized_code_succeeds_with_no_effects() {
        let code = vec![0u8; MAX_SERVICE_CODE_SIZE + 1];
        let state = state_with_service(9, &code);
        let outcome = accumulate(&state, 1, 9, 1000, &[], &[0; 32], 5).unwrap();
        assert_eq!(outcome.post_state, state);
        assert_eq!(outcome.gas_used, 0);
        assert!(outcome.xfers.is_empty());
        assert!(outcome.provisions.is_empty());
        assert!(outcome.yield_hash.is_none());
    }

    #[test]
    fn next_free_id_lands_in_public_range_and_is_deterministic() {
        let a = derive_next_free_id(42, &[7; 32], 1000);
        let b = derive_next_free_id(42, &[7; 32], 1000);
        assert_eq!(a, b);
        assert!(a >= MIN_PUBLIC_INDEX);
        assert_ne!(derive_next_free_id(43, &[7; 32], 1000), a);
    }

    fn transfer_to(dest: ServiceId, amount: u64) -> AccumulateInput {
        AccumulateInput::Transfer(DeferredTransfer {
            source: 1,
            dest,
            amount,
            memo: vec![0; C_MEMO_SIZE],
            gas_limit: 0,
        })
    }

    #[test]
    fn incoming_transfers_raise_the_balance_before_the_run() {
        let preimage =
            crate::testutil::service_preimage(b"", &crate::testutil::halting_program_blob());
        let state = state_with_service(9, &preimage);
        let outcome = accumulate(
            &state,
            1,
            9,
            1000,
            &[transfer_to(9, 500), transfer_to(8, 999)],
            &[0; 32],
            0,
        )
        .unwrap();
        // Only the transfer addressed to this service lands.
        assert_eq!(outcome.post_state.accounts[&9].balance, 1_000_500);
        assert_eq!(outcome.gas_used, 1);
        assert!(outcome.xfers.is_empty());
    }

    #[test]
    fn malformed_transfer_memo_is_ignored() {
        let preimage =
            crate::testutil::service_preimage(b"", &crate::testutil::halting_program_blob());
        let state = state_with_service(9, &preimage);
        let bad_memo = AccumulateInput::Transfer(DeferredTransfer {
            source: 1,
            dest: 9,
            amount: 500,
            memo: vec![0; 3],
            gas_limit: 0,
        });
        let outcome = accumulate(&state, 1, 9, 1000, &[bad_memo], &[0; 32], 0).unwrap();
        assert_eq!(outcome.post_state.accounts[&9].balance, 1_000_000);
    }

    #[test]
    fn panicking_code_collapses_to_the_exceptional_record() {
        use crate::config::OPCODE_TRAP;
        let preimage = crate::testutil::service_preimage(
            b"",
            &crate::testutil::program_blob(&[OPCODE_TRAP], &[1], &[]),
        );
        let state = state_with_service(9, &preimage);
        let outcome =
            accumulate(&state, 1, 9, 1000, &[transfer_to(9, 500)], &[0; 32], 0).unwrap();
        // Both records carry the applied incoming transfer; nothing the run
        // did past that survives.
        assert_eq!(outcome.post_state.accounts[&9].balance, 1_000_500);
        assert_eq!(outcome.gas_used, 1);
        assert!(outcome.yield_hash.is_none());
    }

    #[test]
    fn yield_host_call_sets_the_accumulation_hash() {
        use crate::config::{OPCODE_ECALLI, OPCODE_JUMP_IND};
        // ecalli 25 (yield) reads 32 bytes at r7, which still points at the
        // argument region; then halt.
        let preimage = crate::testutil::service_preimage(
            b"",
            &crate::testutil::program_blob(
                &[OPCODE_ECALLI, 25, OPCODE_JUMP_IND, 0x00],
                &[1, 0, 1, 0],
                &[],
            ),
        );
        let state = state_with_service(9, &preimage);
        let timeslot = 7u32;
        let outcome = accumulate(&state, timeslot, 9, 1000, &[], &[0; 32], 0).unwrap();

        // The argument encoding, zero-padded to the 32 bytes YIELD read.
        let mut expected = [0u8; 32];
        expected[0..4].copy_from_slice(&timeslot.to_le_bytes());
        expected[4..8].copy_from_slice(&9u32.to_le_bytes());
        expected[8] = 0; // encode_natural(0)
        assert_eq!(outcome.yield_hash, Some(expected));
        // ecalli + prologue + halting jump.
        assert_eq!(outcome.gas_used, 12);
    }
}
