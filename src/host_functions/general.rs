//! General host functions (ids 0-6 and LOG), shared by the invocation
//! wrappers: gas introspection, the selector-based FETCH, service storage
//! and preimage access, account info and the JIP-1 LOG call.

use crate::accounts::{account_by_reg, ServiceAccounts, ServiceId};
use crate::codec::encode_natural;
use crate::config::{
    SystemConstants, C_ASSURANCE_TIMEOUT_PERIOD, C_AUTH_POOL_SIZE, C_AUTH_QUEUE_SIZE,
    C_BASE_DEPOSIT, C_BYTE_DEPOSIT, C_ITEM_DEPOSIT, C_MAX_BUNDLE_SIZE, C_MAX_PACKAGE_IMPORTS,
    C_MAX_PACKAGE_ITEMS, C_MAX_PACKAGE_XTS, C_MAX_REPORT_DEPS, C_MAX_REPORT_VAR_SIZE,
    C_MEMO_SIZE, C_RECENT_HISTORY_LEN, C_REPORT_ACC_GAS, MAX_AUTH_CODE_SIZE,
    MAX_PACKAGE_EXPORTS, MAX_SERVICE_CODE_SIZE, PACKAGE_AUTH_GAS, REG_FULL, REG_NONE,
};
use crate::host_functions::HostCallResult;
use crate::pvm::Pvm;

/// GAS (0): `r7 = remaining gas` (after the 10-gas prologue).
pub fn gas(vm: &mut Pvm) -> HostCallResult {
    vm.registers[7] = vm.gas.max(0) as u64;
    HostCallResult::continue_execution()
}

// ============================================================================
// FETCH (1)
// ============================================================================

/// Data the FETCH selectors draw from; wrappers populate what their
/// invocation provides and leave the rest `None` (fetched as `NONE`).
#[derive(Clone, Debug, Default)]
pub struct FetchSource {
    pub constants: SystemConstants,
    /// Selector 1: the 32-byte entropy accumulator.
    pub entropy: Option<Vec<u8>>,
    /// Selector 2: the authorizer trace.
    pub authorizer_trace: Option<Vec<u8>>,
    /// Selectors 3/4: exported segments, per work item.
    pub export_segments: Option<Vec<Vec<Vec<u8>>>>,
    /// Selectors 5/6: imported segments, per work item.
    pub import_segments: Option<Vec<Vec<Vec<u8>>>>,
    /// Selectors 4/6: the executing work item's index.
    pub work_item_index: Option<u64>,
    /// Selector 7: the encoded work package.
    pub work_package: Option<Vec<u8>>,
    /// Selector 8: authorization config blob.
    pub auth_config: Option<Vec<u8>>,
    /// Selector 9: authorization token blob.
    pub auth_token: Option<Vec<u8>>,
    /// Selector 10: the encoded refine context.
    pub refine_context: Option<Vec<u8>>,
    /// Selectors 11/12: encoded work-item summaries.
    pub work_item_summaries: Option<Vec<Vec<u8>>>,
    /// Selector 13: work-item payloads.
    pub work_item_payloads: Option<Vec<Vec<u8>>>,
    /// Selectors 14/15: encoded accumulate inputs.
    pub accumulate_inputs: Option<Vec<Vec<u8>>>,
}

impl FetchSource {
    fn indexed(list: Option<&Vec<Vec<u8>>>, index: u64) -> Option<Vec<u8>> {
        list?.get(usize::try_from(index).ok()?).cloned()
    }

    fn segment(
        segments: Option<&Vec<Vec<Vec<u8>>>>,
        item: u64,
        index: u64,
    ) -> Option<Vec<u8>> {
        segments?
            .get(usize::try_from(item).ok()?)?
            .get(usize::try_from(index).ok()?)
            .cloned()
    }

    fn concatenated(list: Option<&Vec<Vec<u8>>>) -> Option<Vec<u8>> {
        let list = list?;
        let mut out = encode_natural(list.len() as u64);
        for item in list {
            out.extend_from_slice(item);
        }
        Some(out)
    }

    /// Resolve one selector; `None` becomes the `NONE` register code.
    fn data(&self, selector: u32, registers: &[u64; 13]) -> Option<Vec<u8>> {
        match selector {
            0 => Some(encode_system_constants(&self.constants)),
            1 => self.entropy.clone(),
            2 => self.authorizer_trace.clone(),
            3 => Self::segment(self.export_segments.as_ref(), registers[11], registers[12]),
            4 => Self::segment(
                self.export_segments.as_ref(),
                self.work_item_index?,
                registers[11],
            ),
            5 => Self::segment(self.import_segments.as_ref(), registers[11], registers[12]),
            6 => Self::segment(
                self.import_segments.as_ref(),
                self.work_item_index?,
                registers[11],
            ),
            7 => self.work_package.clone(),
            8 => self.auth_config.clone(),
            9 => self.auth_token.clone(),
            10 => self.refine_context.clone(),
            11 => Self::concatenated(self.work_item_summaries.as_ref()),
            12 => Self::indexed(self.work_item_summaries.as_ref(), registers[11]),
            13 => Self::indexed(self.work_item_payloads.as_ref(), registers[11]),
            14 => Self::concatenated(self.accumulate_inputs.as_ref()),
            15 => Self::indexed(self.accumulate_inputs.as_ref(), registers[11]),
            _ => None,
        }
    }
}

/// FETCH (1): selector in `r10`; on data, writes `v[r8 .. r8 + r9]` to the
/// address in `r7` and sets `r7 = |v|`; otherwise `r7 = NONE`. An unwritable
/// destination panics.
pub fn fetch(vm: &mut Pvm, source: &FetchSource) -> HostCallResult {
    let selector = (vm.registers[10] & 0xffff_ffff) as u32;
    let output_offset = vm.registers[7];
    let from = vm.registers[8];
    let length = vm.registers[9];

    let Some(data) = source.data(selector, &vm.registers) else {
        vm.registers[7] = REG_NONE;
        return HostCallResult::continue_execution();
    };

    let total = data.len() as u64;
    let from = from.min(total) as usize;
    let count = length.min(total - from as u64) as usize;
    if count > 0
        && vm
            .ram
            .write_octets(output_offset as u32, &data[from..from + count])
            .is_err()
    {
        return HostCallResult::panic();
    }
    vm.registers[7] = total;
    HostCallResult::continue_execution()
}

/// Selector-0 payload: the 134-byte system-constants record.
fn encode_system_constants(c: &SystemConstants) -> Vec<u8> {
    let mut buf = Vec::with_capacity(134);
    buf.extend_from_slice(&C_ITEM_DEPOSIT.to_le_bytes());
    buf.extend_from_slice(&C_BYTE_DEPOSIT.to_le_bytes());
    buf.extend_from_slice(&C_BASE_DEPOSIT.to_le_bytes());
    buf.extend_from_slice(&(c.num_cores as u16).to_le_bytes());
    buf.extend_from_slice(&c.preimage_expunge_period.to_le_bytes());
    buf.extend_from_slice(&c.epoch_duration.to_le_bytes());
    buf.extend_from_slice(&C_REPORT_ACC_GAS.to_le_bytes());
    buf.extend_from_slice(&(PACKAGE_AUTH_GAS as u64).to_le_bytes());
    buf.extend_from_slice(&c.max_refine_gas.to_le_bytes());
    buf.extend_from_slice(&c.max_block_gas.to_le_bytes());
    buf.extend_from_slice(&(C_RECENT_HISTORY_LEN as u16).to_le_bytes());
    buf.extend_from_slice(&(C_MAX_PACKAGE_ITEMS as u16).to_le_bytes());
    buf.extend_from_slice(&(C_MAX_REPORT_DEPS as u16).to_le_bytes());
    buf.extend_from_slice(&(c.max_tickets_per_extrinsic as u16).to_le_bytes());
    buf.extend_from_slice(&c.max_lookup_anchorage.to_le_bytes());
    buf.extend_from_slice(&(c.tickets_per_validator as u16).to_le_bytes());
    buf.extend_from_slice(&(C_AUTH_POOL_SIZE as u16).to_le_bytes());
    buf.extend_from_slice(&(c.slot_duration as u16).to_le_bytes());
    buf.extend_from_slice(&(C_AUTH_QUEUE_SIZE as u16).to_le_bytes());
    buf.extend_from_slice(&(c.rotation_period as u16).to_le_bytes());
    buf.extend_from_slice(&(C_MAX_PACKAGE_XTS as u16).to_le_bytes());
    buf.extend_from_slice(&(C_ASSURANCE_TIMEOUT_PERIOD as u16).to_le_bytes());
    buf.extend_from_slice(&(c.num_validators as u16).to_le_bytes());
    buf.extend_from_slice(&(MAX_AUTH_CODE_SIZE as u32).to_le_bytes());
    buf.extend_from_slice(&C_MAX_BUNDLE_SIZE.to_le_bytes());
    buf.extend_from_slice(&(MAX_SERVICE_CODE_SIZE as u32).to_le_bytes());
    buf.extend_from_slice(&c.ec_piece_size.to_le_bytes());
    buf.extend_from_slice(&C_MAX_PACKAGE_IMPORTS.to_le_bytes());
    buf.extend_from_slice(&c.num_ec_pieces_per_segment.to_le_bytes());
    buf.extend_from_slice(&C_MAX_REPORT_VAR_SIZE.to_le_bytes());
    buf.extend_from_slice(&(C_MEMO_SIZE as u32).to_le_bytes());
    buf.extend_from_slice(&(MAX_PACKAGE_EXPORTS as u32).to_le_bytes());
    buf.extend_from_slice(&c.contest_duration.to_le_bytes());
    buf
}

// ============================================================================
// LOOKUP (2), READ (3), WRITE (4), INFO (5), HISTORICAL_LOOKUP (6)
// ============================================================================

fn resolve<'a>(
    accounts: &'a ServiceAccounts,
    own_id: ServiceId,
    selector: u64,
) -> Option<&'a crate::accounts::ServiceAccount> {
    if selector == REG_NONE {
        accounts.get(&own_id)
    } else {
        account_by_reg(accounts, selector)
    }
}

/// Write `value[from..from+len]` to `output`, then `r7 = |value|`.
fn reply_with_slice(vm: &mut Pvm, value: &[u8], output: u64, from: u64, length: u64) -> HostCallResult {
    let total = value.len() as u64;
    let from = from.min(total) as usize;
    let count = length.min(total - from as u64) as usize;
    if count > 0
        && vm
            .ram
            .write_octets(output as u32, &value[from..from + count])
            .is_err()
    {
        return HostCallResult::panic();
    }
    vm.registers[7] = total;
    HostCallResult::continue_execution()
}

/// LOOKUP (2): preimage by hash. `r7` selects the account (`NONE` = self),
/// `r8` the 32-byte hash, output at `r9` sliced by `(r10, r11)`.
pub fn lookup(vm: &mut Pvm, own_id: ServiceId, accounts: &ServiceAccounts) -> HostCallResult {
    let selector = vm.registers[7];
    let hash_offset = vm.registers[8];
    let (output, from, length) = (vm.registers[9], vm.registers[10], vm.registers[11]);

    let Ok(hash) = vm.ram.read_octets(hash_offset as u32, 32) else {
        return HostCallResult::panic();
    };
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash);

    let value = resolve(accounts, own_id, selector).and_then(|a| a.preimages.get(&key));
    match value {
        Some(value) => {
            let value = value.clone();
            reply_with_slice(vm, &value, output, from, length)
        }
        None => {
            vm.registers[7] = REG_NONE;
            HostCallResult::continue_execution()
        }
    }
}

/// READ (3): service storage. `r7` selects the account, key at `(r8, r9)`,
/// output at `r10` sliced by `(r11, r12)`.
pub fn read(vm: &mut Pvm, own_id: ServiceId, accounts: &ServiceAccounts) -> HostCallResult {
    let selector = vm.registers[7];
    let (key_offset, key_length) = (vm.registers[8], vm.registers[9]);
    let (output, from, length) = (vm.registers[10], vm.registers[11], vm.registers[12]);

    let Ok(key) = vm.ram.read_octets(key_offset as u32, key_length as u32) else {
        return HostCallResult::panic();
    };

    let value = resolve(accounts, own_id, selector).and_then(|a| a.storage.get(&key));
    match value {
        Some(value) => {
            let value = value.clone();
            reply_with_slice(vm, &value, output, from, length)
        }
        None => {
            vm.registers[7] = REG_NONE;
            HostCallResult::continue_execution()
        }
    }
}

/// WRITE (4): update own storage. Key at `(r7, r8)`, value at `(r9, r10)`;
/// zero value length deletes. `r7` reports the previous length (`NONE` when
/// absent) or `FULL` when the balance cannot cover the new footprint.
pub fn write(vm: &mut Pvm, own_id: ServiceId, accounts: &mut ServiceAccounts) -> HostCallResult {
    let (key_offset, key_length) = (vm.registers[7], vm.registers[8]);
    let (value_offset, value_length) = (vm.registers[9], vm.registers[10]);

    let Ok(key) = vm.ram.read_octets(key_offset as u32, key_length as u32) else {
        return HostCallResult::panic();
    };
    let value = if value_length == 0 {
        None
    } else {
        match vm.ram.read_octets(value_offset as u32, value_length as u32) {
            Ok(value) => Some(value),
            Err(_) => return HostCallResult::panic(),
        }
    };

    let Some(account) = accounts.get_mut(&own_id) else {
        return HostCallResult::panic();
    };

    let previous = account.storage.get(&key).map(Vec::len);
    // Footprint per entry: 34 + |key| + |value| octets, one item.
    let entry_octets = |len: usize| 34 + key.len() as u64 + len as u64;
    let (new_items, new_octets) = match (&value, previous) {
        (Some(v), Some(p)) => (
            u64::from(account.items),
            (account.octets as i64 + v.len() as i64 - p as i64).max(0) as u64,
        ),
        (Some(v), None) => (
            u64::from(account.items) + 1,
            account.octets.saturating_add(entry_octets(v.len())),
        ),
        (None, Some(p)) => (
            u64::from(account.items).saturating_sub(1),
            account.octets.saturating_sub(entry_octets(p)),
        ),
        (None, None) => (u64::from(account.items), account.octets),
    };

    if crate::accounts::min_balance(new_items, new_octets, account.gratis) > account.balance {
        vm.registers[7] = REG_FULL;
        return HostCallResult::continue_execution();
    }

    match value {
        Some(v) => {
            account.storage.insert(key, v);
        }
        None => {
            account.storage.remove(&key);
        }
    }
    account.items = new_items as u32;
    account.octets = new_octets;
    vm.registers[7] = previous.map_or(REG_NONE, |p| p as u64);
    HostCallResult::continue_execution()
}

/// The 96-byte INFO record.
fn encode_info(account: &crate::accounts::ServiceAccount) -> [u8; 96] {
    let mut info = [0u8; 96];
    info[0..32].copy_from_slice(&account.code_hash);
    info[32..40].copy_from_slice(&account.balance.to_le_bytes());
    info[40..48].copy_from_slice(&account.min_balance().to_le_bytes());
    info[48..56].copy_from_slice(&account.min_acc_gas.to_le_bytes());
    info[56..64].copy_from_slice(&account.min_memo_gas.to_le_bytes());
    info[64..72].copy_from_slice(&account.octets.to_le_bytes());
    info[72..76].copy_from_slice(&account.items.to_le_bytes());
    info[76..84].copy_from_slice(&account.gratis.to_le_bytes());
    info[84..88].copy_from_slice(&account.created.to_le_bytes());
    info[88..92].copy_from_slice(&account.last_acc.to_le_bytes());
    info[92..96].copy_from_slice(&account.parent.to_le_bytes());
    info
}

/// INFO (5): account summary. `r7` selects the account, output at `r8`
/// sliced by `(r9, r10)`.
pub fn info(vm: &mut Pvm, own_id: ServiceId, accounts: &ServiceAccounts) -> HostCallResult {
    let selector = vm.registers[7];
    let (output, from, length) = (vm.registers[8], vm.registers[9], vm.registers[10]);

    let Some(account) = resolve(accounts, own_id, selector) else {
        vm.registers[7] = REG_NONE;
        return HostCallResult::continue_execution();
    };
    let info = encode_info(account);
    reply_with_slice(vm, &info, output, from, length)
}

/// HISTORICAL_LOOKUP (6): like LOOKUP but the preimage must have been
/// available at `lookup_timeslot` per its request history.
pub fn historical_lookup(
    vm: &mut Pvm,
    own_id: ServiceId,
    accounts: &ServiceAccounts,
    lookup_timeslot: u32,
) -> HostCallResult {
    let selector = vm.registers[7];
    let hash_offset = vm.registers[8];
    let (output, from, length) = (vm.registers[9], vm.registers[10], vm.registers[11]);

    let Ok(hash) = vm.ram.read_octets(hash_offset as u32, 32) else {
        return HostCallResult::panic();
    };
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash);

    let value = resolve(accounts, own_id, selector).and_then(|account| {
        let value = account.preimages.get(&key)?;
        account
            .preimage_available_at(&key, value.len() as u64, lookup_timeslot)
            .then(|| value.clone())
    });
    match value {
        Some(value) => reply_with_slice(vm, &value, output, from, length),
        None => {
            vm.registers[7] = REG_NONE;
            HostCallResult::continue_execution()
        }
    }
}

// ============================================================================
// LOG (100)
// ============================================================================

/// LOG (100, JIP-1): level in `r7`, optional target at `(r8, r9)`, message
/// at `(r10, r11)`. Messages are pushed onto the invocation's buffer and
/// forwarded to `tracing`; an unreadable range is a no-op.
pub fn log(vm: &mut Pvm, messages: &mut Vec<String>) -> HostCallResult {
    let level = vm.registers[7];
    let target = match (vm.registers[8], vm.registers[9]) {
        (0, _) | (_, 0) => None,
        (offset, length) => vm
            .ram
            .read_octets(offset as u32, length as u32)
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
    };
    let Ok(message) = vm
        .ram
        .read_octets(vm.registers[10] as u32, vm.registers[11] as u32)
    else {
        return HostCallResult::continue_execution();
    };
    let message = String::from_utf8_lossy(&message).into_owned();

    let level_str = match level {
        0 => "FATAL",
        1 => "WARN",
        2 => "INFO",
        3 => "DEBUG",
        4 => "TRACE",
        _ => "INFO",
    };
    let formatted = match &target {
        Some(target) => format!("{level_str} [{target}] {message}"),
        None => format!("{level_str} {message}"),
    };
    match level {
        0 | 1 => tracing::warn!(target: "pvm_guest", "{formatted}"),
        2 => tracing::info!(target: "pvm_guest", "{formatted}"),
        3 => tracing::debug!(target: "pvm_guest", "{formatted}"),
        _ => tracing::trace!(target: "pvm_guest", "{formatted}"),
    }
    messages.push(formatted);
    HostCallResult::continue_execution()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::ServiceAccount;
    use crate::config::{GasModel, PAGE_SIZE};
    use crate::parser::Program;
    use crate::ram::PagedRam;
    use crate::types::PageAccess;

    const BASE: u32 = 16 * PAGE_SIZE;

    fn vm() -> Pvm {
        let mut ram = PagedRam::new();
        ram.set_page_access_rights(BASE, PAGE_SIZE, PageAccess::Write, false);
        Pvm::new(Program::default(), 0, 1000, [0; 13], ram, GasModel::default())
    }

    fn accounts_with(id: u32, account: ServiceAccount) -> ServiceAccounts {
        let mut accounts = ServiceAccounts::new();
        accounts.insert(id, account);
        accounts
    }

    #[test]
    fn gas_reports_the_remaining_budget() {
        let mut vm = vm();
        vm.gas = 123;
        assert!(gas(&mut vm).should_continue());
        assert_eq!(vm.registers[7], 123);
    }

    #[test]
    fn fetch_unknown_selector_is_none() {
        let mut vm = vm();
        vm.registers[10] = 99;
        assert!(fetch(&mut vm, &FetchSource::default()).should_continue());
        assert_eq!(vm.registers[7], REG_NONE);
    }

    #[test]
    fn fetch_writes_the_requested_slice_and_reports_total_length() {
        let mut vm = vm();
        let source = FetchSource {
            entropy: Some(vec![9u8; 32]),
            ..FetchSource::default()
        };
        vm.registers[10] = 1; // entropy selector
        vm.registers[7] = u64::from(BASE);
        vm.registers[8] = 4; // from
        vm.registers[9] = 8; // length
        assert!(fetch(&mut vm, &source).should_continue());
        assert_eq!(vm.registers[7], 32);
        assert_eq!(vm.ram.read_octets(BASE, 8).unwrap(), vec![9u8; 8]);
    }

    #[test]
    fn fetch_to_unwritable_destination_panics() {
        let mut vm = vm();
        let source = FetchSource {
            entropy: Some(vec![9u8; 32]),
            ..FetchSource::default()
        };
        vm.registers[10] = 1;
        vm.registers[7] = 0; // reserved page
        vm.registers[9] = 8;
        assert_eq!(fetch(&mut vm, &source), HostCallResult::panic());
    }

    #[test]
    fn system_constants_record_is_134_bytes() {
        assert_eq!(encode_system_constants(&SystemConstants::default()).len(), 134);
    }

    #[test]
    fn storage_write_then_read_round_trips() {
        let mut vm = vm();
        let mut accounts = accounts_with(
            5,
            ServiceAccount {
                balance: 1_000_000,
                ..ServiceAccount::default()
            },
        );

        vm.ram.write_octets(BASE, b"key").unwrap();
        vm.ram.write_octets(BASE + 100, b"value").unwrap();
        vm.registers[7] = u64::from(BASE); // key offset
        vm.registers[8] = 3; // key length
        vm.registers[9] = u64::from(BASE + 100);
        vm.registers[10] = 5;
        assert!(write(&mut vm, 5, &mut accounts).should_continue());
        assert_eq!(vm.registers[7], REG_NONE); // no previous value
        assert_eq!(accounts[&5].items, 1);

        // Read it back through READ with the self selector.
        vm.registers[7] = REG_NONE;
        vm.registers[8] = u64::from(BASE);
        vm.registers[9] = 3;
        vm.registers[10] = u64::from(BASE + 200);
        vm.registers[11] = 0;
        vm.registers[12] = 5;
        assert!(read(&mut vm, 5, &accounts).should_continue());
        assert_eq!(vm.registers[7], 5);
        assert_eq!(vm.ram.read_octets(BASE + 200, 5).unwrap(), b"value");
    }

    #[test]
    fn storage_write_over_budget_is_full() {
        let mut vm = vm();
        let mut accounts = accounts_with(5, ServiceAccount::default());
        vm.ram.write_octets(BASE, b"key").unwrap();
        vm.registers[7] = u64::from(BASE);
        vm.registers[8] = 3;
        vm.registers[9] = u64::from(BASE + 100);
        vm.registers[10] = 5;
        assert!(write(&mut vm, 5, &mut accounts).should_continue());
        assert_eq!(vm.registers[7], REG_FULL);
        assert!(accounts[&5].storage.is_empty());
    }

    #[test]
    fn info_reports_the_96_byte_record() {
        let mut vm = vm();
        let accounts = accounts_with(
            5,
            ServiceAccount {
                balance: 777,
                items: 3,
                ..ServiceAccount::default()
            },
        );
        vm.registers[7] = REG_NONE;
        vm.registers[8] = u64::from(BASE);
        vm.registers[9] = 0;
        vm.registers[10] = 96;
        assert!(info(&mut vm, 5, &accounts).should_continue());
        assert_eq!(vm.registers[7], 96);
        let record = vm.ram.read_octets(BASE, 96).unwrap();
        assert_eq!(&record[32..40], &777u64.to_le_bytes());
    }

    #[test]
    fn lookup_finds_preimages_by_hash() {
        let mut vm = vm();
        let mut account = ServiceAccount::default();
        let hash = crate::crypto::blake2b256(b"blob");
        account.preimages.insert(hash, b"blob".to_vec());
        let accounts = accounts_with(5, account);

        vm.ram.write_octets(BASE, &hash).unwrap();
        vm.registers[7] = REG_NONE;
        vm.registers[8] = u64::from(BASE);
        vm.registers[9] = u64::from(BASE + 64);
        vm.registers[10] = 0;
        vm.registers[11] = 4;
        assert!(lookup(&mut vm, 5, &accounts).should_continue());
        assert_eq!(vm.registers[7], 4);
        assert_eq!(vm.ram.read_octets(BASE + 64, 4).unwrap(), b"blob");
    }

    #[test]
    fn log_collects_formatted_messages() {
        let mut vm = vm();
        vm.ram.write_octets(BASE, b"hello").unwrap();
        vm.registers[7] = 2; // info level
        vm.registers[10] = u64::from(BASE);
        vm.registers[11] = 5;
        let mut messages = Vec::new();
        assert!(log(&mut vm, &mut messages).should_continue());
        assert_eq!(messages, vec!["INFO hello".to_string()]);
    }

    #[test]
    fn log_with_unreadable_message_is_a_no_op() {
        let mut vm = vm();
        vm.registers[10] = 0; // reserved page
        vm.registers[11] = 4;
        let mut messages = Vec::new();
        assert!(log(&mut vm, &mut messages).should_continue());
        assert!(messages.is_empty());
    }
}
