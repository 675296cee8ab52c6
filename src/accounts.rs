//! Service accounts as the invocation wrappers see them: balances, code
//! preimages, storage and preimage-availability requests. Ordered maps keep
//! iteration deterministic.

use crate::config::{C_BASE_DEPOSIT, C_BYTE_DEPOSIT, C_ITEM_DEPOSIT};
use std::collections::BTreeMap;

pub type ServiceId = u32;

/// Accounts dictionary keyed by service id.
pub type ServiceAccounts = BTreeMap<ServiceId, ServiceAccount>;

/// Look up an account by a register-supplied id; anything at or above 2^32
/// cannot name a service.
#[must_use]
pub fn account_by_reg(accounts: &ServiceAccounts, id: u64) -> Option<&ServiceAccount> {
    u32::try_from(id).ok().and_then(|id| accounts.get(&id))
}

/// One service account, with its key-value storage, preimage store and
/// preimage-availability requests held as typed maps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceAccount {
    pub code_hash: [u8; 32],
    pub balance: u64,
    pub min_acc_gas: u64,
    pub min_memo_gas: u64,
    /// Total octets footprint used in deposit math.
    pub octets: u64,
    /// Deposit allowance granted by the manager.
    pub gratis: u64,
    /// Item count used in deposit math.
    pub items: u32,
    /// Timeslot of creation.
    pub created: u32,
    /// Timeslot of last accumulation.
    pub last_acc: u32,
    pub parent: ServiceId,
    pub storage: BTreeMap<Vec<u8>, Vec<u8>>,
    pub preimages: BTreeMap<[u8; 32], Vec<u8>>,
    /// Availability requests keyed by (hash, expected length); the value is
    /// the request's timeslot history (0 to 3 entries).
    pub requests: BTreeMap<([u8; 32], u64), Vec<u32>>,
}

impl ServiceAccount {
    /// The service code: the preimage of `code_hash`, when supplied.
    #[must_use]
    pub fn code(&self) -> Option<&[u8]> {
        self.preimages.get(&self.code_hash).map(Vec::as_slice)
    }

    /// `max(0, Cbasedeposit + Citemdeposit·items + Cbytedeposit·octets - gratis)`.
    #[must_use]
    pub fn min_balance(&self) -> u64 {
        min_balance(u64::from(self.items), self.octets, self.gratis)
    }

    /// Whether the preimage identified by `hash` was available at `timeslot`
    /// according to its request history.
    #[must_use]
    pub fn preimage_available_at(&self, hash: &[u8; 32], length: u64, timeslot: u32) -> bool {
        let Some(history) = self.requests.get(&(*hash, length)) else {
            return false;
        };
        match history.as_slice() {
            [x] => *x <= timeslot,
            [x, y] => *x <= timeslot && timeslot < *y,
            [x, y, z] => (*x <= timeslot && timeslot < *y) || *z <= timeslot,
            _ => false,
        }
    }
}

/// Deposit formula shared by account mutation host calls.
#[must_use]
pub fn min_balance(items: u64, octets: u64, gratis: u64) -> u64 {
    C_BASE_DEPOSIT
        .saturating_add(C_ITEM_DEPOSIT.saturating_mul(items))
        .saturating_add(C_BYTE_DEPOSIT.saturating_mul(octets))
        .saturating_sub(gratis)
}
