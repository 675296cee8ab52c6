//! PVM: a deterministic register machine executing service code under a gas
//! budget (Gray Paper §7 and Appendix A), together with the marshalling
//! invocation and the is-authorized / refine / accumulate wrappers built on
//! top of it.
//!
//! The engine is pure: one [`Pvm`] value per invocation, no shared state, no
//! clock. Programs arrive as deblob-format blobs ([`codec::decode_blob`]),
//! memory is paged with per-page access rights ([`ram::PagedRam`]), and the
//! only suspension point is the ECALLI host call, serviced by a
//! [`HostCallMutator`] owned by the invocation wrapper.

pub mod accounts;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod host_functions;
pub mod init;
pub mod instructions;
pub mod invocation;
pub mod invocations;
pub mod parser;
pub mod pvm;
pub mod ram;
#[cfg(test)]
pub(crate) mod testutil;
pub mod types;

pub use config::GasModel;
pub use host_functions::{HostCallMutator, HostCallResult};
pub use invocation::{invoke_marshalled, MarshalledResult};
pub use parser::Program;
pub use pvm::Pvm;
pub use ram::PagedRam;
pub use types::RegisterState;
