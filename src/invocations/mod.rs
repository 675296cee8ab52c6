//! The three invocation wrappers built on the marshalling invocation: each
//! assembles arguments, selects the initial PC and gas budget, supplies a
//! context mutator and interprets the marshalled result.

pub mod accumulate;
pub mod is_authorized;
pub mod refine;

pub use accumulate::{
    accumulate, AccumulateInput, AccumulateOutcome, DeferredTransfer, Implications,
    ImplicationsPair, PartialState,
};
pub use is_authorized::{is_authorized, AuthOutcome};
pub use refine::{refine, RefineOutcome, RefineParams};
