//! Buffer Module
//!
//! Holds irreversible actions back while the admission gate is open.

mod action;
pub mod deferred;

pub use action::IrreversibleAction;
pub use deferred::{
    DeferredCommitBuffer, DeferredEntry, FlushResult, FlushStatus, PendingCommit, SubmitOutcome,
};
