//! Reconciliation logic for backup resources.
//!
//! `backup` holds the kind handler (read, compute, write-back) and spec
//! validation; `states` holds the lifecycle state machine it delegates to.

pub mod backup;
pub mod states;
