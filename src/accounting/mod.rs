//! Byte accounting: the path ledger, the per-path counter family, and the
//! accountant that turns observed sizes into counter deltas.

pub mod accountant;
pub mod counter;
pub mod ledger;
