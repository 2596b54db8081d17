//! Use cases driving a rental from frame lookup to settlement.

pub mod clock;
pub mod engine;
pub mod lookup;
