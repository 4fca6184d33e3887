mod engine;

pub use engine::{AccrualEngine, AccrualState, Reconciliation, TickOutcome};
