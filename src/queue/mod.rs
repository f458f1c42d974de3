//! The execution queue state machine.
//!
//! `QueueState` holds no locks and does no I/O; `QueueService` wraps it in a
//! single mutex and drives it from the dispatcher task.

mod state;

pub use state::QueueState;
