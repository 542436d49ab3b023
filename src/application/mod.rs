//! Application layer containing the unlock flows.
//!
//! [`UnlockOrchestrator`] is the primary entry point. Its operations are split
//! by concern: payment initiation, callbacks and reconciliation live in
//! `orchestrator`, post-unlock feedback in `feedback`, booking conversion in
//! `booking`.

mod booking;
mod feedback;
pub mod fees;
pub mod gateways;
pub mod ledger;
pub mod orchestrator;
pub mod rates;
pub mod views;

pub use orchestrator::{Collaborators, UnlockOrchestrator};
