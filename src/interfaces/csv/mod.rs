//! Batch reconciliation from provider settlement exports.

pub mod callback_reader;
pub mod outcome_writer;
