//! Outer surfaces: the JSON API and the CSV reconciliation batch.

pub mod csv;
pub mod http;
