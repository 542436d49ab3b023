use crate::domain::unlock::GatewayStatus;
use crate::error::{Result, UnlockError};
use serde::Deserialize;
use std::io::Read;

/// One row of a provider settlement export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallbackRow {
    pub reference: String,
    pub status: String,
}

/// A parsed row, ready for callback ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCallback {
    pub reference: String,
    pub status: GatewayStatus,
}

impl TryFrom<CallbackRow> for ProviderCallback {
    type Error = UnlockError;

    fn try_from(row: CallbackRow) -> Result<Self> {
        if row.reference.is_empty() {
            return Err(UnlockError::ValidationError("empty reference".to_string()));
        }
        let status = row.status.parse::<GatewayStatus>()?;
        Ok(Self {
            reference: row.reference,
            status,
        })
    }
}

/// Reads provider callbacks (`reference,status`) from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// so extra trailing columns in provider exports are tolerated.
pub struct CallbackReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CallbackReader<R> {
    /// Creates a new `CallbackReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and parses callbacks; a bad row yields an error and the
    /// stream carries on.
    pub fn callbacks(self) -> impl Iterator<Item = Result<ProviderCallback>> {
        self.reader
            .into_deserialize::<CallbackRow>()
            .map(|result| result.map_err(UnlockError::from).and_then(ProviderCallback::try_from))
    }
}
