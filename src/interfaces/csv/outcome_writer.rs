use crate::application::views::CallbackOutcome;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OutcomeRow<'a> {
    reference: &'a str,
    outcome: &'a str,
    status: String,
}

/// Writes `reference,outcome,status` rows for applied callbacks.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, reference: &str, outcome: &CallbackOutcome) -> Result<()> {
        let status = match outcome {
            CallbackOutcome::Applied { to, .. } => to.to_string(),
            CallbackOutcome::Duplicate { status, .. } | CallbackOutcome::Ignored { status, .. } => {
                status.to_string()
            }
            CallbackOutcome::NotFound => String::new(),
        };
        self.writer.serialize(OutcomeRow {
            reference,
            outcome: outcome.label(),
            status,
        })?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
