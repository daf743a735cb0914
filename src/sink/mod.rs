//! Output sinks for decoded measurements.
//!
//! The session hands a finite, ordered sequence of [`Measurement`]s across
//! this boundary and is otherwise decoupled from presentation.

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSink;

use crate::{
    fmt::{LogOutput, Logger},
    records::Measurement,
};

/// Consumer of one session's worth of decoded records.
pub trait MeasurementSink {
    type Error: core::fmt::Debug;

    /// Take ownership of the result set, ordered by fetch slot.
    fn consume(&mut self, identifier: &str, records: &[Measurement]) -> Result<(), Self::Error>;
}

/// Renders the identifier and an aligned block per measurement.
pub struct ConsoleSink {
    output: LogOutput,
}

impl ConsoleSink {
    pub fn new(output: LogOutput) -> Self {
        Self { output }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(LogOutput::StdOut)
    }
}

impl MeasurementSink for ConsoleSink {
    type Error = core::convert::Infallible;

    fn consume(&mut self, identifier: &str, records: &[Measurement]) -> Result<(), Self::Error> {
        self.output.print(&format!("Identifier: '{identifier}'"));
        self.output.print(&format!("Records in memory: {}", records.len()));

        for record in records {
            Logger::log(&self.output, record);
        }

        Ok(())
    }
}
