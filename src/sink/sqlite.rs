use rusqlite::{params, Connection};

use super::MeasurementSink;
use crate::records::Measurement;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS measurements (
    taken_at  TEXT PRIMARY KEY,
    systolic  INTEGER NOT NULL,
    diastolic INTEGER NOT NULL,
    pulse     INTEGER NOT NULL,
    user_slot INTEGER NOT NULL
)";

const INSERT: &str = "\
INSERT OR IGNORE INTO measurements (taken_at, systolic, diastolic, pulse, user_slot)
VALUES (?1, ?2, ?3, ?4, ?5)";

/// Persists measurements keyed by their composed timestamp.
///
/// Duplicate keys are silently ignored, so repeated runs against the same
/// device memory are idempotent. Records whose calendar fields cannot form a
/// real timestamp are logged and skipped.
pub struct SqliteSink {
    connection: Connection,
}

impl SqliteSink {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(connection: Connection) -> rusqlite::Result<Self> {
        connection.execute(SCHEMA, [])?;
        Ok(Self { connection })
    }
}

impl MeasurementSink for SqliteSink {
    type Error = rusqlite::Error;

    fn consume(&mut self, _identifier: &str, records: &[Measurement]) -> Result<(), Self::Error> {
        let tx = self.connection.transaction()?;

        for record in records {
            let taken_at = match timestamp_key(record) {
                Some(taken_at) => taken_at,
                None => {
                    log::warn!("skipping record with implausible calendar fields: {record:?}");
                    continue;
                }
            };

            tx.execute(
                INSERT,
                params![
                    taken_at,
                    record.systolic,
                    record.diastolic,
                    record.pulse,
                    record.user_slot.value(),
                ],
            )?;
        }

        tx.commit()
    }
}

/// Compose the `YYYY-MM-DD HH:MM:SS` key, or `None` if the decoded calendar
/// fields are out of range.
fn timestamp_key(record: &Measurement) -> Option<String> {
    let calendar_ok = (1..=12).contains(&record.month)
        && (1..=31).contains(&record.day)
        && record.hour <= 23
        && record.minute <= 59;

    calendar_ok.then(|| {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:00",
            record.year, record.month, record.day, record.hour, record.minute
        )
    })
}
