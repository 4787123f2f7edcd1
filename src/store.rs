//! Append-only persistent log of write events.
//!
//! One `writes` table, one row per event, indexed by the instruction pointer. Every event is
//! committed as soon as it is recorded, so an abnormal exit loses nothing but the event in flight.

use crate::debugger::address::Address;
use crate::debugger::reader::{Backtrace, MemoryImage};
use crate::debugger::trace::{EventSink, WriteEvent};
use crate::debugger::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, Row};
use std::path::{Path, PathBuf};

const SCHEMA: &str = r#"
    CREATE TABLE writes (
        instruction_pointer TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        memory_address TEXT NOT NULL,
        old_data TEXT NOT NULL,
        new_data TEXT NOT NULL,
        backtrace TEXT NOT NULL,
        UNIQUE (instruction_pointer, timestamp, memory_address)
    );

    CREATE INDEX writes_instruction_pointer ON writes (instruction_pointer);
"#;

pub struct EventStore {
    conn: Connection,
    path: PathBuf,
}

impl EventStore {
    /// Create a new store. Fail if anything exists at `path`, an existing dataset is never
    /// appended to or changed.
    pub fn create(path: &Path) -> Result<Self, Error> {
        if path.exists() {
            return Err(Error::StoreAlreadyExists(path.to_path_buf()));
        }

        let mut conn = Connection::open(path)?;
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        tx.commit()?;

        info!(target: "debugger", "event store created at {}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Err(Error::StoreMissing(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist an event, the event is committed when this returns.
    pub fn record(&self, event: &WriteEvent) -> Result<(), Error> {
        let result = self.conn.execute(
            "INSERT INTO writes (instruction_pointer, timestamp, memory_address, old_data, new_data, backtrace)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.instruction_pointer.to_string(),
                event.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                event.memory_address.to_string(),
                event.old_value.to_string(),
                event.new_value.to_string(),
                event.backtrace.to_string(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::DuplicateEvent {
                    instruction_pointer: event.instruction_pointer,
                    memory_address: event.memory_address,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All writes issued from an instruction, oldest first.
    pub fn writes_from(&self, instruction_pointer: Address) -> Result<Vec<WriteEvent>, Error> {
        let mut stmt = self.conn.prepare(
            "SELECT instruction_pointer, timestamp, memory_address, old_data, new_data, backtrace
             FROM writes WHERE instruction_pointer = ?1 ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(params![instruction_pointer.to_string()], event_from_row)?;
        let events = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Number of stored events.
    pub fn count(&self) -> Result<u64, Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM writes", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl EventSink for EventStore {
    fn record(&mut self, event: &WriteEvent) -> Result<(), Error> {
        EventStore::record(self, event)
    }
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn address_column(row: &Row, idx: usize) -> rusqlite::Result<Address> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn image_column(row: &Row, idx: usize) -> rusqlite::Result<MemoryImage> {
    let text: String = row.get(idx)?;
    MemoryImage::from_hex(text.trim_start_matches("0x")).map_err(|e| conversion_error(idx, e))
}

fn event_from_row(row: &Row) -> rusqlite::Result<WriteEvent> {
    let timestamp: String = row.get(1)?;
    let backtrace: String = row.get(5)?;
    Ok(WriteEvent {
        instruction_pointer: address_column(row, 0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(1, e))?,
        memory_address: address_column(row, 2)?,
        old_value: image_column(row, 3)?,
        new_value: image_column(row, 4)?,
        backtrace: Backtrace::new(backtrace.lines().map(ToString::to_string).collect()),
    })
}
