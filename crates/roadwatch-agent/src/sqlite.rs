// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite durable queue backend

use crate::queue::{DurableQueue, PersistenceError, QueueRecord};
use crate::sample::{RecordId, Sample};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite durable queue
///
/// One connection shared by the collector and sync loops, serialized by an
/// internal Mutex (SQLite Connection is not Sync).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE sensor_data (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     timestamp TEXT NOT NULL,
///     data TEXT NOT NULL,
///     synced INTEGER DEFAULT 0
/// );
/// CREATE INDEX idx_sensor_data_synced ON sensor_data(synced, id);
/// ```
///
/// `AUTOINCREMENT` keeps ids strictly increasing, so `ORDER BY id` is
/// insertion order.
pub struct SqliteQueue {
    conn: Mutex<Connection>,
}

impl SqliteQueue {
    /// Open (or create) a file-backed queue.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| PersistenceError::Open {
            path: path.display().to_string(),
            source,
        })?;

        // Appends must survive a crash once `append` returns.
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        tracing::debug!("Queue journal mode: {}", journal_mode);

        let queue = Self {
            conn: Mutex::new(conn),
        };
        queue.init_schema()?;
        tracing::info!("Durable queue opened at {}", path.display());
        Ok(queue)
    }

    /// Create an in-memory queue (for testing)
    pub fn new_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;

        let queue = Self {
            conn: Mutex::new(conn),
        };
        queue.init_schema()?;
        Ok(queue)
    }

    fn init_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sensor_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                data TEXT NOT NULL,
                synced INTEGER DEFAULT 0
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sensor_data_synced ON sensor_data(synced, id)",
            [],
        )?;

        Ok(())
    }

    // A panic while holding the lock leaves the connection itself usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Total and unsynced record counts read in one statement.
    ///
    /// Both numbers come from the same snapshot, so `unsynced <= total`
    /// even while another process appends or marks records.
    pub fn counts(&self) -> Result<QueueCounts, PersistenceError> {
        let conn = self.conn();
        let (total, unsynced): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(synced = 0), 0) FROM sensor_data",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(QueueCounts {
            total: total as usize,
            unsynced: unsynced as usize,
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<QueueRecord> {
        Ok(QueueRecord {
            id: RecordId(row.get(0)?),
            timestamp: row.get(1)?,
            payload: row.get(2)?,
            synced: row.get::<_, i64>(3)? != 0,
        })
    }
}

/// Point-in-time queue size, see [`SqliteQueue::counts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounts {
    pub total: usize,
    pub unsynced: usize,
}

impl QueueCounts {
    pub fn synced(&self) -> usize {
        self.total.saturating_sub(self.unsynced)
    }
}

impl DurableQueue for SqliteQueue {
    fn append(&self, sample: &Sample) -> Result<RecordId, PersistenceError> {
        let payload = sample.to_payload()?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sensor_data (timestamp, data, synced) VALUES (?1, ?2, 0)",
            params![sample.timestamp_text(), payload],
        )?;

        Ok(RecordId(conn.last_insert_rowid()))
    }

    fn fetch_unsynced(&self, limit: usize) -> Result<Vec<QueueRecord>, PersistenceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp, data, synced
             FROM sensor_data
             WHERE synced = 0
             ORDER BY id ASC
             LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map([limit], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn mark_synced(&self, ids: &[RecordId]) -> Result<usize, PersistenceError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut update =
                tx.prepare("UPDATE sensor_data SET synced = 1 WHERE id = ?1 AND synced = 0")?;
            for id in ids {
                changed += update.execute([id.0])?;
            }
        }
        tx.commit()?;

        Ok(changed)
    }

    fn count(&self) -> Result<usize, PersistenceError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sensor_data", [], |row| row.get(0))?;

        Ok(count as usize)
    }

    fn count_unsynced(&self) -> Result<usize, PersistenceError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sensor_data WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::AccelReading;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_at(offset_ms: i64) -> Sample {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        Sample::at(base + Duration::milliseconds(offset_ms))
            .with_accelerometer(AccelReading::from_raw(offset_ms as i16, 0, 0))
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let queue = SqliteQueue::new_in_memory().unwrap();

        let first = queue.append(&sample_at(0)).unwrap();
        let second = queue.append(&sample_at(1)).unwrap();
        assert!(second > first);
        assert_eq!(queue.count().unwrap(), 2);
        assert_eq!(queue.count_unsynced().unwrap(), 2);
    }

    #[test]
    fn test_counts_match_queue_state() {
        let queue = SqliteQueue::new_in_memory().unwrap();
        assert_eq!(
            queue.counts().unwrap(),
            QueueCounts {
                total: 0,
                unsynced: 0
            }
        );

        let ids: Vec<_> = (0..5)
            .map(|i| queue.append(&sample_at(i * 1000)).unwrap())
            .collect();
        queue.mark_synced(&ids[..2]).unwrap();

        let counts = queue.counts().unwrap();
        assert_eq!(counts.total, 5);
        assert_eq!(counts.unsynced, 3);
        assert_eq!(counts.synced(), 2);
    }

    #[test]
    fn test_counts_consistent_while_another_connection_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let reader = SqliteQueue::open(&path).unwrap();
        let writer = std::sync::Arc::new(SqliteQueue::open(&path).unwrap());

        let worker = {
            let writer = std::sync::Arc::clone(&writer);
            std::thread::spawn(move || {
                for i in 0..200 {
                    let id = writer.append(&sample_at(i)).unwrap();
                    writer.mark_synced(&[id]).unwrap();
                }
            })
        };

        for _ in 0..200 {
            let counts = reader.counts().unwrap();
            assert!(counts.unsynced <= counts.total);
        }
        worker.join().unwrap();

        let counts = reader.counts().unwrap();
        assert_eq!(counts.total, 200);
        assert_eq!(counts.synced(), 200);
    }

    #[test]
    fn test_fetch_unsynced_is_fifo() {
        let queue = SqliteQueue::new_in_memory().unwrap();

        let ids: Vec<_> = (0..10)
            .map(|i| queue.append(&sample_at(i * 1000)).unwrap())
            .collect();

        let records = queue.fetch_unsynced(10).unwrap();
        let fetched: Vec<_> = records.iter().map(|r| r.id).collect();
        assert_eq!(fetched, ids);
        assert!(records.iter().all(|r| !r.synced));

        let accel_x: Vec<_> = records
            .iter()
            .map(|r| r.sample().unwrap().accelerometer.unwrap().raw_x)
            .collect();
        assert_eq!(accel_x, vec![0, 1000, 2000, 3000, 4000, 5000, 6000, 7000, 8000, 9000]);
    }

    #[test]
    fn test_fetch_unsynced_respects_limit() {
        let queue = SqliteQueue::new_in_memory().unwrap();
        for i in 0..5 {
            queue.append(&sample_at(i)).unwrap();
        }

        let records = queue.fetch_unsynced(3).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, RecordId(1));

        assert!(queue.fetch_unsynced(0).unwrap().is_empty());
    }

    #[test]
    fn test_mark_synced_hides_records() {
        let queue = SqliteQueue::new_in_memory().unwrap();
        let a = queue.append(&sample_at(0)).unwrap();
        let b = queue.append(&sample_at(1)).unwrap();
        let c = queue.append(&sample_at(2)).unwrap();

        assert_eq!(queue.mark_synced(&[a, c]).unwrap(), 2);

        let remaining = queue.fetch_unsynced(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b);
        assert_eq!(queue.count().unwrap(), 3);
        assert_eq!(queue.count_unsynced().unwrap(), 1);
    }

    #[test]
    fn test_mark_synced_is_idempotent() {
        let queue = SqliteQueue::new_in_memory().unwrap();
        let id = queue.append(&sample_at(0)).unwrap();

        assert_eq!(queue.mark_synced(&[id]).unwrap(), 1);
        assert_eq!(queue.mark_synced(&[id]).unwrap(), 0);
        assert_eq!(queue.count_unsynced().unwrap(), 0);

        // Unknown ids and empty sets are no-ops too
        assert_eq!(queue.mark_synced(&[RecordId(999)]).unwrap(), 0);
        assert_eq!(queue.mark_synced(&[]).unwrap(), 0);
    }

    #[test]
    fn test_stored_columns() {
        let queue = SqliteQueue::new_in_memory().unwrap();
        let sample = sample_at(250);
        queue.append(&sample).unwrap();

        let record = &queue.fetch_unsynced(1).unwrap()[0];
        assert_eq!(record.timestamp, "2025-06-01T08:00:00.250000Z");
        assert_eq!(record.payload, sample.to_payload().unwrap());
    }

    #[test]
    fn test_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let pending = {
            let queue = SqliteQueue::open(&path).unwrap();
            let a = queue.append(&sample_at(0)).unwrap();
            let b = queue.append(&sample_at(1)).unwrap();
            queue.mark_synced(&[a]).unwrap();
            b
        };

        let queue = SqliteQueue::open(&path).unwrap();
        let records = queue.fetch_unsynced(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, pending);

        // Ids keep increasing after reopen
        let next = queue.append(&sample_at(2)).unwrap();
        assert!(next > pending);
    }

    #[test]
    fn test_open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("queue.db");

        match SqliteQueue::open(&path) {
            Err(PersistenceError::Open { path: p, .. }) => assert!(p.ends_with("queue.db")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("open should fail"),
        }
    }
}
