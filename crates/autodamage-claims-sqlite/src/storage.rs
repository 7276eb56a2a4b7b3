use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use autodamage_claims::{ClaimCode, Occupancy, OccupancyStore, MAX_PARTIES};
use autodamage_core::SessionId;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

/// Occupancy shared by every process that opens the same database file.
pub struct SqliteOccupancyStore {
    conn: Mutex<Connection>,
}

impl SqliteOccupancyStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        // other processes hold the write lock only for one join
        conn.busy_timeout(Duration::from_secs(5))?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

impl OccupancyStore for SqliteOccupancyStore {
    fn occupy(&self, code: &ClaimCode, session: &SessionId, now_unix: i64) -> Result<Occupancy> {
        let mut conn = self.conn.lock().unwrap();
        // IMMEDIATE takes the write lock up front so count-then-insert cannot
        // interleave with another process
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let member: i64 = tx.query_row(
            "SELECT COUNT(1) FROM claim_parties WHERE code=?1 AND session_id=?2",
            params![code.as_str(), session.as_str()],
            |r| r.get(0),
        )?;
        if member > 0 {
            tx.commit()?;
            return Ok(Occupancy::AlreadyMember);
        }

        let held: Option<String> = tx
            .query_row(
                "SELECT code FROM claim_parties WHERE session_id=?1 LIMIT 1",
                params![session.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(held) = held {
            tx.commit()?;
            let held = ClaimCode::parse(&held).with_context(|| format!("stored claim code {held:?} is malformed"))?;
            return Ok(Occupancy::HeldElsewhere(held));
        }

        let count: i64 =
            tx.query_row("SELECT COUNT(1) FROM claim_parties WHERE code=?1", params![code.as_str()], |r| r.get(0))?;
        if count as usize >= MAX_PARTIES {
            tx.commit()?;
            return Ok(Occupancy::Full);
        }

        tx.execute(
            "INSERT INTO claim_parties(code, session_id, joined_at) VALUES (?1, ?2, ?3)",
            params![code.as_str(), session.as_str(), now_unix],
        )?;
        tx.commit()?;
        debug!(code = %code, session = %session, parties = count + 1, "claim party joined");
        Ok(Occupancy::Joined)
    }

    fn release(&self, code: &ClaimCode, session: &SessionId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM claim_parties WHERE code=?1 AND session_id=?2",
            params![code.as_str(), session.as_str()],
        )?;
        Ok(())
    }

    fn parties(&self, code: &ClaimCode) -> Result<Vec<SessionId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT session_id FROM claim_parties WHERE code=?1 ORDER BY joined_at, rowid")?;
        let rows = stmt.query_map(params![code.as_str()], |r| Ok(SessionId::from_str(r.get::<_, String>(0)?)))?;
        let mut out = vec![];
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn code_for(&self, session: &SessionId) -> Result<Option<ClaimCode>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT code FROM claim_parties WHERE session_id=?1 ORDER BY joined_at DESC LIMIT 1",
                params![session.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        raw.map(|c| ClaimCode::parse(&c).with_context(|| format!("stored claim code {c:?} is malformed")))
            .transpose()
    }
}
