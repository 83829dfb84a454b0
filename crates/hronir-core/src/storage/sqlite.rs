//! `SQLite`-backed storage implementation.
//!
//! Uses `SQLite` with WAL mode, schema embedded at compile time. Every
//! composite operation from the [`Storage`] trait runs in a single `SQLite`
//! transaction; readers run concurrently under WAL.

// SQLite returns i64 for integer columns; positions and timestamps fit.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]

use std::collections::BTreeMap;
use std::path::Path as FsPath;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::DateTime;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::ids::{HronirId, PathId, SessionId, TxId, VoteId};
use crate::ledger::Transaction;
use crate::path::{Path, PathStatus};
use crate::rating::Vote;
use crate::session::{Session, SessionStatus};

use super::{Storage, StorageError};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// The `SQLite` storage backend.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Opens or creates a database at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<FsPath>) -> Result<Self, StorageError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-write; the
        // connection state is unrecoverable either way.
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn parse_id<T: FromStr>(kind: &str, value: &str) -> Result<T, StorageError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| StorageError::Corrupt {
        details: format!("bad {kind} '{value}': {e}"),
    })
}

fn parse_opt_id<T: FromStr>(kind: &str, value: Option<&str>) -> Result<Option<T>, StorageError>
where
    T::Err: std::fmt::Display,
{
    value.map(|v| parse_id(kind, v)).transpose()
}

type PathRow = (String, i64, Option<String>, String, String, Option<String>);

fn path_from_row(row: PathRow) -> Result<Path, StorageError> {
    let (path_id, position, predecessor, successor, status, mandate_id) = row;
    Ok(Path {
        path_id: parse_id("path_id", &path_id)?,
        position: position as u32,
        predecessor: parse_opt_id("predecessor", predecessor.as_deref())?,
        successor: parse_id("successor", &successor)?,
        status: PathStatus::parse(&status).ok_or_else(|| StorageError::Corrupt {
            details: format!("bad path status '{status}'"),
        })?,
        mandate_id: parse_opt_id("mandate_id", mandate_id.as_deref())?,
    })
}

const SELECT_PATH: &str =
    "SELECT path_id, position, predecessor, successor, status, mandate_id FROM paths";

fn query_paths(
    conn: &Connection,
    where_clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Path>, StorageError> {
    let sql = format!("{SELECT_PATH} {where_clause} ORDER BY position ASC, path_id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(args, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?
        .collect::<Result<Vec<PathRow>, _>>()?;
    rows.into_iter().map(path_from_row).collect()
}

type VoteRow = (String, i64, String, String, String, i64);

fn vote_from_row(row: VoteRow) -> Result<Vote, StorageError> {
    let (vote_id, position, mandate, winner, loser, recorded_at_ns) = row;
    Ok(Vote {
        vote_id: parse_id::<VoteId>("vote_id", &vote_id)?,
        position: position as u32,
        voting_mandate: parse_id("voting_mandate", &mandate)?,
        winner: parse_id("winner", &winner)?,
        loser: parse_id("loser", &loser)?,
        recorded_at: DateTime::from_timestamp_nanos(recorded_at_ns),
    })
}

fn insert_vote(conn: &Connection, vote: &Vote) -> Result<(), StorageError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO votes (vote_id, position, voting_mandate, winner, loser, recorded_at_ns)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            vote.vote_id.to_hex(),
            vote.position,
            vote.voting_mandate.to_hex(),
            vote.winner.to_hex(),
            vote.loser.to_hex(),
            vote.recorded_at.timestamp_nanos_opt().unwrap_or(0),
        ],
    )?;
    if inserted == 0 {
        return Err(StorageError::Conflict {
            details: format!("vote already recorded: {}", vote.vote_id),
        });
    }
    Ok(())
}

fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<(), StorageError> {
    let verdicts = serde_json::to_string(&tx.verdicts)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO transactions
             (tx_id, timestamp_ns, prev_tx_id, session_id, initiating_path, verdicts, merkle_root)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            tx.tx_id.to_hex(),
            tx.timestamp.timestamp_nanos_opt().unwrap_or(0),
            tx.prev_tx_id.map(|t| t.to_hex()),
            tx.session_id.to_string(),
            tx.initiating_path.to_hex(),
            verdicts,
            hex::encode(tx.merkle_root),
        ],
    )?;
    if inserted == 0 {
        return Err(StorageError::Conflict {
            details: format!("transaction already recorded: {}", tx.tx_id),
        });
    }
    conn.execute(
        "INSERT INTO ledger_head (id, tx_id) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET tx_id = excluded.tx_id",
        params![tx.tx_id.to_hex()],
    )?;
    Ok(())
}

fn write_session(conn: &Connection, session: &Session) -> Result<(), StorageError> {
    let payload = serde_json::to_string(session)?;
    conn.execute(
        "INSERT INTO sessions (session_id, status, payload) VALUES (?1, ?2, ?3)
         ON CONFLICT(session_id) DO UPDATE SET status = excluded.status, payload = excluded.payload",
        params![session.session_id.to_string(), session.status.as_str(), payload],
    )?;
    Ok(())
}

fn write_path(conn: &Connection, path: &Path) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE paths SET status = ?2, mandate_id = ?3 WHERE path_id = ?1",
        params![
            path.path_id.to_hex(),
            path.status.as_str(),
            path.mandate_id.map(|m| m.to_hex()),
        ],
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    fn upsert_path(&self, path: &Path) -> Result<Path, StorageError> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO paths (path_id, position, predecessor, successor, status, mandate_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                path.path_id.to_hex(),
                path.position,
                path.predecessor.map(|p| p.to_hex()),
                path.successor.to_hex(),
                path.status.as_str(),
                path.mandate_id.map(|m| m.to_hex()),
            ],
        )?;
        let stored = query_paths(&conn, "WHERE path_id = ?1", &[&path.path_id.to_hex()])?;
        stored.into_iter().next().ok_or(StorageError::Corrupt {
            details: "upserted path vanished".to_string(),
        })
    }

    fn update_path(&self, path: &Path) -> Result<(), StorageError> {
        let conn = self.lock();
        write_path(&conn, path)
    }

    fn get_path(&self, path_id: &PathId) -> Result<Option<Path>, StorageError> {
        let conn = self.lock();
        let found = query_paths(&conn, "WHERE path_id = ?1", &[&path_id.to_hex()])?;
        Ok(found.into_iter().next())
    }

    fn get_paths_by_predecessor(
        &self,
        predecessor: Option<&HronirId>,
    ) -> Result<Vec<Path>, StorageError> {
        let conn = self.lock();
        match predecessor {
            Some(p) => query_paths(&conn, "WHERE predecessor = ?1", &[&p.to_hex()]),
            None => query_paths(&conn, "WHERE predecessor IS NULL", &[]),
        }
    }

    fn all_paths(&self) -> Result<Vec<Path>, StorageError> {
        let conn = self.lock();
        query_paths(&conn, "", &[])
    }

    fn append_vote(&self, vote: &Vote) -> Result<(), StorageError> {
        let conn = self.lock();
        insert_vote(&conn, vote)
    }

    fn get_votes_for_heirs(
        &self,
        heirs: &[PathId],
        position: u32,
    ) -> Result<Vec<Vote>, StorageError> {
        let conn = self.lock();

        // Resolve the heirs' successor hrönirs, then filter votes to pairs
        // inside that set.
        let mut successors = Vec::with_capacity(heirs.len());
        for heir in heirs {
            let found = query_paths(&conn, "WHERE path_id = ?1", &[&heir.to_hex()])?;
            if let Some(path) = found.into_iter().next() {
                successors.push(path.successor);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT vote_id, position, voting_mandate, winner, loser, recorded_at_ns
             FROM votes
             WHERE position = ?1
             ORDER BY recorded_at_ns ASC, vote_id ASC",
        )?;
        let rows = stmt
            .query_map(params![position], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<VoteRow>, _>>()?;

        let votes = rows
            .into_iter()
            .map(vote_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(votes
            .into_iter()
            .filter(|v| successors.contains(&v.winner) && successors.contains(&v.loser))
            .collect())
    }

    fn append_transaction(&self, tx: &Transaction) -> Result<(), StorageError> {
        let mut conn = self.lock();
        let txn = conn.transaction()?;
        insert_transaction(&txn, tx)?;
        txn.commit()?;
        Ok(())
    }

    fn get_transaction(&self, tx_id: &TxId) -> Result<Option<Transaction>, StorageError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT tx_id, timestamp_ns, prev_tx_id, session_id, initiating_path, verdicts, merkle_root
                 FROM transactions WHERE tx_id = ?1",
                params![tx_id.to_hex()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((tx_id, timestamp_ns, prev, session_id, initiating, verdicts, merkle_root)) = row
        else {
            return Ok(None);
        };

        let root_bytes = hex::decode(&merkle_root).map_err(|e| StorageError::Corrupt {
            details: format!("bad merkle root hex: {e}"),
        })?;
        let merkle_root = root_bytes
            .try_into()
            .map_err(|_| StorageError::Corrupt {
                details: "merkle root has wrong length".to_string(),
            })?;

        Ok(Some(Transaction {
            tx_id: parse_id("tx_id", &tx_id)?,
            timestamp: DateTime::from_timestamp_nanos(timestamp_ns),
            prev_tx_id: parse_opt_id("prev_tx_id", prev.as_deref())?,
            session_id: parse_id("session_id", &session_id)?,
            initiating_path: parse_id("initiating_path", &initiating)?,
            verdicts: serde_json::from_str(&verdicts)?,
            merkle_root,
        }))
    }

    fn get_head_transaction_id(&self) -> Result<Option<TxId>, StorageError> {
        let conn = self.lock();
        let head: Option<String> = conn
            .query_row("SELECT tx_id FROM ledger_head WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        parse_opt_id("head tx_id", head.as_deref())
    }

    fn get_consuming_session(
        &self,
        path_id: &PathId,
    ) -> Result<Option<SessionId>, StorageError> {
        let conn = self.lock();
        let found: Option<String> = conn
            .query_row(
                "SELECT session_id FROM consumed_paths WHERE path_id = ?1",
                params![path_id.to_hex()],
                |row| row.get(0),
            )
            .optional()?;
        parse_opt_id("session_id", found.as_deref())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>, StorageError> {
        let conn = self.lock();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM sessions WHERE session_id = ?1",
                params![session_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| serde_json::from_str(&p)).transpose().map_err(Into::into)
    }

    fn canonical_cache_entry(&self, position: u32) -> Result<Option<PathId>, StorageError> {
        let conn = self.lock();
        let found: Option<String> = conn
            .query_row(
                "SELECT path_id FROM canonical_cache WHERE position = ?1",
                params![position],
                |row| row.get(0),
            )
            .optional()?;
        parse_opt_id("canonical path_id", found.as_deref())
    }

    fn canonical_cache(&self) -> Result<BTreeMap<u32, PathId>, StorageError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT position, path_id FROM canonical_cache ORDER BY position ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<(i64, String)>, _>>()?;

        let mut cache = BTreeMap::new();
        for (position, path_id) in rows {
            cache.insert(position as u32, parse_id("canonical path_id", &path_id)?);
        }
        Ok(cache)
    }

    fn consume_and_save_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut conn = self.lock();
        let txn = conn.transaction()?;

        // The primary key on consumed_paths makes this the double-spend
        // gate: the second concurrent starter inserts zero rows.
        let inserted = txn.execute(
            "INSERT OR IGNORE INTO consumed_paths (path_id, session_id) VALUES (?1, ?2)",
            params![
                session.initiating_path.to_hex(),
                session.session_id.to_string(),
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::Conflict {
                details: format!("path already consumed: {}", session.initiating_path),
            });
        }
        write_session(&txn, session)?;
        txn.commit()?;
        Ok(())
    }

    fn commit_session_state(
        &self,
        session: &Session,
        path: &Path,
        votes: &[Vote],
        transaction: Option<&Transaction>,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock();
        let txn = conn.transaction()?;

        write_session(&txn, session)?;
        write_path(&txn, path)?;
        for vote in votes {
            insert_vote(&txn, vote)?;
        }
        if let Some(tx) = transaction {
            insert_transaction(&txn, tx)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn apply_canonical_delta(
        &self,
        set: &[(u32, PathId)],
        truncate_from: Option<u32>,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock();
        let txn = conn.transaction()?;

        for (position, path_id) in set {
            txn.execute(
                "INSERT INTO canonical_cache (position, path_id) VALUES (?1, ?2)
                 ON CONFLICT(position) DO UPDATE SET path_id = excluded.path_id",
                params![position, path_id.to_hex()],
            )?;
        }
        if let Some(from) = truncate_from {
            txn.execute(
                "DELETE FROM canonical_cache WHERE position >= ?1",
                params![from],
            )?;
        }
        txn.commit()?;
        Ok(())
    }
}
