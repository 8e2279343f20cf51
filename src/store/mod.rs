//! SQLite-backed store for members, thrifts, transactions and referral edges.
//!
//! The store is the only shared mutable resource. Every ledger mutation runs
//! inside one SQLite transaction via [`Store::with_tx`], so a balance update,
//! week advance and transaction append commit together or not at all. Rows
//! are accessed through cached statements.

use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::ledger::models::{
    Member, Thrift, ThriftStatus, Transaction, TransactionKind, TransactionStatus, VirtualAccount,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS members (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    referral_code TEXT NOT NULL UNIQUE,
    referred_by   TEXT,
    created_at    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS virtual_accounts (
    account_id TEXT PRIMARY KEY,
    member_id  TEXT NOT NULL UNIQUE REFERENCES members(id)
);

CREATE TABLE IF NOT EXISTS thrifts (
    id                  TEXT PRIMARY KEY,
    member_id           TEXT NOT NULL REFERENCES members(id),
    weekly_contribution INTEGER NOT NULL,
    planned_weeks       INTEGER NOT NULL,
    balance             INTEGER NOT NULL,
    total_contributed   INTEGER NOT NULL,
    start_date          TEXT NOT NULL,
    current_week        INTEGER NOT NULL,
    status              TEXT NOT NULL,
    default_weeks       TEXT NOT NULL,
    default_amount      INTEGER NOT NULL,
    created_at          INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_thrifts_member ON thrifts(member_id);
CREATE INDEX IF NOT EXISTS idx_thrifts_status ON thrifts(status);

CREATE TABLE IF NOT EXISTS transactions (
    id                 TEXT PRIMARY KEY,
    thrift_id          TEXT NOT NULL REFERENCES thrifts(id),
    member_id          TEXT NOT NULL,
    kind               TEXT NOT NULL,
    amount             INTEGER NOT NULL,
    status             TEXT NOT NULL,
    external_reference TEXT NOT NULL,
    created_at         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tx_thrift ON transactions(thrift_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tx_successful_ref
    ON transactions(thrift_id, external_reference)
    WHERE status = 'successful';

CREATE TABLE IF NOT EXISTS referrals (
    referrer_id TEXT NOT NULL,
    referred_id TEXT NOT NULL,
    joined_at   INTEGER NOT NULL,
    PRIMARY KEY (referrer_id, referred_id)
);
CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals(referrer_id);
";

/// Connection handle shared by the ledger, trackers and gateway.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the ledger database under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| LedgerError::StoreUnavailable(format!("creating data dir: {e}")))?;
        let db_path = data_dir.join("ledger.db");
        let conn = Connection::open(&db_path)?;

        // WAL for concurrent readers while a writer holds the transaction
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), "Ledger store initialized");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests and tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::StoreUnavailable("store mutex poisoned".into()))
    }

    /// Run `f` against the connection without a write transaction.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside one SQLite transaction: committed on Ok, rolled back
    /// on Err. This is what makes ledger operations all-or-nothing.
    pub fn with_tx<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                // Drop rolls the transaction back
                Err(e)
            }
        }
    }

    // === Members & virtual accounts ===

    pub fn insert_member(&self, member: &Member) -> Result<()> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO members (id, name, referral_code, referred_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?
            .execute(params![
                member.id,
                member.name,
                member.referral_code,
                member.referred_by,
                member.created_at,
            ])?;
            Ok(())
        })
    }

    pub fn get_member(&self, id: &str) -> Result<Option<Member>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare_cached(
                    "SELECT id, name, referral_code, referred_by, created_at
                     FROM members WHERE id = ?1",
                )?
                .query_row([id], map_member)
                .optional()?;
            Ok(row)
        })
    }

    /// Bind a provider collection account to a member (1:1).
    pub fn bind_virtual_account(&self, account: &VirtualAccount) -> Result<()> {
        self.with_conn(|conn| {
            conn.prepare_cached(
                "INSERT INTO virtual_accounts (account_id, member_id) VALUES (?1, ?2)",
            )?
            .execute(params![account.account_id, account.member_id])?;
            Ok(())
        })
    }

    /// Resolve a provider account identifier to its member.
    pub fn member_for_account(&self, account_id: &str) -> Result<Option<Member>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare_cached(
                    "SELECT m.id, m.name, m.referral_code, m.referred_by, m.created_at
                     FROM virtual_accounts va JOIN members m ON m.id = va.member_id
                     WHERE va.account_id = ?1",
                )?
                .query_row([account_id], map_member)
                .optional()?;
            Ok(row)
        })
    }

    // === Thrifts ===

    pub fn insert_thrift(&self, thrift: &Thrift) -> Result<()> {
        self.with_conn(|conn| insert_thrift_with(conn, thrift))
    }

    pub fn get_thrift(&self, id: &str) -> Result<Option<Thrift>> {
        self.with_conn(|conn| get_thrift_with(conn, id))
    }

    /// The member's open (non-terminal) thrift, most recent first. Used by
    /// the gateway to correlate inbound payment events.
    pub fn open_thrift_for_member(&self, member_id: &str) -> Result<Option<Thrift>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare_cached(&format!(
                    "{THRIFT_SELECT} WHERE member_id = ?1
                     AND status IN ('active', 'defaulted')
                     ORDER BY created_at DESC LIMIT 1"
                ))?
                .query_row([member_id], map_thrift)
                .optional()?;
            row.transpose()
        })
    }

    /// All thrifts the sweep must visit (active or defaulted).
    pub fn list_open_thrifts(&self) -> Result<Vec<Thrift>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "{THRIFT_SELECT} WHERE status IN ('active', 'defaulted') ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([], map_thrift)?;
            let mut thrifts = Vec::new();
            for row in rows {
                thrifts.push(row??);
            }
            Ok(thrifts)
        })
    }

    // === Transactions ===

    pub fn transactions_for_thrift(
        &self,
        thrift_id: &str,
        kind: Option<TransactionKind>,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, thrift_id, member_id, kind, amount, status, external_reference,
                        created_at
                 FROM transactions
                 WHERE thrift_id = ?1
                   AND (?2 IS NULL OR kind = ?2)
                   AND (?3 IS NULL OR status = ?3)
                 ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map(
                params![
                    thrift_id,
                    kind.map(|k| k.as_str()),
                    status.map(|s| s.as_str()),
                ],
                map_transaction,
            )?;
            let mut txs = Vec::new();
            for row in rows {
                txs.push(row??);
            }
            Ok(txs)
        })
    }
}

// === Transaction-scoped helpers (used inside Store::with_tx) ===

const THRIFT_SELECT: &str = "SELECT id, member_id, weekly_contribution, planned_weeks, balance,
        total_contributed, start_date, current_week, status, default_weeks,
        default_amount, created_at FROM thrifts";

pub fn get_thrift_with(conn: &Connection, id: &str) -> Result<Option<Thrift>> {
    let row = conn
        .prepare_cached(&format!("{THRIFT_SELECT} WHERE id = ?1"))?
        .query_row([id], map_thrift)
        .optional()?;
    row.transpose()
}

pub fn insert_thrift_with(conn: &Connection, thrift: &Thrift) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO thrifts (id, member_id, weekly_contribution, planned_weeks, balance,
                              total_contributed, start_date, current_week, status,
                              default_weeks, default_amount, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?
    .execute(params![
        thrift.id,
        thrift.member_id,
        thrift.weekly_contribution,
        thrift.planned_weeks,
        thrift.balance,
        thrift.total_contributed,
        thrift.start_date.to_string(),
        thrift.current_week,
        thrift.status.as_str(),
        serde_json::to_string(&thrift.default_weeks)?,
        thrift.default_amount,
        thrift.created_at,
    ])?;
    Ok(())
}

/// Persist the mutable fields of a thrift snapshot.
pub fn save_thrift_with(conn: &Connection, thrift: &Thrift) -> Result<()> {
    conn.prepare_cached(
        "UPDATE thrifts SET balance = ?2, total_contributed = ?3, current_week = ?4,
                status = ?5, default_weeks = ?6, default_amount = ?7
         WHERE id = ?1",
    )?
    .execute(params![
        thrift.id,
        thrift.balance,
        thrift.total_contributed,
        thrift.current_week,
        thrift.status.as_str(),
        serde_json::to_string(&thrift.default_weeks)?,
        thrift.default_amount,
    ])?;
    Ok(())
}

pub fn insert_transaction_with(conn: &Connection, tx: &Transaction) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO transactions (id, thrift_id, member_id, kind, amount, status,
                                   external_reference, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?
    .execute(params![
        tx.id,
        tx.thrift_id,
        tx.member_id,
        tx.kind.as_str(),
        tx.amount,
        tx.status.as_str(),
        tx.external_reference,
        tx.created_at,
    ])?;
    Ok(())
}

/// Whether a successful transaction already bears this reference for this
/// thrift. Checked inside the same transaction that credits the balance, so
/// concurrent duplicate deliveries resolve to exactly one credit.
pub fn successful_reference_exists(
    conn: &Connection,
    thrift_id: &str,
    external_reference: &str,
) -> Result<bool> {
    let count: i64 = conn
        .prepare_cached(
            "SELECT COUNT(*) FROM transactions
             WHERE thrift_id = ?1 AND external_reference = ?2 AND status = 'successful'",
        )?
        .query_row(params![thrift_id, external_reference], |row| row.get(0))?;
    Ok(count > 0)
}

// === Row mappers ===

fn map_member(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        name: row.get(1)?,
        referral_code: row.get(2)?,
        referred_by: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// Thrift rows need fallible decoding of the status and default_weeks
// columns, so the mapper yields a nested Result.
fn map_thrift(row: &Row<'_>) -> rusqlite::Result<Result<Thrift>> {
    let start_date: String = row.get(6)?;
    let status: String = row.get(8)?;
    let default_weeks: String = row.get(9)?;

    Ok(decode_thrift_columns(row, &start_date, &status, &default_weeks))
}

fn decode_thrift_columns(
    row: &Row<'_>,
    start_date: &str,
    status: &str,
    default_weeks: &str,
) -> Result<Thrift> {
    let corrupt = |what: &str| LedgerError::StoreUnavailable(format!("corrupt thrift row: {what}"));

    Ok(Thrift {
        id: row.get(0)?,
        member_id: row.get(1)?,
        weekly_contribution: row.get(2)?,
        planned_weeks: row.get(3)?,
        balance: row.get(4)?,
        total_contributed: row.get(5)?,
        start_date: start_date
            .parse::<NaiveDate>()
            .map_err(|_| corrupt("start_date"))?,
        current_week: row.get(7)?,
        status: ThriftStatus::parse(status).ok_or_else(|| corrupt("status"))?,
        default_weeks: serde_json::from_str(default_weeks).map_err(|_| corrupt("default_weeks"))?,
        default_amount: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Result<Transaction>> {
    let kind: String = row.get(3)?;
    let status: String = row.get(5)?;
    let corrupt =
        |what: &str| LedgerError::StoreUnavailable(format!("corrupt transaction row: {what}"));

    Ok((|| {
        Ok(Transaction {
            id: row.get(0)?,
            thrift_id: row.get(1)?,
            member_id: row.get(2)?,
            kind: TransactionKind::parse(&kind).ok_or_else(|| corrupt("kind"))?,
            amount: row.get(4)?,
            status: TransactionStatus::parse(&status).ok_or_else(|| corrupt("status"))?,
            external_reference: row.get(6)?,
            created_at: row.get(7)?,
        })
    })())
}
