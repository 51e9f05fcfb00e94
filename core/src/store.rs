//! SQLite-backed transfer record store.
//!
//! Keyed by transfer id; rows also carry the network name so one database can
//! serve multiple deployments. Terminal rows (confirmed/failed) are final:
//! updates only apply while a transfer is pending.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};

use crate::service::{TransferRecord, TransferStatus};

pub struct TransferStore {
    conn: Connection,
}

pub struct TransferPage {
    pub transfers: Vec<TransferRecord>,
    pub total: u32,
    pub offset: u32,
    pub limit: u32,
}

impl TransferPage {
    pub fn has_next(&self) -> bool {
        self.offset + self.limit < self.total
    }

    pub fn has_prev(&self) -> bool {
        self.offset > 0
    }
}

/// Default DB location: platform data directory + `remit/transfers.db`
/// (Linux: `~/.local/share`, macOS: `~/Library/Application Support`)
fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Cannot determine data directory")?;
    Ok(data_dir.join("remit").join("transfers.db"))
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl TransferStore {
    /// Open (or create) the transfer store at the default location.
    pub fn open() -> Result<Self> {
        let path = default_db_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create store directory")?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
            }
        }
        let conn = Connection::open(&path).context("Failed to open transfer store database")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory store (for tests and ephemeral deployments).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS transfers (
                transfer_id   TEXT    PRIMARY KEY,
                network       TEXT    NOT NULL,
                from_address  TEXT    NOT NULL,
                to_address    TEXT    NOT NULL,
                amount        TEXT    NOT NULL,
                token_address TEXT,
                status        TEXT    NOT NULL,
                tx_hash       TEXT,
                gas_fee_wei   TEXT,
                error_kind    TEXT,
                error         TEXT,
                created_at    INTEGER NOT NULL,
                updated_at    INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transfers_sender
                ON transfers (network, from_address, created_at DESC);

            CREATE INDEX IF NOT EXISTS idx_transfers_status
                ON transfers (network, status);",
            )
            .context("Failed to initialize store schema")?;
        Ok(())
    }

    pub fn insert(&self, record: &TransferRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO transfers (
                transfer_id, network, from_address, to_address, amount,
                token_address, status, tx_hash, gas_fee_wei, error_kind, error,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    record.transfer_id,
                    record.network,
                    record.from_address,
                    record.to_address,
                    record.amount.to_string(),
                    record.token_address,
                    record.status.to_string(),
                    record.transaction_hash,
                    record.gas_fee_wei.map(|f| f.to_string()),
                    record.error_kind,
                    record.error,
                    record.created_at,
                    record.updated_at,
                ],
            )
            .context("Failed to insert transfer record")?;
        Ok(())
    }

    pub fn get(&self, transfer_id: &str) -> Result<Option<TransferRecord>> {
        let result = self.conn.query_row(
            "SELECT transfer_id, network, from_address, to_address, amount,
                    token_address, status, tx_hash, gas_fee_wei, error_kind, error,
                    created_at, updated_at
             FROM transfers WHERE transfer_id = ?1",
            params![transfer_id],
            row_to_record,
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("Failed to query transfer record"),
        }
    }

    /// Record the broadcast transaction hash. Applies only while the transfer
    /// is still pending; returns whether a row was updated.
    pub fn set_submitted(&self, transfer_id: &str, tx_hash: &str) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE transfers SET tx_hash = ?2, updated_at = ?3
                 WHERE transfer_id = ?1 AND status = 'pending'",
                params![transfer_id, tx_hash, now_millis()],
            )
            .context("Failed to record transaction hash")?;
        Ok(updated > 0)
    }

    /// Move a pending transfer into a terminal state. Terminal rows are
    /// final, so a second call (or a call against a confirmed/failed row)
    /// updates nothing and returns `false`.
    pub fn mark_terminal(
        &self,
        transfer_id: &str,
        status: TransferStatus,
        error_kind: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            bail!("mark_terminal called with non-terminal status {status}");
        }
        let updated = self
            .conn
            .execute(
                "UPDATE transfers SET status = ?2, error_kind = ?3, error = ?4, updated_at = ?5
                 WHERE transfer_id = ?1 AND status = 'pending'",
                params![
                    transfer_id,
                    status.to_string(),
                    error_kind,
                    error,
                    now_millis()
                ],
            )
            .context("Failed to update transfer status")?;
        Ok(updated > 0)
    }

    /// Query a sender's transfers with an optional status filter, newest
    /// first, paginated.
    pub fn list_for_sender(
        &self,
        network: &str,
        from_address: &str,
        status: Option<TransferStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<TransferPage> {
        let status_clause = match status {
            None => String::new(),
            Some(status) => format!("AND status = '{status}'"),
        };

        let count_sql = format!(
            "SELECT COUNT(*) FROM transfers WHERE network = ?1 AND from_address = ?2 {status_clause}"
        );
        let total: u32 = self
            .conn
            .query_row(&count_sql, params![network, from_address], |row| row.get(0))
            .context("Failed to count transfers")?;

        let query_sql = format!(
            "SELECT transfer_id, network, from_address, to_address, amount,
                    token_address, status, tx_hash, gas_fee_wei, error_kind, error,
                    created_at, updated_at
             FROM transfers
             WHERE network = ?1 AND from_address = ?2 {status_clause}
             ORDER BY created_at DESC, transfer_id DESC
             LIMIT ?3 OFFSET ?4"
        );

        let mut stmt = self
            .conn
            .prepare(&query_sql)
            .context("Failed to prepare transfer query")?;
        let rows = stmt
            .query_map(params![network, from_address, limit, offset], row_to_record)
            .context("Failed to query transfers")?;

        let transfers: Vec<TransferRecord> = rows
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read transfer rows")?;

        Ok(TransferPage {
            transfers,
            total,
            offset,
            limit,
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransferRecord> {
    let amount: String = row.get(4)?;
    let status: String = row.get(6)?;
    let gas_fee: Option<String> = row.get(8)?;
    Ok(TransferRecord {
        transfer_id: row.get(0)?,
        network: row.get(1)?,
        from_address: row.get(2)?,
        to_address: row.get(3)?,
        amount: amount.parse().unwrap_or(0),
        token_address: row.get(5)?,
        status: status.parse().unwrap_or(TransferStatus::Failed),
        transaction_hash: row.get(7)?,
        gas_fee_wei: gas_fee.and_then(|f| f.parse().ok()),
        error_kind: row.get(9)?,
        error: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}
