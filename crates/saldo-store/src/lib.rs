use chrono::Utc;
use rusqlite::{Connection, Error as SqlError, ErrorCode, OptionalExtension, params};
use saldo_api::TokenSource;
use saldo_core::model::MonthRecord;
use saldo_core::{SaldoError, SaldoResult};
use saldo_fs::WorkspacePaths;
use std::path::{Path, PathBuf};

const META_PENDING_CHANGES: &str = "pending_changes";
const META_API_STATUS: &str = "api_status";
const META_CURRENT_MONTH: &str = "current_month";

/// Durable mirror of the month collection plus the pending-offline-changes
/// flag, last-known connectivity status and stored tokens. A passive
/// single-writer resource: the reconciliation engine is the only writer per
/// workspace.
#[derive(Debug, Clone)]
pub struct StateStore {
    db_path: PathBuf,
}

impl StateStore {
    pub fn from_workspace(paths: &WorkspacePaths) -> SaldoResult<Self> {
        Self::open(&paths.state_db_path)
    }

    pub fn open(db_path: &Path) -> SaldoResult<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };

        let conn = store.connection()?;
        store.initialize_schema(&conn)?;
        Ok(store)
    }

    /// Loads the mirrored month collection, ordered by month key. A row
    /// whose stored JSON no longer parses is dropped with a warning; corrupt
    /// local data is "no data", never an error surfaced to the caller.
    pub fn load_months(&self) -> SaldoResult<Vec<MonthRecord>> {
        let conn = self.connection()?;
        let mut statement = conn
            .prepare("SELECT month_key, payload_json FROM months ORDER BY month_key ASC")
            .map_err(|err| sqlite_error("prepare months query", &self.db_path, err))?;

        let rows = statement
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|err| sqlite_error("query months", &self.db_path, err))?;

        let mut months = Vec::new();
        for row in rows {
            let (month_key, payload) =
                row.map_err(|err| sqlite_error("read month row", &self.db_path, err))?;
            match serde_json::from_str::<MonthRecord>(&payload) {
                Ok(record) => months.push(record),
                Err(err) => {
                    tracing::warn!(%month_key, error = %err, "dropping corrupt month row");
                }
            }
        }

        Ok(months)
    }

    /// Overwrites the mirrored collection atomically.
    pub fn save_months(&self, months: &[MonthRecord]) -> SaldoResult<()> {
        let mut conn = self.connection()?;
        let transaction = conn
            .transaction()
            .map_err(|err| sqlite_error("start months transaction", &self.db_path, err))?;

        transaction
            .execute("DELETE FROM months", [])
            .map_err(|err| sqlite_error("clear months", &self.db_path, err))?;

        for record in months {
            let payload = serde_json::to_string(record)
                .map_err(|err| SaldoError::io(format!("failed to encode month record: {err}")))?;
            transaction
                .execute(
                    "INSERT INTO months (month_key, payload_json, updated_at) VALUES (?1, ?2, ?3)",
                    params![record.month_key, payload, Utc::now().to_rfc3339()],
                )
                .map_err(|err| sqlite_error("insert month", &self.db_path, err))?;
        }

        transaction
            .commit()
            .map_err(|err| sqlite_error("commit months transaction", &self.db_path, err))?;

        Ok(())
    }

    /// The pending flag is presence-based: a row means true, no row means
    /// false. There is no third state.
    pub fn has_pending_changes(&self) -> SaldoResult<bool> {
        Ok(self.get_meta(META_PENDING_CHANGES)?.is_some())
    }

    pub fn set_pending_changes(&self, pending: bool) -> SaldoResult<()> {
        if pending {
            self.set_meta(META_PENDING_CHANGES, "true")
        } else {
            self.delete_meta(META_PENDING_CHANGES)
        }
    }

    pub fn set_api_status(&self, online: bool) -> SaldoResult<()> {
        self.set_meta(META_API_STATUS, if online { "online" } else { "offline" })
    }

    pub fn last_api_status(&self) -> SaldoResult<Option<String>> {
        self.get_meta(META_API_STATUS)
    }

    pub fn current_month(&self) -> SaldoResult<Option<String>> {
        self.get_meta(META_CURRENT_MONTH)
    }

    pub fn set_current_month(&self, month_key: &str) -> SaldoResult<()> {
        self.set_meta(META_CURRENT_MONTH, month_key)
    }

    pub fn save_tokens(&self, access: &str, refresh: &str) -> SaldoResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO tokens (id, access_token, refresh_token, updated_at) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET access_token = excluded.access_token,
                 refresh_token = excluded.refresh_token, updated_at = excluded.updated_at",
            params![access, refresh, Utc::now().to_rfc3339()],
        )
        .map_err(|err| sqlite_error("save tokens", &self.db_path, err))?;
        Ok(())
    }

    pub fn load_tokens(&self) -> SaldoResult<Option<(String, String)>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT access_token, refresh_token FROM tokens WHERE id = 1",
            [],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(|err| sqlite_error("load tokens", &self.db_path, err))
    }

    pub fn remove_tokens(&self) -> SaldoResult<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM tokens WHERE id = 1", [])
            .map_err(|err| sqlite_error("remove tokens", &self.db_path, err))?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> SaldoResult<Option<String>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|err| sqlite_error("load meta value", &self.db_path, err))
    }

    fn set_meta(&self, key: &str, value: &str) -> SaldoResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO meta (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|err| sqlite_error("save meta value", &self.db_path, err))?;
        Ok(())
    }

    fn delete_meta(&self, key: &str) -> SaldoResult<()> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM meta WHERE key = ?1", params![key])
            .map_err(|err| sqlite_error("delete meta value", &self.db_path, err))?;
        Ok(())
    }

    fn connection(&self) -> SaldoResult<Connection> {
        Connection::open(&self.db_path)
            .map_err(|err| sqlite_error("open state database", &self.db_path, err))
    }

    fn initialize_schema(&self, conn: &Connection) -> SaldoResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS months (
                 month_key TEXT PRIMARY KEY,
                 payload_json TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS meta (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS tokens (
                 id INTEGER PRIMARY KEY CHECK (id = 1),
                 access_token TEXT NOT NULL,
                 refresh_token TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );",
        )
        .map_err(|err| sqlite_error("initialize schema", &self.db_path, err))?;

        Ok(())
    }
}

impl TokenSource for StateStore {
    fn access_token(&self) -> Option<String> {
        match self.load_tokens() {
            Ok(tokens) => tokens.map(|(access, _)| access),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read access token");
                None
            }
        }
    }

    fn refresh_token(&self) -> Option<String> {
        match self.load_tokens() {
            Ok(tokens) => tokens.map(|(_, refresh)| refresh),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read refresh token");
                None
            }
        }
    }

    fn store_tokens(&self, access: &str, refresh: &str) -> SaldoResult<()> {
        self.save_tokens(access, refresh)
    }

    fn clear_tokens(&self) -> SaldoResult<()> {
        self.remove_tokens()
    }
}

fn sqlite_error(action: &str, db_path: &Path, err: SqlError) -> SaldoError {
    if let SqlError::SqliteFailure(code, message) = &err
        && (code.code == ErrorCode::DatabaseCorrupt || code.code == ErrorCode::NotADatabase)
    {
        let detail = message.as_deref().unwrap_or("sqlite reported corruption");
        return SaldoError::io(format!(
            "failed to {action}: state database '{}' is corrupted ({detail}); remove '.saldo/state.db' and reload to rebuild the local cache from the server",
            db_path.display()
        ));
    }

    SaldoError::io(format!(
        "failed to {action} using state database '{}': {}",
        db_path.display(),
        err
    ))
}
