pub mod dedup;
pub mod signals;
pub mod trades;

pub use signals::SignalDraft;
pub use trades::{PerfSummary, TradeClose, TradeDraft, TradeRow, TradeUpdate};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::Result;

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// SQLite persistence for signals, trades, the settings key-value store
/// and the autopost dedup log.
///
/// Cheap to clone: all clones share one connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the database (creating the file if needed) and run migrations.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub async fn connect(path: &str) -> Result<Self> {
        // An in-memory database exists per connection, so it must not be
        // spread across a pool.
        let (url, max_connections) = if path == ":memory:" {
            ("sqlite::memory:".to_string(), 1)
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            (format!("sqlite:{}?mode=rwc", path), 5)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to SQLite at {}", path);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read a setting, falling back to `default` on a missing row or a
    /// read failure.
    pub async fn get_setting(&self, key: &str, default: &str) -> String {
        match sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(row)) => row.get::<String, _>("value"),
            Ok(None) => default.to_string(),
            Err(e) => {
                tracing::warn!("get_setting({}) failed: {}", key, e);
                default.to_string()
            }
        }
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings(key, value) VALUES(?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Numeric setting; unparseable or absent values fall back to `default`.
    pub async fn get_setting_f64(&self, key: &str, default: f64) -> f64 {
        self.get_setting(key, "")
            .await
            .trim()
            .parse::<f64>()
            .unwrap_or(default)
    }

    pub async fn get_setting_bool(&self, key: &str, default: bool) -> bool {
        match self
            .get_setting(key, "")
            .await
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        }
    }
}
