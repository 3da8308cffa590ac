//! Signal row persistence.

use sqlx::Row;

use super::{now_ts, Store};
use crate::models::{Direction, SignalStatus};
use crate::Result;

/// Field set for a new OPEN signal row.
#[derive(Debug, Clone)]
pub struct SignalDraft<'a> {
    pub user_id: &'a str,
    pub source: &'a str,
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub direction: Direction,
    pub entry: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub rr: Option<f64>,
    pub atr_entry: Option<f64>,
    pub size_usd: f64,
    pub analysis_id: &'a str,
    pub snapshot_ts: i64,
    pub details: Option<serde_json::Value>,
}

impl Store {
    /// Insert an OPEN signal. Absent prices default to 0.0; `rr` and
    /// `atr_entry` stay NULL when unknown.
    pub async fn insert_open_signal(&self, draft: &SignalDraft<'_>) -> Result<i64> {
        let details = draft.details.as_ref().map(|v| v.to_string());

        let result = sqlx::query(
            "INSERT INTO signals( \
                 user_id, source, symbol, timeframe, direction, \
                 entry, sl, tp, rr, atr_entry, status, \
                 analysis_id, snapshot_ts, size_usd, details, ts_created \
             ) VALUES(?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(draft.user_id)
        .bind(draft.source)
        .bind(draft.symbol)
        .bind(draft.timeframe)
        .bind(draft.direction.as_str())
        .bind(draft.entry.unwrap_or(0.0))
        .bind(draft.sl.unwrap_or(0.0))
        .bind(draft.tp.unwrap_or(0.0))
        .bind(draft.rr)
        .bind(draft.atr_entry)
        .bind(SignalStatus::Open.as_str())
        .bind(draft.analysis_id)
        .bind(draft.snapshot_ts)
        .bind(draft.size_usd)
        .bind(details)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(
            "inserted signal #{} {} {} [{}]",
            id,
            draft.symbol,
            draft.direction.as_str(),
            draft.timeframe
        );

        Ok(id)
    }

    pub async fn link_signal_to_trade(&self, signal_id: i64, trade_id: i64) -> Result<()> {
        sqlx::query("UPDATE signals SET trade_id = ? WHERE id = ?")
            .bind(trade_id)
            .bind(signal_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Move an OPEN/SUGGESTED signal to a terminal status.
    ///
    /// Idempotent: a signal that already reached a terminal status is left
    /// untouched and `false` is returned.
    pub async fn close_signal(
        &self,
        signal_id: i64,
        status: SignalStatus,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE signals SET status = ?, reason_close = ?, ts_closed = ? \
             WHERE id = ? AND status IN ('OPEN', 'SUGGESTED')",
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(now_ts())
        .bind(signal_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record that the directional thesis for this signal went NEUTRAL.
    /// The lifecycle pass picks it up on the linked trade.
    pub async fn mark_signal_neutral(&self, signal_id: i64) -> Result<()> {
        sqlx::query("UPDATE signals SET decision = 'NEUTRAL' WHERE id = ?")
            .bind(signal_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn has_neutral_signal(&self, trade_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM signals \
             WHERE trade_id = ? AND UPPER(COALESCE(decision, '')) = 'NEUTRAL' \
             LIMIT 1",
        )
        .bind(trade_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// ATR recorded at signal time for the newest signal linked to a trade.
    pub async fn signal_atr_for_trade(&self, trade_id: i64) -> Result<Option<f64>> {
        let row = sqlx::query(
            "SELECT atr_entry FROM signals WHERE trade_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(trade_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| r.get::<Option<f64>, _>("atr_entry")))
    }

    /// Expire OPEN/SUGGESTED signals older than `ttl_secs` that never
    /// became trades. Returns the number of expired rows.
    pub async fn expire_stale_signals(&self, ttl_secs: i64) -> Result<u64> {
        let now = now_ts();
        let result = sqlx::query(
            "UPDATE signals SET status = 'EXPIRED', ts_closed = ? \
             WHERE status IN ('OPEN', 'SUGGESTED') AND trade_id IS NULL AND ts_created < ?",
        )
        .bind(now)
        .bind(now - ttl_secs)
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::info!("expired {} stale signal(s)", expired);
        }

        Ok(expired)
    }
}
