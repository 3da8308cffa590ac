//! At-most-once emission reservations per (user, symbol, timeframe).
//!
//! The `autopost_log` table is an append-only history: reservations are
//! never deleted, they simply age out of the dedup window.

use super::{now_ts, Store};
use crate::Result;

impl Store {
    /// True when a reservation for the key is still inside the window.
    pub async fn seen_recently(
        &self,
        user_id: &str,
        symbol: &str,
        timeframe: &str,
        window_secs: i64,
    ) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM autopost_log \
             WHERE user_id = ? AND symbol = ? AND timeframe = ? AND ts >= ?",
        )
        .bind(user_id)
        .bind(symbol)
        .bind(timeframe)
        .bind(now_ts() - window_secs)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Atomically reserve an emission slot inside the dedup window.
    ///
    /// Check-then-insert runs as a single statement, so two concurrent
    /// reservations for the same key cannot both succeed. Returns false
    /// when a fresh reservation already exists — expected control flow,
    /// not an error.
    pub async fn reserve_autopost(
        &self,
        user_id: &str,
        symbol: &str,
        timeframe: &str,
        rr: Option<f64>,
        window_secs: i64,
    ) -> Result<bool> {
        let now = now_ts();

        let result = sqlx::query(
            "INSERT INTO autopost_log(user_id, symbol, timeframe, rr, ts) \
             SELECT ?, ?, ?, ?, ? \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM autopost_log \
                 WHERE user_id = ? AND symbol = ? AND timeframe = ? AND ts >= ? \
             )",
        )
        .bind(user_id)
        .bind(symbol)
        .bind(timeframe)
        .bind(rr.unwrap_or(0.0))
        .bind(now)
        .bind(user_id)
        .bind(symbol)
        .bind(timeframe)
        .bind(now - window_secs)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the newest reservation for the key as sent.
    ///
    /// Confirming without a reservation is a no-op (logged only).
    pub async fn confirm_autopost(
        &self,
        user_id: &str,
        symbol: &str,
        timeframe: &str,
        rr: Option<f64>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE autopost_log SET ts_sent = ?, rr = COALESCE(?, rr) \
             WHERE id = ( \
                 SELECT id FROM autopost_log \
                 WHERE user_id = ? AND symbol = ? AND timeframe = ? \
                 ORDER BY ts DESC, id DESC LIMIT 1 \
             )",
        )
        .bind(now_ts())
        .bind(rr)
        .bind(user_id)
        .bind(symbol)
        .bind(timeframe)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                "confirm_autopost without reservation for {}/{}/{} — ignored",
                user_id,
                symbol,
                timeframe
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_reserve_confirm_then_reserve_again() {
        let store = Store::connect(":memory:").await.unwrap();

        assert!(store
            .reserve_autopost("1", "BTCUSDT", "1h", Some(2.0), 90)
            .await
            .unwrap());

        store
            .confirm_autopost("1", "BTCUSDT", "1h", Some(2.0))
            .await
            .unwrap();

        // Second reserve within the window must fail
        assert!(!store
            .reserve_autopost("1", "BTCUSDT", "1h", Some(2.0), 90)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_reserves_exactly_one_wins() {
        let store = Store::connect(":memory:").await.unwrap();

        let a = store.reserve_autopost("1", "BTCUSDT", "1h", None, 90);
        let b = store.reserve_autopost("1", "BTCUSDT", "1h", None, 90);
        let (a, b) = tokio::join!(a, b);

        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a ^ b, "exactly one of two concurrent reserves must win");
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let store = Store::connect(":memory:").await.unwrap();

        assert!(store
            .reserve_autopost("1", "BTCUSDT", "1h", None, 90)
            .await
            .unwrap());
        assert!(store
            .reserve_autopost("1", "BTCUSDT", "4h", None, 90)
            .await
            .unwrap());
        assert!(store
            .reserve_autopost("2", "BTCUSDT", "1h", None, 90)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_expired_reservation_does_not_block() {
        let store = Store::connect(":memory:").await.unwrap();

        // Backdate a reservation beyond the window
        sqlx::query(
            "INSERT INTO autopost_log(user_id, symbol, timeframe, rr, ts) VALUES(?,?,?,?,?)",
        )
        .bind("1")
        .bind("ETHUSDT")
        .bind("1h")
        .bind(1.8)
        .bind(now_ts() - 600)
        .execute(store.pool())
        .await
        .unwrap();

        assert!(store
            .reserve_autopost("1", "ETHUSDT", "1h", None, 90)
            .await
            .unwrap());

        // History is append-only: both rows remain
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM autopost_log")
            .fetch_one(store.pool())
            .await
            .unwrap()
            .get("n");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_confirm_without_reserve_is_noop() {
        let store = Store::connect(":memory:").await.unwrap();

        store
            .confirm_autopost("1", "XRPUSDT", "1h", None)
            .await
            .unwrap();

        assert!(!store.seen_recently("1", "XRPUSDT", "1h", 90).await.unwrap());
    }
}
