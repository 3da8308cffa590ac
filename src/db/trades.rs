//! Trade row persistence and the per-pass atomic update.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{now_ts, Store};
use crate::models::{CloseReason, Direction, SignalStatus, TradeStatus};
use crate::rr::calc_pnl_usd;
use crate::Result;

#[derive(Debug, Clone)]
pub struct TradeRow {
    pub id: i64,
    pub signal_id: Option<i64>,
    pub symbol: String,
    pub timeframe: String,
    pub direction: Direction,
    pub entry: f64,
    pub sl: f64,
    /// Stop at open time; the risk reference once `sl` starts moving.
    pub sl_initial: f64,
    pub tp: f64,
    pub rr_planned: Option<f64>,
    pub status: TradeStatus,
    pub size_usd: f64,
    pub fees_bps: i64,
    pub partial_50_done: bool,
    pub be_done: bool,
    pub pnl_usd: f64,
    pub opened_at: i64,
}

/// Field set for a new OPEN trade row.
#[derive(Debug, Clone)]
pub struct TradeDraft<'a> {
    pub signal_id: Option<i64>,
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub direction: Direction,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub rr_planned: Option<f64>,
    pub size_usd: f64,
    pub fees_bps: i64,
}

/// Terminal transition for one trade.
#[derive(Debug, Clone)]
pub struct TradeClose {
    pub price: f64,
    pub reason: CloseReason,
    pub status: TradeStatus,
    pub rr_realized: Option<f64>,
    pub pnl_usd: Option<f64>,
}

/// Everything one lifecycle pass wants to change on a trade, applied in a
/// single transaction so a failure never leaves the row half-updated.
#[derive(Debug, Clone, Default)]
pub struct TradeUpdate {
    pub close: Option<TradeClose>,
    pub partial_pnl: Option<f64>,
    pub move_sl_to_be: bool,
    pub new_sl: Option<f64>,
}

impl TradeUpdate {
    pub fn is_empty(&self) -> bool {
        self.close.is_none()
            && self.partial_pnl.is_none()
            && !self.move_sl_to_be
            && self.new_sl.is_none()
    }
}

/// Aggregate performance over non-OPEN trades.
#[derive(Debug, Clone, Default)]
pub struct PerfSummary {
    pub total: i64,
    pub wins: i64,
    pub losses: i64,
    pub pnl_usd: f64,
}

impl PerfSummary {
    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        if decided == 0 {
            return None;
        }
        Some(self.wins as f64 / decided as f64)
    }
}

fn signal_status_for(status: TradeStatus) -> SignalStatus {
    match status {
        TradeStatus::Open => SignalStatus::Open,
        TradeStatus::Win => SignalStatus::Win,
        TradeStatus::Loss => SignalStatus::Loss,
        TradeStatus::Closed => SignalStatus::Closed,
    }
}

fn trade_from_row(row: &SqliteRow) -> Result<TradeRow> {
    let direction_str: String = row.get("direction");
    let direction = Direction::parse(&direction_str).ok_or("invalid trade direction")?;

    let status_str: String = row.get("status");
    let status = TradeStatus::parse(&status_str).ok_or("invalid trade status")?;

    Ok(TradeRow {
        id: row.get("id"),
        signal_id: row.get("signal_id"),
        symbol: row.get("symbol"),
        timeframe: row.get("timeframe"),
        direction,
        entry: row.get("entry"),
        sl: row.get("sl"),
        sl_initial: row.get("sl_initial"),
        tp: row.get("tp"),
        rr_planned: row.get("rr_planned"),
        status,
        size_usd: row.get("size_usd"),
        fees_bps: row.get("fees_bps"),
        partial_50_done: row.get::<i64, _>("partial_50_done") != 0,
        be_done: row.get::<i64, _>("be_done") != 0,
        pnl_usd: row.get("pnl_usd"),
        opened_at: row.get("opened_at"),
    })
}

const TRADE_COLUMNS: &str = "id, signal_id, symbol, timeframe, direction, entry, sl, sl_initial, \
     tp, rr_planned, status, size_usd, fees_bps, partial_50_done, be_done, pnl_usd, opened_at";

impl Store {
    /// Open a trade for an accepted signal.
    ///
    /// A same-direction OPEN trade for (symbol, timeframe) makes this a
    /// no-op (None). Opposite-direction OPEN trades are closed as
    /// `reversed` at `last_price` (falling back to their entry) before the
    /// new row is inserted, all in one transaction.
    pub async fn open_trade(
        &self,
        draft: &TradeDraft<'_>,
        last_price: Option<f64>,
    ) -> Result<Option<i64>> {
        let now = now_ts();
        let mut tx = self.pool.begin().await?;

        let open_rows = sqlx::query(&format!(
            "SELECT {} FROM trades WHERE symbol = ? AND timeframe = ? AND status = 'OPEN'",
            TRADE_COLUMNS
        ))
        .bind(draft.symbol)
        .bind(draft.timeframe)
        .fetch_all(&mut *tx)
        .await?;

        let mut opposite = Vec::new();
        for row in &open_rows {
            let trade = trade_from_row(row)?;
            if trade.direction == draft.direction {
                tracing::info!(
                    "open_trade: {} [{}] already OPEN same direction, skip",
                    draft.symbol,
                    draft.timeframe
                );
                return Ok(None);
            }
            opposite.push(trade);
        }

        for trade in opposite {
            let exit = last_price.unwrap_or(trade.entry);
            let (rr_realized, pnl_usd) = calc_pnl_usd(
                trade.direction,
                trade.entry,
                trade.sl_initial,
                exit,
                trade.size_usd,
                trade.fees_bps as f64,
                1.0,
            );

            sqlx::query(
                "UPDATE trades SET status = 'CLOSED', closed_at = ?, close_price = ?, \
                 close_reason = ?, rr_realized = ?, pnl_usd = pnl_usd + ? \
                 WHERE id = ? AND status = 'OPEN'",
            )
            .bind(now)
            .bind(exit)
            .bind(CloseReason::Reversed.as_str())
            .bind(rr_realized)
            .bind(pnl_usd.unwrap_or(0.0))
            .bind(trade.id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE signals SET status = 'CLOSED', reason_close = ?, ts_closed = ? \
                 WHERE trade_id = ? AND status IN ('OPEN', 'SUGGESTED')",
            )
            .bind(CloseReason::Reversed.as_str())
            .bind(now)
            .bind(trade.id)
            .execute(&mut *tx)
            .await?;

            tracing::info!(
                "open_trade: closed opposite trade#{} {} as reversed",
                trade.id,
                trade.symbol
            );
        }

        let result = sqlx::query(
            "INSERT INTO trades( \
                 signal_id, symbol, timeframe, direction, entry, sl, sl_initial, tp, \
                 rr_planned, status, size_usd, fees_bps, opened_at \
             ) VALUES(?,?,?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(draft.signal_id)
        .bind(draft.symbol)
        .bind(draft.timeframe)
        .bind(draft.direction.as_str())
        .bind(draft.entry)
        .bind(draft.sl)
        .bind(draft.sl)
        .bind(draft.tp)
        .bind(draft.rr_planned)
        .bind(TradeStatus::Open.as_str())
        .bind(draft.size_usd)
        .bind(draft.fees_bps)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let id = result.last_insert_rowid();
        tracing::debug!(
            "opened trade#{} {} {} [{}] @ {}",
            id,
            draft.symbol,
            draft.direction.as_str(),
            draft.timeframe,
            draft.entry
        );

        Ok(Some(id))
    }

    pub async fn load_open_trades(&self) -> Result<Vec<TradeRow>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM trades WHERE status = 'OPEN' ORDER BY id",
            TRADE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(trade_from_row).collect()
    }

    pub async fn get_trade(&self, id: i64) -> Result<Option<TradeRow>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM trades WHERE id = ?",
            TRADE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(trade_from_row).transpose()
    }

    /// Apply one pass's mutations for a trade atomically.
    ///
    /// A close supersedes management updates. Every statement is guarded
    /// on `status = 'OPEN'` (and the one-shot flags), so replaying the
    /// same update against an already-closed row is a no-op: close() is
    /// idempotent by construction. The trailing-stop write re-checks
    /// monotonicity in SQL — the stop can only tighten, never widen.
    ///
    /// Returns true when any row actually changed.
    pub async fn apply_trade_update(&self, trade: &TradeRow, update: &TradeUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let now = now_ts();
        let mut tx = self.pool.begin().await?;

        if let Some(close) = &update.close {
            let result = sqlx::query(
                "UPDATE trades SET status = ?, closed_at = ?, close_price = ?, \
                 close_reason = ?, rr_realized = ?, pnl_usd = pnl_usd + ? \
                 WHERE id = ? AND status = 'OPEN'",
            )
            .bind(close.status.as_str())
            .bind(now)
            .bind(close.price)
            .bind(close.reason.as_str())
            .bind(close.rr_realized)
            .bind(close.pnl_usd.unwrap_or(0.0))
            .bind(trade.id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Ok(false);
            }

            sqlx::query(
                "UPDATE signals SET status = ?, reason_close = ?, ts_closed = ? \
                 WHERE trade_id = ? AND status IN ('OPEN', 'SUGGESTED')",
            )
            .bind(signal_status_for(close.status).as_str())
            .bind(close.reason.as_str())
            .bind(now)
            .bind(trade.id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            tracing::info!(
                "closed trade#{} {} {} @ {} ({})",
                trade.id,
                trade.symbol,
                close.status.as_str(),
                close.price,
                close.reason.as_str()
            );
            return Ok(true);
        }

        let mut changed = false;

        if let Some(pnl) = update.partial_pnl {
            let result = sqlx::query(
                "UPDATE trades SET partial_50_done = 1, pnl_usd = pnl_usd + ? \
                 WHERE id = ? AND status = 'OPEN' AND partial_50_done = 0",
            )
            .bind(pnl)
            .bind(trade.id)
            .execute(&mut *tx)
            .await?;
            changed |= result.rows_affected() > 0;
        }

        if update.move_sl_to_be {
            let result = sqlx::query(
                "UPDATE trades SET sl = entry, be_done = 1 \
                 WHERE id = ? AND status = 'OPEN' AND be_done = 0",
            )
            .bind(trade.id)
            .execute(&mut *tx)
            .await?;
            changed |= result.rows_affected() > 0;
        }

        if let Some(new_sl) = update.new_sl {
            let sql = match trade.direction {
                Direction::Long => {
                    "UPDATE trades SET sl = ? WHERE id = ? AND status = 'OPEN' AND ? > sl"
                }
                Direction::Short => {
                    "UPDATE trades SET sl = ? WHERE id = ? AND status = 'OPEN' AND ? < sl"
                }
            };
            let result = sqlx::query(sql)
                .bind(new_sl)
                .bind(trade.id)
                .bind(new_sl)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() > 0 {
                tracing::info!(
                    "trail trade#{} {} sl: {} -> {}",
                    trade.id,
                    trade.symbol,
                    trade.sl,
                    new_sl
                );
                changed = true;
            }
        }

        tx.commit().await?;
        Ok(changed)
    }

    /// Convenience wrapper for a bare close.
    pub async fn close_trade(&self, trade: &TradeRow, close: &TradeClose) -> Result<bool> {
        self.apply_trade_update(
            trade,
            &TradeUpdate {
                close: Some(close.clone()),
                ..Default::default()
            },
        )
        .await
    }

    /// Win/loss/PnL aggregate over all non-OPEN trades.
    pub async fn performance_summary(&self) -> Result<PerfSummary> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(CASE WHEN status = 'WIN' THEN 1 ELSE 0 END), 0) AS wins, \
                    COALESCE(SUM(CASE WHEN status = 'LOSS' THEN 1 ELSE 0 END), 0) AS losses, \
                    COALESCE(SUM(pnl_usd), 0.0) AS pnl_usd \
             FROM trades WHERE status != 'OPEN'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PerfSummary {
            total: row.get("total"),
            wins: row.get("wins"),
            losses: row.get("losses"),
            pnl_usd: row.get("pnl_usd"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft<'a>(symbol: &'a str, direction: Direction) -> TradeDraft<'a> {
        let (sl, tp) = match direction {
            Direction::Long => (107.0, 115.0),
            Direction::Short => (113.0, 105.0),
        };
        TradeDraft {
            signal_id: None,
            symbol,
            timeframe: "1h",
            direction,
            entry: 110.0,
            sl,
            tp,
            rr_planned: Some(5.0 / 3.0),
            size_usd: 100.0,
            fees_bps: 10,
        }
    }

    #[tokio::test]
    async fn test_open_and_load_trade() {
        let store = Store::connect(":memory:").await.unwrap();

        let id = store
            .open_trade(&draft("BTCUSDT", Direction::Long), None)
            .await
            .unwrap()
            .unwrap();

        let open = store.load_open_trades().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, id);
        assert_eq!(open[0].direction, Direction::Long);
        assert_eq!(open[0].sl, 107.0);
        assert!(!open[0].partial_50_done);
        assert!(!open[0].be_done);
    }

    #[tokio::test]
    async fn test_same_direction_open_is_noop() {
        let store = Store::connect(":memory:").await.unwrap();

        store
            .open_trade(&draft("BTCUSDT", Direction::Long), None)
            .await
            .unwrap()
            .unwrap();

        let second = store
            .open_trade(&draft("BTCUSDT", Direction::Long), None)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.load_open_trades().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_opposite_direction_reverses() {
        let store = Store::connect(":memory:").await.unwrap();

        let first = store
            .open_trade(&draft("BTCUSDT", Direction::Long), None)
            .await
            .unwrap()
            .unwrap();

        let second = store
            .open_trade(&draft("BTCUSDT", Direction::Short), Some(112.0))
            .await
            .unwrap()
            .unwrap();

        let old = store.get_trade(first).await.unwrap().unwrap();
        assert_eq!(old.status, TradeStatus::Closed);

        let reason: String = sqlx::query("SELECT close_reason FROM trades WHERE id = ?")
            .bind(first)
            .fetch_one(store.pool())
            .await
            .unwrap()
            .get("close_reason");
        assert_eq!(reason, "reversed");

        let open = store.load_open_trades().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, second);
        assert_eq!(open[0].direction, Direction::Short);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = Store::connect(":memory:").await.unwrap();

        let id = store
            .open_trade(&draft("BTCUSDT", Direction::Long), None)
            .await
            .unwrap()
            .unwrap();
        let trade = store.get_trade(id).await.unwrap().unwrap();

        let close = TradeClose {
            price: 115.0,
            reason: CloseReason::TakeProfit,
            status: TradeStatus::Win,
            rr_realized: Some(5.0 / 3.0),
            pnl_usd: Some(4.4),
        };

        assert!(store.close_trade(&trade, &close).await.unwrap());

        let after_first = store.get_trade(id).await.unwrap().unwrap();

        // Closing again (even with different numbers) changes nothing
        let second = TradeClose {
            price: 90.0,
            reason: CloseReason::StopLoss,
            status: TradeStatus::Loss,
            rr_realized: Some(-1.0),
            pnl_usd: Some(-3.0),
        };
        assert!(!store.close_trade(&after_first, &second).await.unwrap());

        let after_second = store.get_trade(id).await.unwrap().unwrap();
        assert_eq!(after_second.status, TradeStatus::Win);
        assert_eq!(after_second.pnl_usd, after_first.pnl_usd);
    }

    #[tokio::test]
    async fn test_partial_and_be_flags_set_once() {
        let store = Store::connect(":memory:").await.unwrap();

        let id = store
            .open_trade(&draft("BTCUSDT", Direction::Long), None)
            .await
            .unwrap()
            .unwrap();
        let trade = store.get_trade(id).await.unwrap().unwrap();

        let update = TradeUpdate {
            partial_pnl: Some(2.0),
            move_sl_to_be: true,
            ..Default::default()
        };
        assert!(store.apply_trade_update(&trade, &update).await.unwrap());

        let t = store.get_trade(id).await.unwrap().unwrap();
        assert!(t.partial_50_done);
        assert!(t.be_done);
        assert_eq!(t.sl, t.entry);
        assert_eq!(t.pnl_usd, 2.0);

        // Replaying the same update does nothing (flags are one-shot)
        assert!(!store.apply_trade_update(&t, &update).await.unwrap());
        let t2 = store.get_trade(id).await.unwrap().unwrap();
        assert_eq!(t2.pnl_usd, 2.0);
    }

    #[tokio::test]
    async fn test_trailing_stop_never_widens() {
        let store = Store::connect(":memory:").await.unwrap();

        let id = store
            .open_trade(&draft("BTCUSDT", Direction::Long), None)
            .await
            .unwrap()
            .unwrap();
        let trade = store.get_trade(id).await.unwrap().unwrap();

        // Tighten: 107 -> 111
        let update = TradeUpdate {
            new_sl: Some(111.0),
            ..Default::default()
        };
        assert!(store.apply_trade_update(&trade, &update).await.unwrap());
        assert_eq!(store.get_trade(id).await.unwrap().unwrap().sl, 111.0);

        // Attempt to widen back to 108: rejected at the write
        let trade = store.get_trade(id).await.unwrap().unwrap();
        let update = TradeUpdate {
            new_sl: Some(108.0),
            ..Default::default()
        };
        assert!(!store.apply_trade_update(&trade, &update).await.unwrap());
        assert_eq!(store.get_trade(id).await.unwrap().unwrap().sl, 111.0);
    }

    #[tokio::test]
    async fn test_performance_summary() {
        let store = Store::connect(":memory:").await.unwrap();

        let id1 = store
            .open_trade(&draft("BTCUSDT", Direction::Long), None)
            .await
            .unwrap()
            .unwrap();
        let id2 = store
            .open_trade(&draft("ETHUSDT", Direction::Long), None)
            .await
            .unwrap()
            .unwrap();
        store
            .open_trade(&draft("SOLUSDT", Direction::Long), None)
            .await
            .unwrap()
            .unwrap();

        let t1 = store.get_trade(id1).await.unwrap().unwrap();
        store
            .close_trade(
                &t1,
                &TradeClose {
                    price: 115.0,
                    reason: CloseReason::TakeProfit,
                    status: TradeStatus::Win,
                    rr_realized: Some(5.0 / 3.0),
                    pnl_usd: Some(4.0),
                },
            )
            .await
            .unwrap();

        let t2 = store.get_trade(id2).await.unwrap().unwrap();
        store
            .close_trade(
                &t2,
                &TradeClose {
                    price: 107.0,
                    reason: CloseReason::StopLoss,
                    status: TradeStatus::Loss,
                    rr_realized: Some(-1.0),
                    pnl_usd: Some(-2.8),
                },
            )
            .await
            .unwrap();

        let perf = store.performance_summary().await.unwrap();
        assert_eq!(perf.total, 2);
        assert_eq!(perf.wins, 1);
        assert_eq!(perf.losses, 1);
        assert!((perf.pnl_usd - 1.2).abs() < 1e-9);
        assert_eq!(perf.win_rate(), Some(0.5));
    }
}
