//! Post-creation trade lifecycle: TP/SL closes, partial take-profit,
//! break-even moves, ATR trailing and the NEUTRAL policy.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::{Store, TradeClose, TradeRow, TradeUpdate};
use crate::models::{CloseReason, Direction, NeutralMode, TradeStatus};
use crate::rr::{calc_pnl_usd, rr_at_price};
use crate::Result;

/// Live price collaborator. None means "no quote", which skips the trade
/// for this pass rather than failing it.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(&self, symbol: &str) -> anyhow::Result<Option<f64>>;
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Progress (in R against the initial stop) at which the stop moves to
    /// break-even and the optional partial close fires.
    pub move_be_at_rr: f64,
    /// Progress at which ATR trailing starts.
    pub trail_at_rr: f64,
    /// Trailing distance in ATR multiples.
    pub atr_sl_mult: f64,
    pub partial_tp_enabled: bool,
    pub partial_tp_pct: f64,
    /// Default NEUTRAL policy; the settings table overrides it per pass.
    pub neutral_mode: NeutralMode,
    /// Signals that never became trades expire after this long.
    pub signal_ttl_secs: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            move_be_at_rr: 1.0,
            trail_at_rr: 1.5,
            atr_sl_mult: 2.0,
            partial_tp_enabled: true,
            partial_tp_pct: 0.5,
            neutral_mode: NeutralMode::Trail,
            signal_ttl_secs: 86_400,
        }
    }
}

/// Polls open trades against live prices and owns every post-creation
/// status transition.
pub struct TradeManager {
    store: Store,
    prices: Arc<dyn PriceSource>,
    config: LifecycleConfig,
}

impl TradeManager {
    pub fn new(store: Store, prices: Arc<dyn PriceSource>, config: LifecycleConfig) -> Self {
        Self {
            store,
            prices,
            config,
        }
    }

    /// One pass over all open trades. Returns how many trades changed.
    ///
    /// Per-trade failures (price lookup, row I/O) are logged and skipped;
    /// the rest of the batch still runs.
    pub async fn run_once(&self) -> Result<usize> {
        // Live-tunable knobs, re-read every pass
        let neutral_raw = self
            .store
            .get_setting("neutral_mode", self.config.neutral_mode.as_str())
            .await;
        let neutral_mode = NeutralMode::parse_or(&neutral_raw, self.config.neutral_mode);
        let move_be_at = self
            .store
            .get_setting_f64("move_be_at_rr", self.config.move_be_at_rr)
            .await;
        let partial_enabled = self
            .store
            .get_setting_bool("partial_tp_enabled", self.config.partial_tp_enabled)
            .await;

        let trades = self.store.load_open_trades().await?;
        let mut updated = 0;

        for trade in &trades {
            match self
                .manage_trade(trade, neutral_mode, move_be_at, partial_enabled)
                .await
            {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("lifecycle: trade#{} {} failed: {}", trade.id, trade.symbol, e);
                }
            }
        }

        self.store
            .expire_stale_signals(self.config.signal_ttl_secs)
            .await?;

        if updated > 0 {
            let perf = self.store.performance_summary().await?;
            tracing::info!(
                "lifecycle: {} trade(s) updated; closed total={} wins={} losses={} pnl=${:.2}",
                updated,
                perf.total,
                perf.wins,
                perf.losses,
                perf.pnl_usd
            );
        }

        Ok(updated)
    }

    /// Decide and apply this pass's mutations for one trade.
    ///
    /// All decisions are collected into a single [`TradeUpdate`] and written
    /// in one transaction.
    async fn manage_trade(
        &self,
        trade: &TradeRow,
        neutral_mode: NeutralMode,
        move_be_at: f64,
        partial_enabled: bool,
    ) -> Result<bool> {
        let Some(px) = self.prices.get_price(&trade.symbol).await? else {
            tracing::debug!("lifecycle: no price for {}, skipping", trade.symbol);
            return Ok(false);
        };

        // Terminal conditions first: TP/SL touched at the observed price.
        if let Some(close) = self.check_exit(trade, px) {
            return self.store.close_trade(trade, &close).await;
        }

        let mut update = TradeUpdate::default();
        // Local view of the stop as this pass tightens it
        let mut sl = trade.sl;

        // NEUTRAL policy for trades whose directional thesis is gone
        if self.store.has_neutral_signal(trade.id).await? {
            match neutral_mode {
                NeutralMode::Close => {
                    let (rr_realized, pnl_usd) = self.close_numbers(trade, px);
                    let close = TradeClose {
                        price: px,
                        reason: CloseReason::Neutral,
                        status: TradeStatus::Closed,
                        rr_realized,
                        pnl_usd,
                    };
                    return self.store.close_trade(trade, &close).await;
                }
                NeutralMode::Trail => {
                    if !trade.be_done {
                        update.move_sl_to_be = true;
                        sl = trade.entry;
                    }
                }
                NeutralMode::Ignore => {}
            }
        }

        // Progress is measured against the initial risk so BE/trailing
        // keep working after the stop has moved.
        let rr_cur = rr_at_price(trade.direction, trade.entry, trade.sl_initial, px);

        if rr_cur >= move_be_at {
            if partial_enabled && !trade.partial_50_done {
                let (_, pnl) = calc_pnl_usd(
                    trade.direction,
                    trade.entry,
                    trade.sl_initial,
                    px,
                    trade.size_usd,
                    trade.fees_bps as f64,
                    self.config.partial_tp_pct,
                );
                update.partial_pnl = pnl;
                tracing::info!(
                    "lifecycle: partial close {:.0}% trade#{} {} rr={:.2}",
                    self.config.partial_tp_pct * 100.0,
                    trade.id,
                    trade.symbol,
                    rr_cur
                );
            }
            if !trade.be_done && !update.move_sl_to_be {
                update.move_sl_to_be = true;
                sl = trade.entry;
                tracing::info!(
                    "lifecycle: BE move trade#{} {} rr={:.2}",
                    trade.id,
                    trade.symbol,
                    rr_cur
                );
            }
        }

        if rr_cur >= self.config.trail_at_rr {
            let atr = self.store.signal_atr_for_trade(trade.id).await?;
            if let Some(atr) = atr.filter(|a| *a > 0.0) {
                let candidate = match trade.direction {
                    Direction::Long => px - self.config.atr_sl_mult * atr,
                    Direction::Short => px + self.config.atr_sl_mult * atr,
                };
                // Only ever tighten
                let tightened = match trade.direction {
                    Direction::Long => candidate.max(sl),
                    Direction::Short => candidate.min(sl),
                };
                if (tightened - sl).abs() > 1e-12 {
                    update.new_sl = Some(tightened);
                }
            }
        }

        self.store.apply_trade_update(trade, &update).await
    }

    fn check_exit(&self, trade: &TradeRow, px: f64) -> Option<TradeClose> {
        let hit = match trade.direction {
            Direction::Long => {
                if px >= trade.tp {
                    Some((CloseReason::TakeProfit, TradeStatus::Win))
                } else if px <= trade.sl {
                    Some((CloseReason::StopLoss, TradeStatus::Loss))
                } else {
                    None
                }
            }
            Direction::Short => {
                if px <= trade.tp {
                    Some((CloseReason::TakeProfit, TradeStatus::Win))
                } else if px >= trade.sl {
                    Some((CloseReason::StopLoss, TradeStatus::Loss))
                } else {
                    None
                }
            }
        };

        hit.map(|(reason, status)| {
            let (rr_realized, pnl_usd) = self.close_numbers(trade, px);
            TradeClose {
                price: px,
                reason,
                status,
                rr_realized,
                pnl_usd,
            }
        })
    }

    /// Realized RR/PnL for closing whatever is still open of the position.
    fn close_numbers(&self, trade: &TradeRow, px: f64) -> (Option<f64>, Option<f64>) {
        let remaining = if trade.partial_50_done {
            1.0 - self.config.partial_tp_pct
        } else {
            1.0
        };
        calc_pnl_usd(
            trade.direction,
            trade.entry,
            trade.sl_initial,
            px,
            trade.size_usd,
            trade.fees_bps as f64,
            remaining,
        )
    }
}
