//! The autopost pipeline: collect candidates, gate them, enforce the RR
//! floor, reserve the dedup slot, persist signal + paper trade, then hand
//! the rendered plan to the message sender.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::collector::{Candidate, CandidateCollector};
use crate::db::{SignalDraft, Store, TradeDraft};
use crate::models::Direction;
use crate::notify::{Button, MessageSender, OutboundMessage};
use crate::rr::compute_rr;
use crate::Result;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub user_id: String,
    pub chat_id: String,
    pub source: String,
    pub dedup_window_secs: i64,
    pub gate_enabled: bool,
    pub gate_min_pass: u32,
    pub min_rr: f64,
    pub size_usd: f64,
    pub fees_bps: i64,
    /// Open a paper trade for every accepted signal.
    pub open_trades: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_id: "default".to_string(),
            chat_id: "default".to_string(),
            source: "autopost".to_string(),
            dedup_window_secs: 90,
            gate_enabled: true,
            gate_min_pass: 8,
            min_rr: 1.5,
            size_usd: 100.0,
            fees_bps: 10,
            open_trades: true,
        }
    }
}

/// An accepted, persisted signal with its rendered message.
#[derive(Debug, Clone)]
pub struct PreparedSignal {
    pub signal_id: i64,
    pub symbol: String,
    pub timeframe: String,
    pub rr: f64,
    pub message: OutboundMessage,
}

pub struct AutopostPipeline {
    collector: CandidateCollector,
    store: Store,
    sender: Arc<dyn MessageSender>,
    config: PipelineConfig,
}

impl AutopostPipeline {
    pub fn new(
        collector: CandidateCollector,
        store: Store,
        sender: Arc<dyn MessageSender>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            collector,
            store,
            sender,
            config,
        }
    }

    /// One full scan pass. Returns the signals that were accepted and
    /// handed to the sender.
    ///
    /// Rejections (dedup, gate, RR floor, lost reservation race) are
    /// logged with their reason and skipped. A failing candidate never
    /// aborts the rest of the batch.
    pub async fn run_once(&self) -> Result<Vec<PreparedSignal>> {
        let candidates = self.collector.collect().await;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Floors the operator can tune at runtime
        let rr_min = self
            .store
            .get_setting_f64("autopost_rr", self.config.min_rr)
            .await;
        let min_pass = self
            .store
            .get_setting_f64("gate_min_pass", self.config.gate_min_pass as f64)
            .await as u32;
        let window = self
            .store
            .get_setting_f64("dedup_window_sec", self.config.dedup_window_secs as f64)
            .await as i64;

        // In-run dedup across clone candidates within one pass
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut prepared = Vec::new();

        for candidate in &candidates {
            match self
                .process_candidate(candidate, &mut seen, rr_min, min_pass, window)
                .await
            {
                Ok(Some(p)) => prepared.push(p),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("autopost: candidate {} failed: {}", candidate.symbol, e);
                }
            }
        }

        tracing::info!("autopost: prepared {} message(s)", prepared.len());

        for p in &prepared {
            match self.sender.send(&p.message).await {
                Ok(()) => {
                    self.store
                        .confirm_autopost(&self.config.user_id, &p.symbol, &p.timeframe, Some(p.rr))
                        .await?;
                }
                Err(e) => {
                    tracing::warn!("autopost: send failed for {}: {}", p.symbol, e);
                }
            }
        }

        Ok(prepared)
    }

    async fn process_candidate(
        &self,
        candidate: &Candidate,
        seen: &mut HashSet<(String, String)>,
        rr_min: f64,
        min_pass: u32,
        window: i64,
    ) -> Result<Option<PreparedSignal>> {
        let symbol = candidate.symbol.to_uppercase();
        let timeframe = candidate.timeframe.to_lowercase();

        if !seen.insert((symbol.clone(), timeframe.clone())) {
            tracing::info!("autopost: in-run dedup {}/{} — skip", symbol, timeframe);
            return Ok(None);
        }

        if self
            .store
            .seen_recently(&self.config.user_id, &symbol, &timeframe, window)
            .await?
        {
            tracing::info!("autopost: dedup_recent {}/{} — skip", symbol, timeframe);
            return Ok(None);
        }

        if self.config.gate_enabled && !candidate.gate.accepts(min_pass) {
            tracing::info!(
                "autopost: SKIP {}/{}: gate {}/{} < {} ({})",
                symbol,
                timeframe,
                candidate.gate.passed,
                candidate.gate.total,
                min_pass,
                candidate.gate.failed.join(",")
            );
            return Ok(None);
        }

        let Some(rr) = compute_rr(candidate.direction, candidate.entry, candidate.sl, candidate.tp)
        else {
            tracing::info!("autopost: SKIP {}/{}: degenerate rr", symbol, timeframe);
            return Ok(None);
        };
        if rr < rr_min {
            tracing::info!(
                "autopost: SKIP {}/{}: rr={:.2} < min {:.2}",
                symbol,
                timeframe,
                rr,
                rr_min
            );
            return Ok(None);
        }

        // Atomic reservation before anything is persisted or sent
        if !self
            .store
            .reserve_autopost(&self.config.user_id, &symbol, &timeframe, Some(rr), window)
            .await?
        {
            tracing::info!(
                "autopost: race-dedup {}/{} — already reserved, skip",
                symbol,
                timeframe
            );
            return Ok(None);
        }

        let analysis_id = Uuid::new_v4().to_string();
        let details = json!({
            "ind": candidate.gate.snapshot,
            "gate": {
                "score": candidate.gate.passed,
                "total": candidate.gate.total,
                "failed": candidate.gate.failed,
            },
            "target_source": candidate.target_source,
        });

        let signal_id = self
            .store
            .insert_open_signal(&SignalDraft {
                user_id: &self.config.user_id,
                source: &self.config.source,
                symbol: &symbol,
                timeframe: &timeframe,
                direction: candidate.direction,
                entry: Some(candidate.entry),
                sl: Some(candidate.sl),
                tp: Some(candidate.tp),
                rr: Some(rr),
                atr_entry: candidate.gate.snapshot.atr,
                size_usd: self.config.size_usd,
                analysis_id: &analysis_id,
                snapshot_ts: candidate.snapshot_ts,
                details: Some(details),
            })
            .await?;

        if self.config.open_trades {
            let trade_id = self
                .store
                .open_trade(
                    &TradeDraft {
                        signal_id: Some(signal_id),
                        symbol: &symbol,
                        timeframe: &timeframe,
                        direction: candidate.direction,
                        entry: candidate.entry,
                        sl: candidate.sl,
                        tp: candidate.tp,
                        rr_planned: Some(rr),
                        size_usd: self.config.size_usd,
                        fees_bps: self.config.fees_bps,
                    },
                    Some(candidate.entry),
                )
                .await?;

            if let Some(trade_id) = trade_id {
                self.store.link_signal_to_trade(signal_id, trade_id).await?;
            }
        }

        let message = OutboundMessage {
            chat_id: self.config.chat_id.clone(),
            text: render_plan(candidate, rr),
            buttons: plan_buttons(&symbol, &timeframe, candidate.direction),
        };

        Ok(Some(PreparedSignal {
            signal_id,
            symbol,
            timeframe,
            rr,
            message,
        }))
    }
}

fn render_plan(candidate: &Candidate, rr: f64) -> String {
    let snap = &candidate.gate.snapshot;

    let mut lines = vec![
        format!("Autopost plan {} [{}]", candidate.symbol, candidate.timeframe),
        format!("Dir: {} | RR≈{:.2}", candidate.direction.as_str(), rr),
        format!(
            "Entry: {:.4} | SL: {:.4} | TP: {:.4}",
            candidate.entry, candidate.sl, candidate.tp
        ),
        format!(
            "Gate: {}/{} | target {}",
            candidate.gate.passed, candidate.gate.total, candidate.target_source
        ),
    ];

    if let (Some(e50), Some(e200)) = (snap.ema50, snap.ema200) {
        let cmp = if e50 >= e200 { ">=" } else { "<" };
        lines.push(format!("Trend: EMA50 {:.4} {} EMA200 {:.4}", e50, cmp, e200));
    }
    if let Some(rsi) = snap.rsi {
        lines.push(format!("RSI14: {:.1}", rsi));
    }
    if let Some(atr_pct) = snap.atr_pct {
        lines.push(format!("ATR: {:.2}%", atr_pct * 100.0));
    }
    if let Some(vwap_dist) = snap.vwap_dist {
        lines.push(format!("VWAPΔ: {:.2}%", vwap_dist * 100.0));
    }
    if !candidate.gate.failed.is_empty() {
        lines.push(format!("Checks failed: {}", candidate.gate.failed.join(", ")));
    }

    lines.join("\n")
}

fn plan_buttons(symbol: &str, timeframe: &str, direction: Direction) -> Vec<Vec<Button>> {
    vec![
        vec![Button::url(
            "Chart (TV)",
            format!("https://www.tradingview.com/chart/?symbol=BINANCE:{}", symbol),
        )],
        vec![
            Button::callback(
                "Open as trade",
                format!(
                    "panel:open_trade:{}:{}:{}",
                    symbol,
                    timeframe,
                    direction.as_str()
                ),
            ),
            Button::callback("Ignore", "panel:ignore".to_string()),
        ],
    ]
}
