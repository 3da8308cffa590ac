use std::sync::Arc;

use async_trait::async_trait;

use crate::gate::{evaluate_gate, GateConfig, GateOutcome};
use crate::indicators::{compute_snapshot, IndicatorParams};
use crate::models::{Bar, Direction};
use crate::rr::{classic_pivots, pick_target, swing_extremes};

/// Market data collaborator. Implementations must return an empty vector,
/// not an error, when the venue simply has no data for the symbol.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn get_ohlcv(&self, symbol: &str, timeframe: &str, limit: usize)
        -> anyhow::Result<Vec<Bar>>;
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub bars: usize,
    pub min_bars: usize,
    pub stop_atr_mult: f64,
    pub min_rr: f64,
    pub max_rr: f64,
    pub swing_lookback: usize,
    pub indicators: IndicatorParams,
    pub gate: GateConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "BNBUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            timeframe: "1h".to_string(),
            bars: 200,
            min_bars: 60,
            stop_atr_mult: 1.5,
            min_rr: 1.5,
            max_rr: 4.0,
            swing_lookback: 20,
            indicators: IndicatorParams::default(),
            gate: GateConfig::default(),
        }
    }
}

/// A fully-typed trade plan candidate for one symbol/timeframe.
///
/// Ephemeral: lives for a single pipeline pass. The gate outcome carries
/// the indicator snapshot the plan was derived from.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub symbol: String,
    pub timeframe: String,
    pub direction: Direction,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub rr: f64,
    pub target_source: String,
    pub gate: GateOutcome,
    pub snapshot_ts: i64,
}

/// Scans the configured symbols and produces trade plan candidates.
///
/// Pure read path: fetches bars, computes indicators, derives levels.
/// Never mutates persisted state; acceptance happens downstream.
pub struct CandidateCollector {
    market: Arc<dyn MarketData>,
    config: CollectorConfig,
}

impl CandidateCollector {
    pub fn new(market: Arc<dyn MarketData>, config: CollectorConfig) -> Self {
        Self { market, config }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// One scan pass over all configured symbols.
    ///
    /// A failure on one symbol is logged and skipped; the rest of the batch
    /// still runs.
    pub async fn collect(&self) -> Vec<Candidate> {
        let mut out = Vec::new();

        for symbol in &self.config.symbols {
            match self.collect_symbol(symbol).await {
                Ok(Some(candidate)) => out.push(candidate),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("collector: {} skipped: {}", symbol, e);
                }
            }
        }

        tracing::debug!("collector: {} candidate(s) from this pass", out.len());
        out
    }

    async fn collect_symbol(&self, symbol: &str) -> anyhow::Result<Option<Candidate>> {
        let bars = self
            .market
            .get_ohlcv(symbol, &self.config.timeframe, self.config.bars)
            .await?;

        if bars.len() < self.config.min_bars {
            tracing::debug!(
                "collector: {} has {} bars (< {}), skipping",
                symbol,
                bars.len(),
                self.config.min_bars
            );
            return Ok(None);
        }

        let snapshot = compute_snapshot(&bars, &self.config.indicators);

        let (Some(close), Some(ema50), Some(ema200), Some(atr)) =
            (snapshot.close, snapshot.ema50, snapshot.ema200, snapshot.atr)
        else {
            tracing::debug!("collector: {} indicators degenerate, skipping", symbol);
            return Ok(None);
        };

        // Simple trend following: fast EMA above slow means LONG
        let direction = if ema50 >= ema200 {
            Direction::Long
        } else {
            Direction::Short
        };

        let dist = self.config.stop_atr_mult * atr;
        if dist <= 0.0 {
            return Ok(None);
        }
        let sl = match direction {
            Direction::Long => close - dist,
            Direction::Short => close + dist,
        };

        let pivots = classic_pivots(&bars);
        let bollinger = match (snapshot.bb_lower, snapshot.bb_mid, snapshot.bb_upper) {
            (Some(lower), Some(mid), Some(upper)) => Some((lower, mid, upper)),
            _ => None,
        };
        let swing = swing_extremes(&bars, self.config.swing_lookback);

        let Some(pick) = pick_target(
            direction,
            close,
            sl,
            pivots.as_ref(),
            bollinger,
            swing,
            self.config.min_rr,
            self.config.max_rr,
        ) else {
            return Ok(None);
        };

        let gate = evaluate_gate(&snapshot, direction, &self.config.gate);
        let snapshot_ts = bars.last().map(|b| b.ts).unwrap_or(0);

        Ok(Some(Candidate {
            symbol: symbol.to_string(),
            timeframe: self.config.timeframe.clone(),
            direction,
            entry: close,
            sl,
            tp: pick.price,
            rr: pick.rr,
            target_source: pick.source,
            gate,
            snapshot_ts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StubMarket {
        series: HashMap<String, Vec<Bar>>,
    }

    #[async_trait]
    impl MarketData for StubMarket {
        async fn get_ohlcv(
            &self,
            symbol: &str,
            _timeframe: &str,
            _limit: usize,
        ) -> anyhow::Result<Vec<Bar>> {
            match self.series.get(symbol) {
                Some(bars) => Ok(bars.clone()),
                None => anyhow::bail!("connection refused"),
            }
        }
    }

    fn trending_bars(n: usize, step: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + step * i as f64;
                Bar {
                    ts: 1_700_000_000 + (i as i64) * 3600,
                    open: base,
                    high: base + 1.5,
                    low: base - 1.5,
                    close: base + 1.0,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    fn collector_with(series: HashMap<String, Vec<Bar>>, symbols: Vec<&str>) -> CandidateCollector {
        let config = CollectorConfig {
            symbols: symbols.into_iter().map(String::from).collect(),
            ..Default::default()
        };
        CandidateCollector::new(Arc::new(StubMarket { series }), config)
    }

    #[tokio::test]
    async fn test_collect_uptrend_long() {
        let mut series = HashMap::new();
        series.insert("BTCUSDT".to_string(), trending_bars(250, 0.5));
        let collector = collector_with(series, vec!["BTCUSDT"]);

        let candidates = collector.collect().await;
        assert_eq!(candidates.len(), 1);

        let c = &candidates[0];
        assert_eq!(c.direction, Direction::Long);
        assert!(c.sl < c.entry);
        assert!(c.tp > c.entry);
        assert!(c.rr >= 1.5 && c.rr <= 4.0);
        assert_eq!(c.snapshot_ts, 1_700_000_000 + 249 * 3600);
    }

    #[tokio::test]
    async fn test_collect_downtrend_short() {
        let mut series = HashMap::new();
        series.insert("ETHUSDT".to_string(), {
            (0..250)
                .map(|i| {
                    let base = 500.0 - 0.5 * i as f64;
                    Bar {
                        ts: (i as i64) * 3600,
                        open: base,
                        high: base + 1.5,
                        low: base - 1.5,
                        close: base - 1.0,
                        volume: 1000.0,
                    }
                })
                .collect()
        });
        let collector = collector_with(series, vec!["ETHUSDT"]);

        let candidates = collector.collect().await;
        assert_eq!(candidates.len(), 1);

        let c = &candidates[0];
        assert_eq!(c.direction, Direction::Short);
        assert!(c.sl > c.entry);
        assert!(c.tp < c.entry);
    }

    #[tokio::test]
    async fn test_short_series_skipped() {
        let mut series = HashMap::new();
        series.insert("BTCUSDT".to_string(), trending_bars(30, 0.5));
        let collector = collector_with(series, vec!["BTCUSDT"]);

        assert!(collector.collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_failing_symbol_does_not_abort_batch() {
        let mut series = HashMap::new();
        series.insert("ETHUSDT".to_string(), trending_bars(250, 0.5));
        // BTCUSDT missing: fetch errors, ETHUSDT must still come through
        let collector = collector_with(series, vec!["BTCUSDT", "ETHUSDT"]);

        let candidates = collector.collect().await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].symbol, "ETHUSDT");
    }

    #[tokio::test]
    async fn test_empty_feed_yields_no_candidates() {
        let mut series = HashMap::new();
        series.insert("BTCUSDT".to_string(), Vec::new());
        let collector = collector_with(series, vec!["BTCUSDT"]);

        assert!(collector.collect().await.is_empty());
    }
}
