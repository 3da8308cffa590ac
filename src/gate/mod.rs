use serde::Serialize;

use crate::indicators::IndicatorSnapshot;
use crate::models::Direction;

/// How the trend-alignment check is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendFilter {
    /// EMA50 strictly above EMA200 for LONG, strictly below for SHORT.
    Ema50OverEma200,
    /// Trend check always passes.
    Off,
}

impl TrendFilter {
    /// Unknown values fall back to the EMA comparison.
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "disabled" => TrendFilter::Off,
            _ => TrendFilter::Ema50OverEma200,
        }
    }
}

/// Thresholds for the gate battery. Ratios (ATR, VWAP distance, band
/// width, EMA separation) are fractions of price, not percent.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub atr_min: f64,
    pub rsi_long_min: f64,
    pub rsi_short_max: f64,
    pub adx_min: f64,
    pub bbw_min: f64,
    pub vol_rel_min: f64,
    pub vwap_dist_min: f64,
    pub ema_sep_min: f64,
    pub trend_filter: TrendFilter,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            atr_min: 0.004,
            rsi_long_min: 50.0,
            rsi_short_max: 50.0,
            adx_min: 18.0,
            bbw_min: 0.015,
            vol_rel_min: 1.2,
            vwap_dist_min: 0.0015,
            ema_sep_min: 1e-4,
            trend_filter: TrendFilter::Ema50OverEma200,
        }
    }
}

/// Result of one gate evaluation: how many checks passed, which failed,
/// and an echo of the snapshot the verdict was based on.
#[derive(Debug, Clone, Serialize)]
pub struct GateOutcome {
    pub passed: u32,
    pub total: u32,
    pub failed: Vec<&'static str>,
    pub snapshot: IndicatorSnapshot,
}

impl GateOutcome {
    pub fn accepts(&self, min_pass: u32) -> bool {
        self.passed >= min_pass
    }
}

/// Run the fixed battery of 12 checks against an indicator snapshot.
///
/// A missing (None) indicator fails only the checks that need it; there is
/// no global short-circuit. A fully degenerate snapshot therefore yields
/// passed=0 with one failure tag per check.
pub fn evaluate_gate(
    snapshot: &IndicatorSnapshot,
    direction: Direction,
    config: &GateConfig,
) -> GateOutcome {
    let long = direction == Direction::Long;
    let mut passed = 0u32;
    let mut failed: Vec<&'static str> = Vec::new();

    let mut check = |ok: Option<bool>, tag: &'static str| {
        if ok == Some(true) {
            passed += 1;
        } else {
            failed.push(tag);
        }
    };

    // 1) Trend alignment (EMA50 vs EMA200)
    let trend_ok = match config.trend_filter {
        TrendFilter::Off => Some(true),
        TrendFilter::Ema50OverEma200 => match (snapshot.ema50, snapshot.ema200) {
            (Some(fast), Some(slow)) => Some(if long { fast > slow } else { fast < slow }),
            _ => None,
        },
    };
    check(trend_ok, "weak_trend");

    // 2) Minimum volatility (ATR / close)
    check(snapshot.atr_pct.map(|v| v >= config.atr_min), "low_atr");

    // 3) RSI directional bias
    check(
        snapshot.rsi.map(|v| {
            if long {
                v >= config.rsi_long_min
            } else {
                v <= config.rsi_short_max
            }
        }),
        "rsi_fail",
    );

    // 4) Trend strength
    check(snapshot.adx.map(|v| v >= config.adx_min), "low_adx");

    // 5) Bollinger band width
    check(snapshot.bb_width.map(|v| v >= config.bbw_min), "narrow_bands");

    // 6) Relative volume
    check(
        snapshot.rel_vol.map(|v| v >= config.vol_rel_min),
        "low_volume",
    );

    // 7) Distance from VWAP
    check(
        snapshot.vwap_dist.map(|v| v >= config.vwap_dist_min),
        "vwap_too_close",
    );

    // 8) EMA50 slope in the trade direction
    check(
        snapshot
            .ema50_slope
            .map(|v| if long { v > 0.0 } else { v < 0.0 }),
        "ema50_flat",
    );

    // 9) Price relative to EMA50
    check(
        snapshot
            .price_rel_ema50
            .map(|v| if long { v > 0.0 } else { v < 0.0 }),
        "price_vs_ema50",
    );

    // 10) Price relative to EMA200
    check(
        snapshot
            .price_rel_ema200
            .map(|v| if long { v > 0.0 } else { v < 0.0 }),
        "price_vs_ema200",
    );

    // 11) Local breakout: last close beyond the prior-bars extreme
    let breakout_ok = match (snapshot.close, snapshot.recent_high, snapshot.recent_low) {
        (Some(c), Some(high), Some(low)) => Some(if long { c > high } else { c < low }),
        _ => None,
    };
    check(breakout_ok, "no_breakout");

    // 12) EMA separation stability: |EMA50 - EMA200| / price
    let sep_ok = match (snapshot.ema50, snapshot.ema200, snapshot.close) {
        (Some(fast), Some(slow), Some(c)) if c != 0.0 => {
            Some((fast - slow).abs() / c.abs() >= config.ema_sep_min)
        }
        _ => None,
    };
    check(sep_ok, "weak_sep");

    GateOutcome {
        passed,
        total: 12,
        failed,
        snapshot: snapshot.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong_long_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            close: Some(110.0),
            ema50: Some(105.0),
            ema200: Some(100.0),
            atr: Some(2.0),
            atr_pct: Some(0.018),
            rsi: Some(62.0),
            adx: Some(27.0),
            bb_width: Some(0.04),
            rel_vol: Some(1.6),
            vwap: Some(107.0),
            vwap_dist: Some(0.027),
            ema50_slope: Some(0.002),
            price_rel_ema50: Some(5.0),
            price_rel_ema200: Some(10.0),
            recent_high: Some(109.0),
            recent_low: Some(101.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_all_null_snapshot_fails_every_check() {
        let outcome = evaluate_gate(
            &IndicatorSnapshot::default(),
            Direction::Long,
            &GateConfig::default(),
        );

        assert_eq!(outcome.passed, 0);
        assert_eq!(outcome.total, 12);
        // One failure tag per check
        assert_eq!(outcome.failed.len(), 12);
        assert!(!outcome.accepts(8));
    }

    #[test]
    fn test_strong_long_passes_all_checks() {
        let outcome = evaluate_gate(
            &strong_long_snapshot(),
            Direction::Long,
            &GateConfig::default(),
        );

        assert_eq!(outcome.passed, 12);
        assert!(outcome.failed.is_empty());
        assert!(outcome.accepts(8));
    }

    #[test]
    fn test_single_null_fails_only_its_check() {
        let mut snap = strong_long_snapshot();
        snap.adx = None;

        let outcome = evaluate_gate(&snap, Direction::Long, &GateConfig::default());

        assert_eq!(outcome.passed, 11);
        assert_eq!(outcome.failed, vec!["low_adx"]);
    }

    #[test]
    fn test_direction_flips_checks() {
        // A textbook long setup graded as a SHORT mostly fails
        let outcome = evaluate_gate(
            &strong_long_snapshot(),
            Direction::Short,
            &GateConfig::default(),
        );

        assert!(outcome.failed.contains(&"weak_trend"));
        assert!(outcome.failed.contains(&"rsi_fail"));
        assert!(outcome.failed.contains(&"price_vs_ema50"));
        assert!(outcome.failed.contains(&"no_breakout"));
    }

    #[test]
    fn test_trend_filter_off() {
        let config = GateConfig {
            trend_filter: TrendFilter::Off,
            ..Default::default()
        };
        let outcome = evaluate_gate(&IndicatorSnapshot::default(), Direction::Long, &config);

        // Only the trend check passes on an empty snapshot
        assert_eq!(outcome.passed, 1);
        assert!(!outcome.failed.contains(&"weak_trend"));
    }
}
