use serde::Serialize;

use crate::models::Bar;

use super::adx::calculate_adx;
use super::atr::calculate_atr;
use super::bollinger::{bandwidth, calculate_bollinger, percent_b};
use super::macd::calculate_macd;
use super::moving_average::{calculate_ema, ema_series};
use super::rsi::calculate_rsi;
use super::vwap::{calculate_vwap, relative_volume};

/// The breakout extremes need at least this many prior bars to mean anything.
const MIN_BREAKOUT_BARS: usize = 5;

/// Window lengths for the snapshot computation.
#[derive(Debug, Clone)]
pub struct IndicatorParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub atr_period: usize,
    pub rsi_period: usize,
    pub adx_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_k: f64,
    pub vol_lookback: usize,
    pub slope_lookback: usize,
    pub breakout_lookback: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: 50,
            ema_slow: 200,
            atr_period: 14,
            rsi_period: 14,
            adx_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_k: 2.0,
            vol_lookback: 20,
            slope_lookback: 10,
            breakout_lookback: 20,
        }
    }
}

/// Indicator values for the last bar of a series.
///
/// Every field is optional: a window that does not fit the input stays
/// None instead of failing the whole snapshot. The gate treats None as
/// "that check fails", nothing more.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndicatorSnapshot {
    pub close: Option<f64>,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
    pub atr: Option<f64>,
    pub atr_pct: Option<f64>,
    pub rsi: Option<f64>,
    pub adx: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_mid: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_pct_b: Option<f64>,
    pub bb_width: Option<f64>,
    pub vwap: Option<f64>,
    pub vwap_dist: Option<f64>,
    pub rel_vol: Option<f64>,
    pub ema50_slope: Option<f64>,
    pub price_rel_ema50: Option<f64>,
    pub price_rel_ema200: Option<f64>,
    pub recent_high: Option<f64>,
    pub recent_low: Option<f64>,
}

/// Compute the full indicator snapshot for the last bar.
///
/// Pure function: no I/O, no shared state. Divisions are guarded so the
/// result never carries NaN or Inf.
pub fn compute_snapshot(bars: &[Bar], params: &IndicatorParams) -> IndicatorSnapshot {
    if bars.is_empty() {
        return IndicatorSnapshot::default();
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let close = closes.last().copied();

    let ema50 = calculate_ema(&closes, params.ema_fast);

    // Slow EMA falls back to a shorter window on short series, but never
    // below the fast window.
    let slow_window = if closes.len() >= params.ema_slow {
        params.ema_slow
    } else {
        (closes.len() / 2).max(params.ema_fast)
    };
    let ema200 = calculate_ema(&closes, slow_window);

    let atr = calculate_atr(bars, params.atr_period);
    let atr_pct = match (atr, close) {
        (Some(a), Some(c)) if c != 0.0 => Some(a / c),
        _ => None,
    };

    let rsi = calculate_rsi(&closes, params.rsi_period);
    let adx = calculate_adx(bars, params.adx_period).map(|(adx, _, _)| adx);

    let macd3 = calculate_macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal);

    let bb = calculate_bollinger(&closes, params.bb_period, params.bb_k);
    let bb_pct_b = match (bb, close) {
        (Some((lower, _, upper)), Some(c)) => percent_b(c, lower, upper),
        _ => None,
    };
    let bb_width = bb.and_then(|(lower, mid, upper)| bandwidth(lower, mid, upper));

    let vwap = calculate_vwap(bars);
    let vwap_dist = match (vwap, close) {
        (Some(v), Some(c)) if c != 0.0 => Some((c - v).abs() / c.abs()),
        _ => None,
    };

    let rel_vol = relative_volume(bars, params.vol_lookback);

    let ema50_slope = ema_series(&closes, params.ema_fast).and_then(|series| {
        if series.len() <= params.slope_lookback {
            return None;
        }
        let last = series[series.len() - 1];
        let prev = series[series.len() - 1 - params.slope_lookback];
        let denom = params.slope_lookback as f64 * last.abs().max(1e-12);
        Some((last - prev) / denom)
    });

    let price_rel_ema50 = match (close, ema50) {
        (Some(c), Some(e)) => Some(c - e),
        _ => None,
    };
    let price_rel_ema200 = match (close, ema200) {
        (Some(c), Some(e)) => Some(c - e),
        _ => None,
    };

    // Extremes of the bars BEFORE the last one, for the breakout check.
    let prior = &bars[..bars.len() - 1];
    let lb = prior.len().min(params.breakout_lookback);
    let (recent_high, recent_low) = if lb >= MIN_BREAKOUT_BARS {
        let window = &prior[prior.len() - lb..];
        let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        (Some(high), Some(low))
    } else {
        (None, None)
    };

    IndicatorSnapshot {
        close,
        ema50,
        ema200,
        atr,
        atr_pct,
        rsi,
        adx,
        macd: macd3.map(|(m, _, _)| m),
        macd_signal: macd3.map(|(_, s, _)| s),
        macd_hist: macd3.map(|(_, _, h)| h),
        bb_lower: bb.map(|(l, _, _)| l),
        bb_mid: bb.map(|(_, m, _)| m),
        bb_upper: bb.map(|(_, _, u)| u),
        bb_pct_b,
        bb_width,
        vwap,
        vwap_dist,
        rel_vol,
        ema50_slope,
        price_rel_ema50,
        price_rel_ema200,
        recent_high,
        recent_low,
    }
}
