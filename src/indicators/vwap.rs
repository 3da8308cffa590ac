use crate::models::Bar;

/// Cumulative volume-weighted average price over the whole window,
/// using the typical price (H+L+C)/3 per bar.
///
/// Returns None when total volume is zero.
pub fn calculate_vwap(bars: &[Bar]) -> Option<f64> {
    let mut cum_pv = 0.0;
    let mut cum_v = 0.0;

    for bar in bars {
        let typical = (bar.high + bar.low + bar.close) / 3.0;
        cum_pv += typical * bar.volume;
        cum_v += bar.volume;
    }

    if cum_v <= 0.0 {
        return None;
    }

    Some(cum_pv / cum_v)
}

/// Last bar volume relative to the mean volume of the last `lookback` bars.
pub fn relative_volume(bars: &[Bar], lookback: usize) -> Option<f64> {
    if lookback == 0 || bars.len() < lookback {
        return None;
    }

    let window = &bars[bars.len() - lookback..];
    let avg: f64 = window.iter().map(|b| b.volume).sum::<f64>() / lookback as f64;
    if avg <= 0.0 {
        return None;
    }

    Some(bars.last()?.volume / avg)
}
