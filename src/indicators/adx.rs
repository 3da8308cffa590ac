/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// Also returns +DI and -DI to determine trend direction:
/// - +DI > -DI: Uptrend
/// - -DI > +DI: Downtrend

use crate::models::Bar;

/// Calculate ADX, +DI, and -DI for trend strength and direction
///
/// Returns (adx, plus_di, minus_di) or None if insufficient data
pub fn calculate_adx(bars: &[Bar], period: usize) -> Option<(f64, f64, f64)> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    // Step 1: Calculate True Range (TR) and Directional Movement (+DM, -DM)
    let mut true_ranges = Vec::new();
    let mut plus_dms = Vec::new();
    let mut minus_dms = Vec::new();

    for i in 1..bars.len() {
        let high = bars[i].high;
        let low = bars[i].low;
        let prev_close = bars[i - 1].close;
        let prev_high = bars[i - 1].high;
        let prev_low = bars[i - 1].low;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        true_ranges.push(tr);

        let up_move = high - prev_high;
        let down_move = prev_low - low;

        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };

        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        plus_dms.push(plus_dm);
        minus_dms.push(minus_dm);
    }

    if true_ranges.len() < period {
        return None;
    }

    // Step 2: Smooth True Range and Directional Movements (Wilder's smoothing)
    let smoothed_tr = wilder_smooth(&true_ranges, period)?;
    let smoothed_plus_dm = wilder_smooth(&plus_dms, period)?;
    let smoothed_minus_dm = wilder_smooth(&minus_dms, period)?;

    // Step 3: Calculate +DI and -DI
    let plus_di = if smoothed_tr > 0.0 {
        (smoothed_plus_dm / smoothed_tr) * 100.0
    } else {
        0.0
    };

    let minus_di = if smoothed_tr > 0.0 {
        (smoothed_minus_dm / smoothed_tr) * 100.0
    } else {
        0.0
    };

    // Step 4: Calculate DX (Directional Index)
    let di_sum = plus_di + minus_di;
    let dx = if di_sum > 0.0 {
        ((plus_di - minus_di).abs() / di_sum) * 100.0
    } else {
        0.0
    };

    // The current DX approximates ADX over a single evaluation window
    let adx = dx;

    Some((adx, plus_di, minus_di))
}

/// Wilder's smoothing method (similar to EMA but using Wilder's formula)
fn wilder_smooth(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period {
        return None;
    }

    // First smoothed value is simple average of first 'period' values
    let first_smooth: f64 = values[..period].iter().sum::<f64>() / period as f64;

    // Apply Wilder's smoothing for remaining values
    let mut smoothed = first_smooth;
    for value in &values[period..] {
        smoothed = (smoothed * (period as f64 - 1.0) + value) / period as f64;
    }

    Some(smoothed)
}
