use super::moving_average::ema_series;

/// MACD: fast EMA minus slow EMA, with a signal EMA over the MACD line.
///
/// Returns (macd, signal, histogram) for the last bar, or None if there
/// are not enough prices to fill the slow window plus the signal window.
pub fn calculate_macd(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Option<(f64, f64, f64)> {
    if fast == 0 || signal == 0 || fast >= slow || prices.len() < slow + signal {
        return None;
    }

    let fast_series = ema_series(prices, fast)?;
    let slow_series = ema_series(prices, slow)?;

    // slow_series[i] corresponds to price index slow-1+i; shift the fast
    // series by (slow - fast) to line the two up.
    let offset = slow - fast;
    let macd_line: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, s)| fast_series[i + offset] - s)
        .collect();

    let signal_series = ema_series(&macd_line, signal)?;

    let macd = *macd_line.last()?;
    let sig = *signal_series.last()?;

    Some((macd, sig, macd - sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_uptrend_positive() {
        // Steadily rising prices: fast EMA above slow EMA
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let (macd, signal, hist) = calculate_macd(&prices, 12, 26, 9).unwrap();

        assert!(macd > 0.0);
        assert!(signal > 0.0);
        assert!(hist.abs() < macd.abs() + 1.0);
    }

    #[test]
    fn test_macd_flat_is_zero() {
        let prices = vec![100.0; 60];
        let (macd, signal, hist) = calculate_macd(&prices, 12, 26, 9).unwrap();

        assert!(macd.abs() < 1e-9);
        assert!(signal.abs() < 1e-9);
        assert!(hist.abs() < 1e-9);
    }

    #[test]
    fn test_macd_insufficient_data() {
        let prices = vec![100.0; 30];
        assert!(calculate_macd(&prices, 12, 26, 9).is_none());
    }
}
