/// Average True Range (ATR) indicator
///
/// Measures market volatility by calculating the average of true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Uses Wilder's smoothing (same as RSI and ADX) for the moving average.

use crate::models::Bar;

/// Calculate ATR for the given bars
///
/// Returns the current ATR value, or None if insufficient data
pub fn calculate_atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    // Calculate true ranges
    let mut true_ranges = Vec::new();
    for i in 1..bars.len() {
        let high = bars[i].high;
        let low = bars[i].low;
        let prev_close = bars[i - 1].close;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        true_ranges.push(tr);
    }

    if true_ranges.len() < period {
        return None;
    }

    // First ATR is simple average of first 'period' true ranges
    let first_atr: f64 = true_ranges.iter().take(period).sum::<f64>() / period as f64;

    // Apply Wilder's smoothing for subsequent values
    let mut atr = first_atr;
    for i in period..true_ranges.len() {
        atr = (atr * (period as f64 - 1.0) + true_ranges[i]) / period as f64;
    }

    Some(atr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bars(prices: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                ts: 1_700_000_000 + (i as i64) * 3600,
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_calculate_atr() {
        // Low volatility market
        let low_vol_prices: Vec<(f64, f64, f64, f64)> =
            std::iter::repeat((100.0, 101.0, 99.0, 100.0)).take(15).collect();

        let bars = make_bars(&low_vol_prices);
        let atr = calculate_atr(&bars, 14);

        assert!(atr.is_some());
        // ATR should be around 2.0 (high-low range)
        assert!(atr.unwrap() > 1.5 && atr.unwrap() < 2.5);
    }

    #[test]
    fn test_calculate_atr_high_volatility() {
        // High volatility market with gaps
        let high_vol_prices = vec![
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 110.0, 98.0, 105.0),
            (105.0, 108.0, 92.0, 95.0),
            (95.0, 103.0, 88.0, 100.0),
            (100.0, 115.0, 97.0, 110.0),
            (110.0, 112.0, 95.0, 98.0),
            (98.0, 108.0, 90.0, 105.0),
            (105.0, 120.0, 100.0, 115.0),
            (115.0, 118.0, 105.0, 110.0),
            (110.0, 125.0, 108.0, 120.0),
            (120.0, 130.0, 115.0, 125.0),
            (125.0, 128.0, 110.0, 115.0),
            (115.0, 122.0, 105.0, 118.0),
            (118.0, 130.0, 115.0, 125.0),
            (125.0, 135.0, 120.0, 130.0),
        ];

        let bars = make_bars(&high_vol_prices);
        let atr = calculate_atr(&bars, 14);

        assert!(atr.is_some());
        // ATR should be higher for volatile market
        assert!(atr.unwrap() > 10.0);
    }

    #[test]
    fn test_insufficient_data() {
        let prices = vec![(100.0, 101.0, 99.0, 100.0), (100.0, 101.0, 99.0, 100.0)];

        let bars = make_bars(&prices);
        let atr = calculate_atr(&bars, 14);

        assert!(atr.is_none());
    }
}
