/// Bollinger Bands over the last `period` closes.
///
/// Returns (lower, mid, upper) with the mid band being the SMA and the
/// bands at `k` population standard deviations, or None if insufficient data.
pub fn calculate_bollinger(prices: &[f64], period: usize, k: f64) -> Option<(f64, f64, f64)> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let window = &prices[prices.len() - period..];
    let mean: f64 = window.iter().sum::<f64>() / period as f64;
    let variance: f64 = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / period as f64;
    let std = variance.sqrt();

    Some((mean - k * std, mean, mean + k * std))
}

/// Position of `close` inside the bands (0 = lower band, 1 = upper band).
/// None when the bands have collapsed to zero width.
pub fn percent_b(close: f64, lower: f64, upper: f64) -> Option<f64> {
    let width = upper - lower;
    if width <= 0.0 {
        return None;
    }
    Some((close - lower) / width)
}

/// Band width normalized by the middle band. None when the mid band is zero.
pub fn bandwidth(lower: f64, mid: f64, upper: f64) -> Option<f64> {
    if mid == 0.0 {
        return None;
    }
    Some((upper - lower) / mid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bollinger_flat_series() {
        let prices = vec![100.0; 25];
        let (lower, mid, upper) = calculate_bollinger(&prices, 20, 2.0).unwrap();

        assert_eq!(mid, 100.0);
        assert_eq!(lower, 100.0);
        assert_eq!(upper, 100.0);

        // Zero-width bands: %B is undefined, not infinite
        assert!(percent_b(100.0, lower, upper).is_none());
        assert_eq!(bandwidth(lower, mid, upper), Some(0.0));
    }

    #[test]
    fn test_bollinger_bands_order() {
        let prices: Vec<f64> = (0..25).map(|i| 100.0 + (i % 5) as f64).collect();
        let (lower, mid, upper) = calculate_bollinger(&prices, 20, 2.0).unwrap();

        assert!(lower < mid && mid < upper);

        let pb = percent_b(*prices.last().unwrap(), lower, upper).unwrap();
        assert!((0.0..=1.0).contains(&pb));

        let bw = bandwidth(lower, mid, upper).unwrap();
        assert!(bw > 0.0);
    }

    #[test]
    fn test_bollinger_insufficient_data() {
        let prices = vec![100.0; 10];
        assert!(calculate_bollinger(&prices, 20, 2.0).is_none());
    }
}
