use crate::models::{Bar, Direction};

/// Risk below this is treated as zero: no trade idea.
pub const RR_EPS: f64 = 1e-6;

/// Risk/reward ratio oriented by direction.
///
/// LONG: reward = tp - entry, risk = entry - sl. SHORT mirrored.
/// Returns None when risk <= RR_EPS or reward <= 0, and never produces a
/// negative, NaN or infinite value.
pub fn compute_rr(direction: Direction, entry: f64, sl: f64, tp: f64) -> Option<f64> {
    if !entry.is_finite() || !sl.is_finite() || !tp.is_finite() {
        return None;
    }

    let (risk, reward) = match direction {
        Direction::Long => (entry - sl, tp - entry),
        Direction::Short => (sl - entry, entry - tp),
    };

    if risk <= RR_EPS || reward <= 0.0 {
        return None;
    }

    Some(reward / risk)
}

/// Signed RR of a mark/exit price against entry and stop.
///
/// Unlike [`compute_rr`] this may be negative (the trade is under water);
/// a degenerate risk yields 0.0, matching "stop already at entry".
pub fn rr_at_price(direction: Direction, entry: f64, sl: f64, price: f64) -> f64 {
    let risk = (entry - sl).abs();
    if risk <= RR_EPS {
        return 0.0;
    }
    match direction {
        Direction::Long => (price - entry) / risk,
        Direction::Short => (entry - price) / risk,
    }
}

/// Realized RR and PnL in USD for closing `fraction` of a position.
///
/// Risk capital is `size × |entry − sl| / entry`; fees are charged in
/// basis points on the closed slice. Returns (None, None) when the risk
/// distance is degenerate.
pub fn calc_pnl_usd(
    direction: Direction,
    entry: f64,
    sl: f64,
    close_price: f64,
    size_usd: f64,
    fees_bps: f64,
    fraction: f64,
) -> (Option<f64>, Option<f64>) {
    let risk = (entry - sl).abs();
    if risk <= RR_EPS || entry == 0.0 {
        return (None, None);
    }

    let rr = rr_at_price(direction, entry, sl, close_price);
    let size = size_usd * fraction.clamp(0.0, 1.0);
    let risk_usd = size * (risk / entry.abs());
    let fees = (fees_bps / 10_000.0) * size;

    (Some(rr), Some(rr * risk_usd - fees))
}

/// Classic floor-trader pivots computed from the previous bar.
#[derive(Debug, Clone, Copy)]
pub struct PivotLevels {
    pub p: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Pivots from the bar BEFORE the last one; None with fewer than two bars.
pub fn classic_pivots(bars: &[Bar]) -> Option<PivotLevels> {
    if bars.len() < 2 {
        return None;
    }

    let prev = &bars[bars.len() - 2];
    let (h, l, c) = (prev.high, prev.low, prev.close);
    let p = (h + l + c) / 3.0;

    Some(PivotLevels {
        p,
        r1: 2.0 * p - l,
        r2: p + (h - l),
        r3: h + 2.0 * (p - l),
        s1: 2.0 * p - h,
        s2: p - (h - l),
        s3: l - 2.0 * (h - p),
    })
}

/// Highest high and lowest low over the last `lookback` bars (last bar included).
pub fn swing_extremes(bars: &[Bar], lookback: usize) -> Option<(f64, f64)> {
    if bars.is_empty() || lookback == 0 {
        return None;
    }

    let lb = bars.len().min(lookback);
    let window = &bars[bars.len() - lb..];
    let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);

    Some((high, low))
}

/// A chosen take-profit level with its RR and the level it came from.
#[derive(Debug, Clone)]
pub struct TargetPick {
    pub price: f64,
    pub rr: f64,
    pub source: String,
}

/// Pick a take-profit from pivot / Bollinger / swing candidates.
///
/// Candidates are walked in order of proximity (R1, band edge, swing,
/// R2, R3; mirrored for SHORT), keeping only levels on the trade side of
/// entry. The first level whose RR lands inside [min_rr, max_rr] wins;
/// otherwise the best candidate is used with its RR capped at max_rr
/// (price re-projected along the direction); with no candidates at all,
/// a geometric target at exactly min_rr.
///
/// Returns None only when the entry-stop distance is degenerate.
pub fn pick_target(
    direction: Direction,
    entry: f64,
    sl: f64,
    pivots: Option<&PivotLevels>,
    bollinger: Option<(f64, f64, f64)>,
    swing: Option<(f64, f64)>,
    min_rr: f64,
    max_rr: f64,
) -> Option<TargetPick> {
    let dist = (entry - sl).abs();
    if dist <= RR_EPS {
        return None;
    }

    let mut candidates: Vec<(&str, f64)> = Vec::new();
    match direction {
        Direction::Long => {
            if let Some(piv) = pivots {
                candidates.push(("pivot:r1", piv.r1));
            }
            if let Some((_, _, upper)) = bollinger {
                candidates.push(("bb:upper", upper));
            }
            if let Some((high, _)) = swing {
                candidates.push(("swing:high", high));
            }
            if let Some(piv) = pivots {
                candidates.push(("pivot:r2", piv.r2));
                candidates.push(("pivot:r3", piv.r3));
            }
            candidates.retain(|&(_, price)| price > entry);
        }
        Direction::Short => {
            if let Some(piv) = pivots {
                candidates.push(("pivot:s1", piv.s1));
            }
            if let Some((lower, _, _)) = bollinger {
                candidates.push(("bb:lower", lower));
            }
            if let Some((_, low)) = swing {
                candidates.push(("swing:low", low));
            }
            if let Some(piv) = pivots {
                candidates.push(("pivot:s2", piv.s2));
                candidates.push(("pivot:s3", piv.s3));
            }
            candidates.retain(|&(_, price)| price < entry);
        }
    }

    let scored: Vec<(&str, f64, f64)> = candidates
        .into_iter()
        .filter_map(|(name, price)| {
            compute_rr(direction, entry, sl, price).map(|rr| (name, price, rr))
        })
        .collect();

    // Closest qualifying level first
    for &(name, price, rr) in &scored {
        if rr >= min_rr && rr <= max_rr {
            return Some(TargetPick {
                price,
                rr,
                source: name.to_string(),
            });
        }
    }

    // Best available, capped at max_rr
    if let Some(&(name, price, rr)) = scored
        .iter()
        .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
    {
        if rr > max_rr {
            let capped = match direction {
                Direction::Long => entry + max_rr * dist,
                Direction::Short => entry - max_rr * dist,
            };
            return Some(TargetPick {
                price: capped,
                rr: max_rr,
                source: name.to_string(),
            });
        }
        return Some(TargetPick {
            price,
            rr,
            source: name.to_string(),
        });
    }

    // Geometric fallback at exactly min_rr
    let price = match direction {
        Direction::Long => entry + min_rr * dist,
        Direction::Short => entry - min_rr * dist,
    };
    Some(TargetPick {
        price,
        rr: min_rr,
        source: "fallback:min_rr".to_string(),
    })
}
