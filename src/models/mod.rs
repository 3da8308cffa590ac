use serde::{Deserialize, Serialize};

/// One OHLCV bar. `ts` is the bar open time in unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trade direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" => Some(Direction::Long),
            "SHORT" => Some(Direction::Short),
            _ => None,
        }
    }
}

/// Signal row status. Monotonic: OPEN/SUGGESTED move to a terminal state
/// exactly once, never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalStatus {
    Open,
    Win,
    Loss,
    Closed,
    Suggested,
    Expired,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Open => "OPEN",
            SignalStatus::Win => "WIN",
            SignalStatus::Loss => "LOSS",
            SignalStatus::Closed => "CLOSED",
            SignalStatus::Suggested => "SUGGESTED",
            SignalStatus::Expired => "EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    Win,
    Loss,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::Win => "WIN",
            TradeStatus::Loss => "LOSS",
            TradeStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => Some(TradeStatus::Open),
            "WIN" => Some(TradeStatus::Win),
            "LOSS" => Some(TradeStatus::Loss),
            "CLOSED" => Some(TradeStatus::Closed),
            _ => None,
        }
    }
}

/// Why a trade row was closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Neutral,
    Reversed,
    Manual,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit => "tp",
            CloseReason::StopLoss => "sl",
            CloseReason::Neutral => "neutral",
            CloseReason::Reversed => "reversed",
            CloseReason::Manual => "manual",
        }
    }
}

/// What to do with an open trade once its directional thesis goes NEUTRAL.
/// Re-read from the settings store on every lifecycle pass so an operator
/// can switch it live.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NeutralMode {
    Close,
    Trail,
    Ignore,
}

impl NeutralMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NeutralMode::Close => "CLOSE",
            NeutralMode::Trail => "TRAIL",
            NeutralMode::Ignore => "IGNORE",
        }
    }

    /// Unknown values fall back to the given default.
    pub fn parse_or(s: &str, default: NeutralMode) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLOSE" => NeutralMode::Close,
            "TRAIL" => NeutralMode::Trail,
            "IGNORE" => NeutralMode::Ignore,
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_roundtrip() {
        assert_eq!(Direction::parse("long"), Some(Direction::Long));
        assert_eq!(Direction::parse("SHORT"), Some(Direction::Short));
        assert_eq!(Direction::parse("sideways"), None);
        assert_eq!(Direction::Long.as_str(), "LONG");
    }

    #[test]
    fn test_neutral_mode_fallback() {
        assert_eq!(
            NeutralMode::parse_or("close", NeutralMode::Trail),
            NeutralMode::Close
        );
        assert_eq!(
            NeutralMode::parse_or("whatever", NeutralMode::Trail),
            NeutralMode::Trail
        );
    }

    #[test]
    fn test_trade_status_parse() {
        assert_eq!(TradeStatus::parse("open"), Some(TradeStatus::Open));
        assert_eq!(TradeStatus::parse("WIN"), Some(TradeStatus::Win));
        assert_eq!(TradeStatus::parse("bogus"), None);
    }
}
