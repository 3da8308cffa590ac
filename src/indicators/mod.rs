pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod snapshot;
pub mod vwap;

pub use adx::calculate_adx;
pub use atr::calculate_atr;
pub use bollinger::calculate_bollinger;
pub use macd::calculate_macd;
pub use moving_average::{calculate_ema, calculate_sma, ema_series};
pub use rsi::calculate_rsi;
pub use snapshot::{compute_snapshot, IndicatorParams, IndicatorSnapshot};
pub use vwap::{calculate_vwap, relative_volume};
