//! Process configuration.
//!
//! Read from the environment exactly once at startup into an explicit
//! value that is passed down by reference; core logic never reads ambient
//! globals. Runtime-tunable knobs (RR floor, neutral mode, partial-TP
//! toggle) live in the settings table instead and are re-read per pass.

use crate::collector::CollectorConfig;
use crate::gate::{GateConfig, TrendFilter};
use crate::indicators::IndicatorParams;
use crate::lifecycle::LifecycleConfig;
use crate::models::NeutralMode;
use crate::pipeline::PipelineConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub scan_interval_secs: u64,
    pub manage_interval_secs: u64,
    pub collector: CollectorConfig,
    pub pipeline: PipelineConfig,
    pub lifecycle: LifecycleConfig,
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let gate = GateConfig {
            atr_min: env_f64("ATR_MIN", 0.004),
            rsi_long_min: env_f64("RSI_LONG_MIN", 50.0),
            rsi_short_max: env_f64("RSI_SHORT_MAX", 50.0),
            adx_min: env_f64("ADX_MIN", 18.0),
            bbw_min: env_f64("BBW_MIN", 0.015),
            vol_rel_min: env_f64("VOL_REL_MIN", 1.2),
            vwap_dist_min: env_f64("VWAP_DIST_MIN", 0.0015),
            ema_sep_min: env_f64("EMA_SEP_MIN", 1e-4),
            trend_filter: TrendFilter::parse_or_default(&env_str(
                "TREND_FILTER",
                "ema50_over_ema200",
            )),
        };

        let symbols: Vec<String> = env_str(
            "MONITORED_SYMBOLS",
            "BTCUSDT,ETHUSDT,BNBUSDT,SOLUSDT,XRPUSDT,LTCUSDT,XLMUSDT,ADAUSDT",
        )
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

        let min_rr = env_f64("AUTOPOST_MIN_RR", 1.5);

        let collector = CollectorConfig {
            symbols,
            timeframe: env_str("ANALYZE_TIMEFRAME", "1h").to_lowercase(),
            bars: env_usize("ANALYZE_BARS", 200),
            min_bars: env_usize("ANALYZE_MIN_BARS", 60),
            stop_atr_mult: env_f64("STOP_ATR_MULT", 1.5),
            min_rr,
            max_rr: env_f64("AUTOPOST_RR_MAX", 4.0),
            swing_lookback: env_usize("SWING_LOOKBACK", 20),
            indicators: IndicatorParams::default(),
            gate,
        };

        let pipeline = PipelineConfig {
            user_id: env_str("AUTOPOST_USER_ID", "default"),
            chat_id: env_str("AUTOPOST_CHAT_ID", "default"),
            source: "autopost".to_string(),
            dedup_window_secs: env_i64("DEDUP_WINDOW_SEC", 90),
            gate_enabled: env_bool("INDICATOR_GATE_ENABLED", true),
            gate_min_pass: env_u64("GATE_MIN_PASS", 8) as u32,
            min_rr,
            size_usd: env_f64("SIM_USD_PER_TRADE", 100.0),
            fees_bps: env_i64("FEES_BPS", 10),
            open_trades: env_bool("AUTOPOST_OPEN_TRADES", true),
        };

        let lifecycle = LifecycleConfig {
            move_be_at_rr: env_f64("MOVE_BE_AT_RR", 1.0),
            trail_at_rr: env_f64("TRAIL_AT_RR", 1.5),
            atr_sl_mult: env_f64("ATR_SL_MULT", 2.0),
            partial_tp_enabled: env_bool("PARTIAL_TP_ENABLED", true),
            partial_tp_pct: env_f64("PARTIAL_TP_PCT", 0.5),
            neutral_mode: NeutralMode::parse_or(
                &env_str("NEUTRAL_MODE", "TRAIL"),
                NeutralMode::Trail,
            ),
            signal_ttl_secs: env_i64("SIGNAL_TTL_SEC", 86_400),
        };

        Self {
            db_path: env_str("DB_PATH", "storage/bot.db"),
            scan_interval_secs: env_u64("SCAN_INTERVAL_SEC", 300),
            manage_interval_secs: env_u64("MANAGE_INTERVAL_SEC", 90),
            collector,
            pipeline,
            lifecycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_env();

        assert_eq!(config.scan_interval_secs, 300);
        assert_eq!(config.collector.timeframe, "1h");
        assert!(!config.collector.symbols.is_empty());
        assert_eq!(config.pipeline.dedup_window_secs, 90);
        assert_eq!(config.pipeline.gate_min_pass, 8);
        assert_eq!(config.lifecycle.neutral_mode, NeutralMode::Trail);
    }
}
