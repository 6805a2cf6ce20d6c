//! Engine configuration
//!
//! One serde struct parameterizes every quoting mode. All numeric defaults
//! are empirical starting points and are expected to be tuned per venue.

use chrono::Duration;
use meridian_core::{FeeSchedule, PositionSide, Symbol, Timeframe};
use meridian_gateway::CacheTtls;
use meridian_risk_manager::CapitalGuardConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::signal::SignalConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Quoting mode; all modes run through the same engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotingMode {
    /// Two-sided quoting around the touch
    #[default]
    Straddle,
    /// One side, with the trend
    Surf,
    /// One asset at a time, all usable margin, consensus-gated
    Compound,
}

impl QuotingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotingMode::Straddle => "straddle",
            QuotingMode::Surf => "surf",
            QuotingMode::Compound => "compound",
        }
    }
}

impl std::fmt::Display for QuotingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Auto,
    Long,
    Short,
}

impl Direction {
    pub fn forced(&self) -> Option<PositionSide> {
        match self {
            Direction::Auto => None,
            Direction::Long => Some(PositionSide::Long),
            Direction::Short => Some(PositionSide::Short),
        }
    }
}

/// What to do when the protective stop cannot be placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Arm on the first managed tick; exhausting retries closes at market
    #[default]
    Mandatory,
    /// Arm once the dwell unlock allows it; exhausting retries is logged
    BestEffort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub leverage: Decimal,
    /// Margin committed per entry, in quote currency
    pub margin_per_trade: Decimal,
    /// Size from all usable capital instead of `margin_per_trade`
    pub use_all_available: bool,
    /// Share of usable capital taken when sizing from all of it
    pub all_in_fraction: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            leverage: dec!(10),
            margin_per_trade: dec!(200),
            use_all_available: false,
            all_in_fraction: dec!(0.95),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Base |OBI| required for an entry; learning moves the per-symbol copy
    pub obi: Decimal,
    /// Resting entries are cancelled once |OBI| passes this against them
    pub reversal_cancel: Decimal,
    /// Positions are closed at market once |OBI| passes this against them
    pub panic_close: Decimal,
    /// |OBI| at which surf enters without trend agreement and leads the book
    pub sniper: Decimal,
    /// Straddle turns directional above max(2 × threshold, this)
    pub strong_flow_floor: Decimal,
    /// Threshold added per consecutive loss
    pub loss_streak_step: Decimal,
    pub loss_streak_cap: Decimal,
    /// Compound aborts an entry when OBI flipped past this
    pub compound_flip_abort: Decimal,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            obi: dec!(0.25),
            reversal_cancel: dec!(0.3),
            panic_close: dec!(0.5),
            sniper: dec!(0.7),
            strong_flow_floor: dec!(0.6),
            loss_streak_step: dec!(0.05),
            loss_streak_cap: dec!(0.2),
            compound_flip_abort: dec!(0.1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub probe_fraction: Decimal,
    pub compound_probe_fraction: Decimal,
    /// Filled share of target that counts as a full entry
    pub full_fill_ratio: Decimal,
    /// Confirmation is skipped once spread widened past this multiple of the probe-time spread
    pub spread_widening_tolerance: Decimal,
    /// Enforce `min_entry_interval_secs` between entries
    pub eco_mode: bool,
    pub min_entry_interval_secs: u64,
    /// Micro-range window compared against the stop distance
    pub micro_range_secs: u64,
    pub short_range_secs: u64,
    /// Micro range must cover this share of the safe-stop distance
    pub reversion_ratio: Decimal,
    pub short_reversion_ratio: Decimal,
    /// Safe-stop distance must be at least this many spreads
    pub min_stop_spreads: Decimal,
    /// Sniper entries only require the spread to stay below this
    pub sniper_max_spread: Decimal,
    /// Above this spread the book is treated as broken and priced off the last close
    pub gap_fill_spread: Decimal,
    /// Straddle pushes the side against the flow this many spreads away
    pub straddle_skew_spreads: Decimal,
    /// |OBI| that triggers straddle skew
    pub skew_obi: Decimal,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            probe_fraction: dec!(0.35),
            compound_probe_fraction: dec!(0.50),
            full_fill_ratio: dec!(0.95),
            spread_widening_tolerance: dec!(1.2),
            eco_mode: false,
            min_entry_interval_secs: 15,
            micro_range_secs: 10,
            short_range_secs: 6,
            reversion_ratio: dec!(0.6),
            short_reversion_ratio: dec!(0.3),
            min_stop_spreads: dec!(2),
            sniper_max_spread: dec!(0.005),
            gap_fill_spread: dec!(0.01),
            straddle_skew_spreads: dec!(2),
            skew_obi: dec!(0.1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    /// Dollar target per trade; learning moves the per-symbol copy
    pub profit_usd: Decimal,
    /// Dollar risk per trade; learning moves the per-symbol copy
    pub risk_usd: Decimal,

    // Target
    pub min_target: Decimal,
    pub target_atr_multiple: Decimal,
    /// Noise buffer added to round-trip fees: max(atr × this, floor)
    pub fee_buffer_atr_multiple: Decimal,
    pub fee_buffer_floor: Decimal,
    pub loss_streak_target_shrink: Decimal,

    // Stop distance
    pub stop_atr_multiple: Decimal,
    pub stop_floor: Decimal,
    pub stop_cap: Decimal,
    pub stop_without_atr: Decimal,
    pub compound_stop_atr_multiple: Decimal,
    pub compound_stop_floor: Decimal,
    pub compound_stop_without_atr: Decimal,
    pub strong_flow_obi: Decimal,
    pub strong_flow_tighten: Decimal,
    pub strong_flow_stop_floor: Decimal,
    /// The safe-stop zone may widen a strong-flow stop up to this
    pub safe_stop_widen_cap: Decimal,

    // Stop ladder
    pub first_wave_atr_multiple: Decimal,
    pub first_wave_floor: Decimal,
    pub first_wave_without_atr: Decimal,
    pub lock_trigger: Decimal,
    /// Share of the open gain a lock-stage stop keeps
    pub lock_fraction: Decimal,
    /// |OBI| below which flow no longer supports the position
    pub flow_exhausted_obi: Decimal,

    // Immediate exit
    pub smart_exit_surf: Decimal,
    pub smart_exit_scalp: Decimal,
    pub smart_exit_buffer: Decimal,
    pub smart_exit_fee_margin: Decimal,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            profit_usd: dec!(5),
            risk_usd: dec!(2),
            min_target: dec!(0.0005),
            target_atr_multiple: dec!(1.2),
            fee_buffer_atr_multiple: dec!(0.5),
            fee_buffer_floor: dec!(0.0005),
            loss_streak_target_shrink: dec!(0.95),
            stop_atr_multiple: dec!(3.5),
            stop_floor: dec!(0.015),
            stop_cap: dec!(0.06),
            stop_without_atr: dec!(0.04),
            compound_stop_atr_multiple: dec!(4),
            compound_stop_floor: dec!(0.02),
            compound_stop_without_atr: dec!(0.025),
            strong_flow_obi: dec!(0.5),
            strong_flow_tighten: dec!(0.8),
            strong_flow_stop_floor: dec!(0.01),
            safe_stop_widen_cap: dec!(0.05),
            first_wave_atr_multiple: dec!(1.5),
            first_wave_floor: dec!(0.003),
            first_wave_without_atr: dec!(0.004),
            lock_trigger: dec!(0.01),
            lock_fraction: dec!(0.5),
            flow_exhausted_obi: dec!(0.05),
            smart_exit_surf: dec!(0.008),
            smart_exit_scalp: dec!(0.0015),
            smart_exit_buffer: dec!(0.001),
            smart_exit_fee_margin: dec!(0.0005),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    pub policy: StopPolicy,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    /// Backoff multiple applied once attempts are exhausted
    pub exhausted_backoff_multiple: u32,
    /// Dwell before a stop may be (re)armed, unless flow reversed
    pub dwell_secs: u64,
    /// Dwell per asset, matched as a symbol prefix
    pub asset_dwell_secs: BTreeMap<String, u64>,
    /// |OBI| against the position that unlocks the stop early
    pub unlock_obi: Decimal,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            policy: StopPolicy::Mandatory,
            max_attempts: 3,
            backoff_ms: 1_000,
            exhausted_backoff_multiple: 3,
            dwell_secs: 10,
            asset_dwell_secs: BTreeMap::from([("BTC".to_string(), 12), ("ETH".to_string(), 15)]),
            unlock_obi: dec!(0.1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub post_exit_secs: u64,
    pub compound_post_exit_secs: u64,
    /// Consecutive losses that trigger the zero-loss pause
    pub zero_loss_streak: u32,
    pub zero_loss_pause_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            post_exit_secs: 300,
            compound_post_exit_secs: 30,
            zero_loss_streak: 2,
            zero_loss_pause_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub enabled: bool,
    /// Recompute after this many closed trades...
    pub batch_trades: u32,
    /// ...or this long since the last recompute
    pub batch_secs: u64,
    /// Results kept per symbol
    pub window: usize,
    /// Fewer results than this resets learned values to the base config
    pub min_results: usize,
    pub low_win_rate: Decimal,
    pub high_win_rate: Decimal,
    pub obi_raise: Decimal,
    pub obi_relax: Decimal,
    pub min_obi: Decimal,
    pub max_obi: Decimal,
    pub profit_step_usd: Decimal,
    pub min_profit_usd: Decimal,
    pub max_profit_usd: Decimal,
    pub risk_shrink: Decimal,
    pub min_risk_usd: Decimal,
    pub max_risk_usd: Decimal,
    pub interval_grow: Decimal,
    pub interval_shrink: Decimal,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_trades: 5,
            batch_secs: 600,
            window: 12,
            min_results: 4,
            low_win_rate: dec!(0.4),
            high_win_rate: dec!(0.6),
            obi_raise: dec!(0.1),
            obi_relax: dec!(0.05),
            min_obi: dec!(0.2),
            max_obi: dec!(0.6),
            profit_step_usd: dec!(1),
            min_profit_usd: dec!(5),
            max_profit_usd: dec!(50),
            risk_shrink: dec!(0.9),
            min_risk_usd: dec!(1),
            max_risk_usd: dec!(2),
            interval_grow: dec!(2),
            interval_shrink: dec!(0.8),
            min_interval_secs: 5,
            max_interval_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub timeframe: Timeframe,
    pub ema_period: usize,
    /// Reference symbol for the market pulse; the first symbol when unset
    pub pulse_symbol: Option<Symbol>,
    pub pulse_timeframe: Timeframe,
    pub pulse_ema_period: usize,
    /// Compound regime check: candles inspected and minimum win rate
    pub regime_candles: usize,
    pub regime_min_win_rate: Decimal,
    /// Compound consensus
    pub consensus_min_aligned: usize,
    pub consensus_obi: Decimal,
    pub consensus_min_range: Decimal,
    pub consensus_max_atr: Decimal,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::M1,
            ema_period: 50,
            pulse_symbol: None,
            pulse_timeframe: Timeframe::M15,
            pulse_ema_period: 20,
            regime_candles: 60,
            regime_min_win_rate: dec!(0.4),
            consensus_min_aligned: 2,
            consensus_obi: dec!(0.4),
            consensus_min_range: dec!(0.0005),
            consensus_max_atr: dec!(0.02),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    pub timeframe: Timeframe,
    pub period: usize,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::M5,
            period: 14,
        }
    }
}

/// Per-symbol overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolProfile {
    pub enabled: bool,
    pub leverage: Option<Decimal>,
    pub margin: Option<Decimal>,
    /// Floor under the learned OBI threshold
    pub min_obi: Option<Decimal>,
    pub stop_dwell_secs: Option<u64>,
}

impl Default for SymbolProfile {
    fn default() -> Self {
        Self {
            enabled: true,
            leverage: None,
            margin: None,
            min_obi: None,
            stop_dwell_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub symbols: Vec<Symbol>,
    pub mode: QuotingMode,
    pub direction: Direction,
    /// Positions are only ever closed by their stop (compound always behaves so)
    pub never_panic_close: bool,
    pub sizing: SizingConfig,
    pub thresholds: ThresholdConfig,
    pub entry: EntryConfig,
    pub exit: ExitConfig,
    pub stop: StopConfig,
    pub cooldown: CooldownConfig,
    pub learning: LearningConfig,
    pub trend: TrendConfig,
    pub volatility: VolatilityConfig,
    pub signal: SignalConfig,
    pub fees: FeeSchedule,
    pub cache: CacheTtls,
    pub capital: CapitalGuardConfig,
    pub profiles: HashMap<Symbol, SymbolProfile>,
    pub tick_interval_ms: u64,
    /// Cancel every open order of the configured symbols before the first tick
    pub reset_orders_on_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC_USDC_PERP".to_string()],
            mode: QuotingMode::Straddle,
            direction: Direction::Auto,
            never_panic_close: false,
            sizing: SizingConfig::default(),
            thresholds: ThresholdConfig::default(),
            entry: EntryConfig::default(),
            exit: ExitConfig::default(),
            stop: StopConfig::default(),
            cooldown: CooldownConfig::default(),
            learning: LearningConfig::default(),
            trend: TrendConfig::default(),
            volatility: VolatilityConfig::default(),
            signal: SignalConfig::default(),
            fees: FeeSchedule::default(),
            cache: CacheTtls::default(),
            capital: CapitalGuardConfig::default(),
            profiles: HashMap::new(),
            tick_interval_ms: 1_000,
            reset_orders_on_start: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.symbols.is_empty() {
            return invalid("no symbols configured".into());
        }
        if self.sizing.leverage <= Decimal::ZERO {
            return invalid(format!("leverage must be positive, got {}", self.sizing.leverage));
        }
        if let Some((symbol, _)) = self
            .profiles
            .iter()
            .find(|(_, p)| p.leverage.is_some_and(|l| l <= Decimal::ZERO))
        {
            return invalid(format!("profile {} has non-positive leverage", symbol));
        }
        let ratio = self.capital.reserve_ratio;
        if ratio < Decimal::ZERO || ratio >= Decimal::ONE {
            return invalid(format!("reserve ratio {} outside [0, 1)", ratio));
        }
        for (name, fraction) in [
            ("probe_fraction", self.entry.probe_fraction),
            ("compound_probe_fraction", self.entry.compound_probe_fraction),
        ] {
            if fraction <= Decimal::ZERO || fraction > Decimal::ONE {
                return invalid(format!("{} {} outside (0, 1]", name, fraction));
            }
        }
        let learning = &self.learning;
        if learning.min_obi > learning.max_obi
            || learning.min_profit_usd > learning.max_profit_usd
            || learning.min_risk_usd > learning.max_risk_usd
            || learning.min_interval_secs > learning.max_interval_secs
        {
            return invalid("learning bounds have min > max".into());
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick interval must be positive".into());
        }
        if self.cache.candles_ms < self.tick_interval_ms.saturating_mul(60) {
            return invalid(format!(
                "volatility cache ttl {}ms shorter than 60 ticks of {}ms",
                self.cache.candles_ms, self.tick_interval_ms
            ));
        }
        Ok(())
    }

    pub fn profile(&self, symbol: &str) -> SymbolProfile {
        self.profiles.get(symbol).cloned().unwrap_or_default()
    }

    pub fn leverage_for(&self, symbol: &str) -> Decimal {
        self.profiles
            .get(symbol)
            .and_then(|p| p.leverage)
            .unwrap_or(self.sizing.leverage)
    }

    pub fn margin_for(&self, symbol: &str) -> Decimal {
        self.profiles
            .get(symbol)
            .and_then(|p| p.margin)
            .unwrap_or(self.sizing.margin_per_trade)
    }

    /// Dwell before a stop may be armed: profile, then asset prefix, then default
    pub fn stop_dwell(&self, symbol: &str) -> Duration {
        let secs = self
            .profiles
            .get(symbol)
            .and_then(|p| p.stop_dwell_secs)
            .or_else(|| {
                self.stop
                    .asset_dwell_secs
                    .iter()
                    .find(|(asset, _)| symbol.starts_with(asset.as_str()))
                    .map(|(_, secs)| *secs)
            })
            .unwrap_or(self.stop.dwell_secs);
        seconds(secs)
    }

    pub fn post_exit_cooldown(&self) -> Duration {
        match self.mode {
            QuotingMode::Compound => seconds(self.cooldown.compound_post_exit_secs),
            _ => seconds(self.cooldown.post_exit_secs),
        }
    }

    /// Compound never closes on flow alone
    pub fn closes_on_reversal(&self) -> bool {
        !self.never_panic_close && self.mode != QuotingMode::Compound
    }

    pub fn pulse_symbol(&self) -> Option<&str> {
        self.trend
            .pulse_symbol
            .as_deref()
            .or_else(|| self.symbols.first().map(String::as_str))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.tick_interval_ms).unwrap_or(i64::MAX))
    }
}

pub(crate) fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}
