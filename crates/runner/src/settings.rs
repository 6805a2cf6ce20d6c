//! Paper-run settings
//!
//! The engine configuration and the runner's own keys share one JSON
//! document: the engine ignores `paper` and `audit_path`, the runner reads
//! only those.

use meridian_strategy::{ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audit::AuditError;
use crate::paper::PaperMarketConfig;

const DEFAULT_AUDIT_PATH: &str = "meridian-audit.jsonl";

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RunnerResult<T> = std::result::Result<T, RunnerError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub paper: PaperMarketConfig,
    pub audit_path: Option<PathBuf>,
}

impl RunnerSettings {
    /// Parse both halves of a config document
    pub fn from_json(json: &str) -> RunnerResult<(EngineConfig, Self)> {
        let engine = EngineConfig::from_json(json)?;
        let settings: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        let settings = settings.for_engine(&engine.symbols);
        Ok((engine, settings))
    }

    pub fn from_file(path: impl AsRef<Path>) -> RunnerResult<(EngineConfig, Self)> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Defaults for a run without a config file
    pub fn defaults() -> (EngineConfig, Self) {
        let engine = EngineConfig::default();
        let settings = Self::default().for_engine(&engine.symbols);
        (engine, settings)
    }

    fn for_engine(mut self, symbols: &[String]) -> Self {
        self.paper = self.paper.with_symbols(symbols);
        self
    }

    pub fn audit_path(&self) -> &Path {
        self.audit_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_AUDIT_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_one_document_feeds_both() {
        let json = r#"{
            "symbols": ["SOL_USDC_PERP", "ETH_USDC_PERP"],
            "mode": "surf",
            "paper": {
                "seed": 9,
                "markets": [
                    { "symbol": "ETH_USDC_PERP", "mid": "3000", "tick_size": "0.1", "step_size": "0.01" }
                ]
            },
            "audit_path": "/tmp/run.jsonl"
        }"#;
        let (engine, settings) = RunnerSettings::from_json(json).unwrap();
        assert_eq!(engine.symbols.len(), 2);
        assert_eq!(settings.paper.seed, Some(9));
        assert_eq!(settings.audit_path(), Path::new("/tmp/run.jsonl"));

        // Configured market kept, missing one filled in
        assert_eq!(settings.paper.markets.len(), 2);
        assert_eq!(settings.paper.markets[0].mid, dec!(3000));
        assert_eq!(settings.paper.markets[1].symbol, "SOL_USDC_PERP");
    }

    #[test]
    fn test_defaults_cover_default_symbols() {
        let (engine, settings) = RunnerSettings::defaults();
        assert_eq!(settings.paper.markets.len(), engine.symbols.len());
        assert_eq!(settings.audit_path(), Path::new(DEFAULT_AUDIT_PATH));
    }

    #[test]
    fn test_invalid_engine_config_rejected() {
        let result = RunnerSettings::from_json(r#"{ "symbols": [] }"#);
        assert!(matches!(result, Err(RunnerError::Config(ConfigError::Invalid(_)))));
    }
}
