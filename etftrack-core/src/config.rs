//! Tracker configuration, loaded from TOML.
//!
//! ```toml
//! data_dir = "data"
//! max_backups = 30
//! max_concurrency = 10
//! log_level = "info"
//!
//! [fetch]
//! request_timeout_secs = 10
//! max_attempts = 3
//! retry_delay_ms = 2000
//! politeness_delay_ms = 500
//! memo_capacity = 32
//!
//! [[instruments]]
//! code = "0050"
//! name = "Yuanta Taiwan Top 50"
//! start_date = "2023-01-01"
//! ```

use crate::data::twse::FetchPolicy;
use crate::data::{DataError, FetchRequest};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One tracked instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    /// First day of history fetched by `init`.
    pub start_date: NaiveDate,
}

/// Remote fetch tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub politeness_delay_ms: u64,
    pub memo_capacity: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            max_attempts: 3,
            retry_delay_ms: 2000,
            politeness_delay_ms: 500,
            memo_capacity: crate::data::memo::DEFAULT_CAPACITY,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub data_dir: PathBuf,
    pub max_backups: usize,
    pub max_concurrency: usize,
    pub log_level: String,
    pub fetch: FetchConfig,
    pub instruments: Vec<InstrumentConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_backups: 30,
            max_concurrency: 10,
            log_level: "info".into(),
            fetch: FetchConfig::default(),
            instruments: Vec::new(),
        }
    }
}

impl TrackerConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration string.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        let config: Self =
            toml::from_str(content).map_err(|e| DataError::Config(format!("parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.max_concurrency == 0 {
            return Err(DataError::Config("max_concurrency must be at least 1".into()));
        }
        if self.max_backups == 0 {
            return Err(DataError::Config("max_backups must be at least 1".into()));
        }
        if self.fetch.max_attempts == 0 {
            return Err(DataError::Config("fetch.max_attempts must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for inst in &self.instruments {
            let code = inst.code.trim();
            if code.is_empty() {
                return Err(DataError::Config("instrument code must not be empty".into()));
            }
            if !seen.insert(code) {
                return Err(DataError::Config(format!("duplicate instrument code '{code}'")));
            }
        }
        Ok(())
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_attempts: self.fetch.max_attempts,
            retry_delay: Duration::from_millis(self.fetch.retry_delay_ms),
            politeness_delay: Duration::from_millis(self.fetch.politeness_delay_ms),
            request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
        }
    }

    pub fn codes(&self) -> Vec<&str> {
        self.instruments.iter().map(|i| i.code.as_str()).collect()
    }

    /// Requests for a full history fetch from each configured start date.
    pub fn history_requests(&self) -> Vec<FetchRequest> {
        self.instruments
            .iter()
            .map(|i| FetchRequest::new(i.code.clone(), i.start_date))
            .collect()
    }

    /// Requests for a daily update starting at `day`.
    pub fn update_requests(&self, day: NaiveDate) -> Vec<FetchRequest> {
        self.instruments
            .iter()
            .map(|i| FetchRequest::new(i.code.clone(), day))
            .collect()
    }

    pub fn find(&self, code: &str) -> Option<&InstrumentConfig> {
        self.instruments.iter().find(|i| i.code == code)
    }
}
