use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dyntree_store::MAX_BATCH_WRITE_ITEMS;

use crate::error::{Result, TreeError};

/// Default reserved delimiter: U+00A6 BROKEN BAR.
///
/// Rare in real data, so it rarely needs to be rejected from keys.
pub const DEFAULT_DELIMITER: &str = "\u{a6}";

/// Default table name used when none is configured.
pub const DEFAULT_TABLE_NAME: &str = "dyntree";

/// Default number of links `fetch` follows before giving up.
pub const DEFAULT_MAX_LINK_HOPS: usize = 16;

/// Configuration for a [`Tree`](crate::Tree).
///
/// Set once at construction and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Table holding every row of the tree.
    pub table_name: String,
    /// Reserved delimiter, exactly one character. May not appear in path
    /// components or start an attribute name. Empty means
    /// [`DEFAULT_DELIMITER`].
    pub delimiter: String,
    /// Requests per batch write call (1..=25).
    pub max_batch_items: usize,
    /// Links followed by a single fetch before it fails.
    pub max_link_hops: usize,
    /// Backoff between resubmissions of unprocessed batch requests.
    pub retry: RetryPolicy,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            max_batch_items: MAX_BATCH_WRITE_ITEMS,
            max_link_hops: DEFAULT_MAX_LINK_HOPS,
            retry: RetryPolicy::default(),
        }
    }
}

impl TreeConfig {
    /// Default configuration for the named table.
    pub fn for_table(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    /// Replace the delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| TreeError::InvalidConfig(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TreeError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check limits and fill in the default delimiter.
    pub fn validated(mut self) -> Result<Self> {
        if self.delimiter.is_empty() {
            self.delimiter = DEFAULT_DELIMITER.to_string();
        }
        if self.delimiter.chars().count() != 1 {
            return Err(TreeError::InvalidConfig(format!(
                "delimiter must be a single character, got {:?}",
                self.delimiter
            )));
        }
        if self.table_name.is_empty() {
            return Err(TreeError::InvalidConfig("table_name must not be empty".into()));
        }
        if self.max_batch_items == 0 || self.max_batch_items > MAX_BATCH_WRITE_ITEMS {
            return Err(TreeError::InvalidConfig(format!(
                "max_batch_items must be between 1 and {MAX_BATCH_WRITE_ITEMS}, got {}",
                self.max_batch_items
            )));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(TreeError::InvalidConfig(format!(
                "retry.multiplier must be a finite number of at least 1.0, got {}",
                self.retry.multiplier
            )));
        }
        Ok(self)
    }
}

/// Bounded exponential backoff for unprocessed batch requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first resubmission.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Resubmissions allowed per chunk; `None` retries until drained.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 10,
            max_backoff_ms: 1000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Resubmit immediately, without sleeping.
    pub fn immediate() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Default::default()
        }
    }

    pub(crate) fn backoff(&self) -> Backoff {
        Backoff {
            current: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.multiplier,
        }
    }
}

/// Exponential delay sequence with ±25% jitter.
pub(crate) struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self.scaled(self.current, self.multiplier);
        if delay.is_zero() {
            return delay;
        }
        let jitter = rand::random::<f64>() * 0.5 - 0.25;
        self.scaled(delay, 1.0 + jitter)
    }

    /// `base * factor`, saturating at the cap when the product overflows.
    fn scaled(&self, base: Duration, factor: f64) -> Duration {
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}
