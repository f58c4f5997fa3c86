use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Every key accepted by [`DecisionCfg::from_map`] and [`DecisionCfg::from_json`].
pub const DECISION_KEYS: [&str; 11] = [
    "min_response_interval",
    "max_response_interval",
    "engagement_threshold",
    "engagement_high_threshold",
    "engagement_medium_threshold",
    "context_relevance_weight",
    "time_weight",
    "probability_weight",
    "wake_up_pattern",
    "min_sleep_time",
    "max_sleep_time",
];

/// Decision and timing parameters. Immutable once an agent is built.
///
/// Unknown keys are rejected by both loaders; missing keys keep the defaults
/// below. Every lower/upper pair is checked by [`DecisionCfg::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionCfg {
    // response timing (seconds)
    pub min_response_interval: u64,
    pub max_response_interval: u64,

    // engagement
    pub engagement_threshold: f32,
    pub engagement_high_threshold: u32,
    pub engagement_medium_threshold: u32,

    // decision weights
    pub context_relevance_weight: f32,
    pub time_weight: f32,
    pub probability_weight: f32,

    // sleep calculation (seconds)
    pub wake_up_pattern: String,
    pub min_sleep_time: u64,
    pub max_sleep_time: u64,
}

impl Default for DecisionCfg {
    fn default() -> Self {
        Self {
            min_response_interval: 30,
            max_response_interval: 600,
            engagement_threshold: 0.5,
            engagement_high_threshold: 10,
            engagement_medium_threshold: 3,
            context_relevance_weight: 0.4,
            time_weight: 0.3,
            probability_weight: 0.3,
            wake_up_pattern: "Check every 2-3 minutes when active".to_owned(),
            min_sleep_time: 30,
            max_sleep_time: 600,
        }
    }
}

impl DecisionCfg {
    /// Build from string key/value pairs, e.g. parsed `key=value` lines.
    pub fn from_map(m: &HashMap<String, String>) -> Result<Self, ConfigError> {
        if let Some(key) = m.keys().find(|k| !DECISION_KEYS.contains(&k.as_str())) {
            return Err(ConfigError::UnknownKey(key.clone()));
        }
        let d = Self::default();
        let cfg = Self {
            min_response_interval: get_or(m, "min_response_interval", d.min_response_interval)?,
            max_response_interval: get_or(m, "max_response_interval", d.max_response_interval)?,
            engagement_threshold: get_or(m, "engagement_threshold", d.engagement_threshold)?,
            engagement_high_threshold: get_or(m, "engagement_high_threshold", d.engagement_high_threshold)?,
            engagement_medium_threshold: get_or(m, "engagement_medium_threshold", d.engagement_medium_threshold)?,
            context_relevance_weight: get_or(m, "context_relevance_weight", d.context_relevance_weight)?,
            time_weight: get_or(m, "time_weight", d.time_weight)?,
            probability_weight: get_or(m, "probability_weight", d.probability_weight)?,
            wake_up_pattern: m.get("wake_up_pattern").cloned().unwrap_or(d.wake_up_pattern),
            min_sleep_time: get_or(m, "min_sleep_time", d.min_sleep_time)?,
            max_sleep_time: get_or(m, "max_sleep_time", d.max_sleep_time)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build from a JSON object such as `{"min_response_interval": 30, ...}`.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Build from an already parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let Some(object) = value.as_object() else {
            return Err(ConfigError::Malformed("expected a JSON object".into()));
        };
        if let Some(key) = object.keys().find(|k| !DECISION_KEYS.contains(&k.as_str())) {
            return Err(ConfigError::UnknownKey(key.clone()));
        }
        for (key, field) in object {
            if let Err(e) = check_field(key, field) {
                return Err(ConfigError::invalid(key, e.to_string()));
            }
        }
        let cfg: Self = serde_json::from_value(value).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check ranges and lower ≤ upper for every bound pair.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.engagement_threshold) {
            return Err(ConfigError::invalid(
                "engagement_threshold",
                format!("{} is outside [0, 1]", self.engagement_threshold),
            ));
        }
        for (key, weight) in [
            ("context_relevance_weight", self.context_relevance_weight),
            ("time_weight", self.time_weight),
            ("probability_weight", self.probability_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::invalid(key, format!("{weight} is not a non-negative number")));
            }
        }
        if self.min_response_interval > self.max_response_interval {
            return Err(ConfigError::inverted(
                "min_response_interval",
                self.min_response_interval,
                "max_response_interval",
                self.max_response_interval,
            ));
        }
        if self.engagement_medium_threshold > self.engagement_high_threshold {
            return Err(ConfigError::inverted(
                "engagement_medium_threshold",
                self.engagement_medium_threshold,
                "engagement_high_threshold",
                self.engagement_high_threshold,
            ));
        }
        if self.min_sleep_time > self.max_sleep_time {
            return Err(ConfigError::inverted(
                "min_sleep_time",
                self.min_sleep_time,
                "max_sleep_time",
                self.max_sleep_time,
            ));
        }
        Ok(())
    }

    /// Sum of the three decision weights.
    pub fn weight_sum(&self) -> f32 {
        self.context_relevance_weight + self.time_weight + self.probability_weight
    }
}

/// Per-agent settings around the decision parameters.
#[derive(Debug, Clone)]
pub struct AgentCfg {
    pub system_prompt: String,
    pub decision: DecisionCfg,
    /// Engagement window; `None` uses `max_response_interval`.
    pub engagement_window_secs: Option<u64>,
    /// Generation timeout; 0 waits for the provider indefinitely.
    pub response_timeout_secs: u64,
    /// Conversation entries kept for response context.
    pub max_history: usize,
}

impl Default for AgentCfg {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful AI assistant.".to_owned(),
            decision: DecisionCfg::default(),
            engagement_window_secs: None,
            response_timeout_secs: 60,
            max_history: 50,
        }
    }
}

impl AgentCfg {
    pub fn new(system_prompt: impl Into<String>, decision: DecisionCfg) -> Self {
        Self { system_prompt: system_prompt.into(), decision, ..Self::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decision.validate()?;
        if self.max_history == 0 {
            return Err(ConfigError::invalid("max_history", "must keep at least one entry"));
        }
        Ok(())
    }

    pub fn engagement_window(&self) -> Duration {
        Duration::from_secs(self.engagement_window_secs.unwrap_or(self.decision.max_response_interval))
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_timeout_secs > 0).then(|| Duration::from_secs(self.response_timeout_secs))
    }
}

fn get_or<T>(map: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match map.get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::invalid(key, format!("{raw:?}: {e}"))),
        None => Ok(default),
    }
}

/// Deserialize a single field through a one-key object so type errors name the key.
fn check_field(key: &str, field: &serde_json::Value) -> Result<(), serde_json::Error> {
    let mut single = serde_json::Map::new();
    single.insert(key.to_owned(), field.clone());
    serde_json::from_value::<DecisionCfg>(serde_json::Value::Object(single)).map(|_| ())
}
