//! Named limit policies loaded from configuration.
//!
//! A rule gives a rate and either a named time unit or an explicit period in
//! seconds. Burst defaults to the rate.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::limit::Limit;
use crate::error::{RedrateError, Result};

/// A set of named limit policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LimitRules {
    rules: HashMap<String, LimitRule>,
}

/// A single limit rule as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitRule {
    /// Number of events allowed per period
    pub rate: u64,
    /// Named period
    #[serde(default)]
    pub unit: Option<TimeUnit>,
    /// Period length in seconds, when no unit is given
    #[serde(default)]
    pub period_secs: Option<f64>,
    /// Events admitted instantaneously; defaults to `rate`
    #[serde(default)]
    pub burst: Option<u64>,
}

/// Time unit for limit rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

impl LimitRule {
    /// Convert into a [`Limit`], validating the period.
    pub fn to_limit(&self) -> Result<Limit> {
        let period = match (self.unit, self.period_secs) {
            (Some(unit), None) => unit.duration(),
            (None, Some(secs)) => Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| {
                    RedrateError::Config(format!("period_secs must be positive, got {}", secs))
                })?,
            (Some(_), Some(_)) => {
                return Err(RedrateError::Config(
                    "specify either unit or period_secs, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(RedrateError::Config(
                    "a limit needs a unit or period_secs".to_string(),
                ))
            }
        };

        if self.rate == 0 {
            return Err(RedrateError::Config("rate must be positive".to_string()));
        }

        Ok(Limit::new(self.rate, period, self.burst.unwrap_or(self.rate)))
    }
}

impl LimitRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RedrateError::Config(format!("Failed to parse limit rules: {}", e)))
    }

    /// Add or replace a rule.
    pub fn insert(&mut self, name: impl Into<String>, rule: LimitRule) {
        self.rules.insert(name.into(), rule);
    }

    /// Get the raw rule registered under `name`.
    pub fn get(&self, name: &str) -> Option<&LimitRule> {
        self.rules.get(name)
    }

    /// Resolve the rule registered under `name` into a [`Limit`].
    pub fn limit(&self, name: &str) -> Result<Limit> {
        self.get(name)
            .ok_or_else(|| RedrateError::Config(format!("no limit named {:?}", name)))?
            .to_limit()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
login:
  rate: 5
  unit: minute
  burst: 10
search:
  rate: 100
  unit: second
export:
  rate: 3
  period_secs: 2.5
"#;
        let rules = LimitRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 3);

        let login = rules.limit("login").unwrap();
        assert_eq!(login, Limit::per_minute(5).with_burst(10));

        let search = rules.limit("search").unwrap();
        assert_eq!(search, Limit::per_second(100));

        let export = rules.limit("export").unwrap();
        assert_eq!(export.period, Duration::from_millis(2500));
        assert_eq!(export.burst, 3);
    }

    #[test]
    fn test_unknown_rule() {
        let rules = LimitRules::new();
        assert!(rules.is_empty());
        assert!(matches!(rules.limit("missing"), Err(RedrateError::Config(_))));
    }

    #[test]
    fn test_invalid_rules() {
        let both = LimitRule {
            rate: 1,
            unit: Some(TimeUnit::Second),
            period_secs: Some(1.0),
            burst: None,
        };
        assert!(both.to_limit().is_err());

        let neither = LimitRule {
            rate: 1,
            unit: None,
            period_secs: None,
            burst: None,
        };
        assert!(neither.to_limit().is_err());

        let zero_rate = LimitRule {
            rate: 0,
            unit: Some(TimeUnit::Hour),
            period_secs: None,
            burst: None,
        };
        assert!(zero_rate.to_limit().is_err());

        let negative = LimitRule {
            rate: 1,
            unit: None,
            period_secs: Some(-3.0),
            burst: None,
        };
        assert!(negative.to_limit().is_err());
    }

    #[test]
    fn test_insert_rule() {
        let mut rules = LimitRules::new();
        rules.insert(
            "daily",
            LimitRule {
                rate: 1000,
                unit: Some(TimeUnit::Day),
                period_secs: None,
                burst: Some(50),
            },
        );
        let limit = rules.limit("daily").unwrap();
        assert_eq!(limit.period, Duration::from_secs(86400));
        assert_eq!(limit.burst, 50);
    }

    #[test]
    fn test_time_unit_duration() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }
}
