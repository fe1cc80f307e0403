//! Configuration loading and validation.
//!
//! `courier.yml` is parsed into [`CourierConfig`], where every field has a
//! default. [`CourierConfig::validate`] is the only way to obtain the
//! immutable [`SessionSettings`] a session runs with; anything that is wrong
//! with the file fails there, once, before the first record is touched.

use crate::budget::SendBudget;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierConfig {
    /// CSV roster with a header row.
    #[serde(default = "default_roster_file")]
    pub roster_file: PathBuf,

    /// Column holding each record's numeric id.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// File containing the message template.
    #[serde(default = "default_message_file")]
    pub message_file: PathBuf,

    /// Optional subject template.
    #[serde(default)]
    pub subject: Option<String>,

    /// Optional target template (for example a profile URL) handed to the submitter.
    #[serde(default)]
    pub target: Option<String>,

    /// Messages to send before stopping; `-1` is unbounded.
    #[serde(default = "default_max_messages")]
    pub max_messages: i64,

    /// Running time before stopping; `-1` is unbounded.
    #[serde(default = "default_max_time")]
    pub max_time: TimeLimit,

    /// Minimum seconds between attempts.
    #[serde(default = "default_min_delay")]
    pub min_delay: f64,

    /// Extra random seconds added on top of `min_delay`.
    #[serde(default = "default_random_delay")]
    pub random_delay: f64,

    /// Attempts per record, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds a single submission may take.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    /// Records between housekeeping steps; `0` disables housekeeping.
    #[serde(default = "default_reset_interval")]
    pub reset_interval: u64,

    /// Statistics snapshot path.
    #[serde(default = "default_stats_file")]
    pub stats_file: PathBuf,

    /// Where the roster repair report is written.
    #[serde(default = "default_repairs_file")]
    pub repairs_file: PathBuf,

    /// Log rendered messages instead of submitting them.
    #[serde(default)]
    pub dry_run: bool,

    /// External submission command.
    #[serde(default)]
    pub submitter: SubmitterConfig,
}

fn default_roster_file() -> PathBuf {
    PathBuf::from("roster.csv")
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_message_file() -> PathBuf {
    PathBuf::from("message.txt")
}

fn default_max_messages() -> i64 {
    -1
}

fn default_max_time() -> TimeLimit {
    TimeLimit::Text("1h".to_string())
}

fn default_min_delay() -> f64 {
    15.0
}

fn default_random_delay() -> f64 {
    5.0
}

fn default_max_retries() -> u32 {
    5
}

fn default_submit_timeout() -> u64 {
    30
}

fn default_reset_interval() -> u64 {
    10
}

fn default_stats_file() -> PathBuf {
    PathBuf::from("stats.json")
}

fn default_repairs_file() -> PathBuf {
    PathBuf::from("modified.json")
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            roster_file: default_roster_file(),
            id_column: default_id_column(),
            message_file: default_message_file(),
            subject: None,
            target: None,
            max_messages: default_max_messages(),
            max_time: default_max_time(),
            min_delay: default_min_delay(),
            random_delay: default_random_delay(),
            max_retries: default_max_retries(),
            submit_timeout_secs: default_submit_timeout(),
            reset_interval: default_reset_interval(),
            stats_file: default_stats_file(),
            repairs_file: default_repairs_file(),
            dry_run: false,
            submitter: SubmitterConfig::default(),
        }
    }
}

/// The command that performs one submission.
///
/// It receives the rendered message on stdin and the record in its
/// environment. `reset_command` (program followed by its arguments) runs on
/// every housekeeping step; leave it empty to skip resets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitterConfig {
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub reset_command: Vec<String>,
}

/// A time budget as written in the file.
///
/// Accepts `-1`, a number of seconds, or text such as `"90s"`, `"15m"`,
/// `"1h"` and `"1h30m"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeLimit {
    Seconds(i64),
    Text(String),
}

impl TimeLimit {
    /// Resolves to seconds; `None` means unbounded.
    pub fn to_seconds(&self) -> Result<Option<f64>, ConfigError> {
        match self {
            TimeLimit::Seconds(-1) => Ok(None),
            TimeLimit::Seconds(secs) if *secs >= 0 => Ok(Some(*secs as f64)),
            TimeLimit::Seconds(secs) => Err(ConfigError::InvalidValue {
                field: "max_time".to_string(),
                message: format!("{secs} is negative; use -1 for no limit"),
            }),
            TimeLimit::Text(text) => parse_time_limit(text),
        }
    }
}

impl From<&str> for TimeLimit {
    fn from(text: &str) -> Self {
        TimeLimit::Text(text.to_string())
    }
}

static TIME_LIMIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)h)?\s*(?:(\d+)m)?\s*(?:(\d+)s)?$")
        .expect("time limit pattern is a valid regex")
});

/// Parses a textual time budget such as `"1h30m"` into seconds.
pub fn parse_time_limit(text: &str) -> Result<Option<f64>, ConfigError> {
    let trimmed = text.trim();
    let invalid = || ConfigError::InvalidValue {
        field: "max_time".to_string(),
        message: format!("'{text}' is not a duration (try 90s, 15m, 1h or 1h30m)"),
    };

    if let Ok(secs) = trimmed.parse::<i64>() {
        return TimeLimit::Seconds(secs).to_seconds();
    }

    let caps = TIME_LIMIT_PATTERN.captures(trimmed).ok_or_else(invalid)?;
    if caps.iter().skip(1).all(|group| group.is_none()) {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    for (index, unit) in [(1, 3600), (2, 60), (3, 1)] {
        if let Some(digits) = caps.get(index) {
            let value: u64 = digits.as_str().parse().map_err(|_| invalid())?;
            total = value
                .checked_mul(unit)
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(invalid)?;
        }
    }
    Ok(Some(total as f64))
}

impl CourierConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        Self::parse_yaml(&content)
    }

    /// Parses configuration from YAML text.
    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        debug!(
            roster = %config.roster_file.display(),
            max_messages = config.max_messages,
            dry_run = config.dry_run,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Serializes the configuration back to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validates the configuration and freezes it into [`SessionSettings`].
    ///
    /// Returns the settings together with any non-fatal warnings.
    pub fn validate(&self) -> Result<(SessionSettings, Vec<ConfigWarning>), ConfigError> {
        let mut warnings = Vec::new();

        let max_messages = match self.max_messages {
            -1 => None,
            n if n >= 0 => Some(n.unsigned_abs()),
            n => {
                return Err(ConfigError::InvalidValue {
                    field: "max_messages".to_string(),
                    message: format!("{n} is negative; use -1 for no limit"),
                });
            }
        };
        let max_time = self.max_time.to_seconds()?;
        let budget = SendBudget::new(
            max_time,
            max_messages,
            self.max_retries,
            self.min_delay,
            self.random_delay,
        )?;

        if self.id_column.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "id_column".to_string(),
                message: "must name a roster column".to_string(),
            });
        }

        if !self.dry_run && self.submitter.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "submitter.command".to_string(),
                message: "must not be empty unless dry_run is set".to_string(),
            });
        }

        if self.max_retries == 0 {
            warnings.push(ConfigWarning::InvalidValue {
                field: "max_retries".to_string(),
                message: "0 means no record is ever attempted; every record will be counted as failed"
                    .to_string(),
            });
        }
        if budget.max_delay() == 0.0 {
            warnings.push(ConfigWarning::Unpaced);
        }
        if self.reset_interval == 0 {
            warnings.push(ConfigWarning::HousekeepingDisabled);
        }

        let settings = SessionSettings {
            budget,
            reset_interval: self.reset_interval,
            roster_file: self.roster_file.clone(),
            id_column: self.id_column.clone(),
            message_file: self.message_file.clone(),
            subject: self.subject.clone(),
            target: self.target.clone(),
            stats_file: self.stats_file.clone(),
            repairs_file: self.repairs_file.clone(),
            dry_run: self.dry_run,
            command: self.submitter.command.clone(),
            args: self.submitter.args.clone(),
            reset_command: self.submitter.reset_command.clone(),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs),
        };
        Ok((settings, warnings))
    }
}

/// Validated, immutable settings for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub budget: SendBudget,
    pub reset_interval: u64,
    pub roster_file: PathBuf,
    pub id_column: String,
    pub message_file: PathBuf,
    pub subject: Option<String>,
    pub target: Option<String>,
    pub stats_file: PathBuf,
    pub repairs_file: PathBuf,
    pub dry_run: bool,
    pub command: String,
    pub args: Vec<String>,
    pub reset_command: Vec<String>,
    pub submit_timeout: Duration,
}

/// Non-fatal configuration issues.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    /// Field has a suspicious value.
    InvalidValue { field: String, message: String },
    /// No delay between attempts.
    Unpaced,
    /// The submitter's session handle is never reset.
    HousekeepingDisabled,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::InvalidValue { field, message } => {
                write!(f, "Warning [{field}]: {message}")
            }
            ConfigWarning::Unpaced => write!(
                f,
                "Warning [min_delay]: min_delay and random_delay are both 0, submissions will not be paced"
            ),
            ConfigWarning::HousekeepingDisabled => write!(
                f,
                "Warning [reset_interval]: 0 disables periodic snapshots and submitter resets"
            ),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dry_run_config() -> CourierConfig {
        CourierConfig {
            dry_run: true,
            ..CourierConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = CourierConfig::default();
        assert_eq!(config.roster_file, PathBuf::from("roster.csv"));
        assert_eq!(config.id_column, "id");
        assert_eq!(config.max_messages, -1);
        assert_eq!(config.max_time, TimeLimit::Text("1h".to_string()));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.reset_interval, 10);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = CourierConfig::parse_yaml("{}").unwrap();
        assert_eq!(config, CourierConfig::default());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
roster_file: people.csv
id_column: handshake_id
subject: "Hello {name}"
max_messages: 40
max_time: 1h30m
min_delay: 2
random_delay: 0.5
max_retries: 3
submitter:
  command: ./send.sh
  args: ["--fast"]
  reset_command: ["./reset.sh", "--hard"]
"#;
        let config = CourierConfig::parse_yaml(yaml).unwrap();
        assert_eq!(config.id_column, "handshake_id");
        assert_eq!(config.max_time, TimeLimit::Text("1h30m".to_string()));
        assert_eq!(config.submitter.args, vec!["--fast"]);

        let (settings, warnings) = config.validate().unwrap();
        assert!(warnings.is_empty());
        assert_eq!(settings.budget.max_time(), Some(5400.0));
        assert_eq!(settings.budget.max_messages(), Some(40));
        assert_eq!(settings.budget.max_retries(), 3);
        assert_eq!(settings.command, "./send.sh");
        assert_eq!(settings.reset_command, vec!["./reset.sh", "--hard"]);
        assert_eq!(settings.subject.as_deref(), Some("Hello {name}"));
    }

    #[test]
    fn test_numeric_max_time() {
        let config = CourierConfig::parse_yaml("max_time: 600\ndry_run: true").unwrap();
        let (settings, _) = config.validate().unwrap();
        assert_eq!(settings.budget.max_time(), Some(600.0));

        let config = CourierConfig::parse_yaml("max_time: -1\ndry_run: true").unwrap();
        let (settings, _) = config.validate().unwrap();
        assert_eq!(settings.budget.max_time(), None);
    }

    #[test]
    fn test_parse_time_limit() {
        assert_eq!(parse_time_limit("90s").unwrap(), Some(90.0));
        assert_eq!(parse_time_limit("15m").unwrap(), Some(900.0));
        assert_eq!(parse_time_limit("1h").unwrap(), Some(3600.0));
        assert_eq!(parse_time_limit("1h30m").unwrap(), Some(5400.0));
        assert_eq!(parse_time_limit("2h 5m 10s").unwrap(), Some(7510.0));
        assert_eq!(parse_time_limit(" 45 ").unwrap(), Some(45.0));
        assert_eq!(parse_time_limit("-1").unwrap(), None);
        assert!(parse_time_limit("").is_err());
        assert!(parse_time_limit("soon").is_err());
        assert!(parse_time_limit("10d").is_err());
        assert!(parse_time_limit("-5").is_err());
    }

    #[test]
    fn test_negative_budgets_fail() {
        let config = CourierConfig {
            max_messages: -3,
            ..dry_run_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "max_messages"
        ));

        let config = CourierConfig {
            min_delay: -1.0,
            ..dry_run_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "min_delay"
        ));
    }

    #[test]
    fn test_huge_delays_fail() {
        let config = CourierConfig {
            min_delay: 1e20,
            ..dry_run_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "random_delay"
        ));

        let config = CourierConfig {
            min_delay: f64::MAX,
            random_delay: f64::MAX,
            ..dry_run_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_command_required_unless_dry_run() {
        assert!(matches!(
            CourierConfig::default().validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "submitter.command"
        ));
        assert!(dry_run_config().validate().is_ok());
    }

    #[test]
    fn test_warnings() {
        let config = CourierConfig {
            max_retries: 0,
            min_delay: 0.0,
            random_delay: 0.0,
            reset_interval: 0,
            ..dry_run_config()
        };
        let (_, warnings) = config.validate().unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.contains(&ConfigWarning::Unpaced));
        assert!(warnings.contains(&ConfigWarning::HousekeepingDisabled));
        assert!(warnings[0].to_string().starts_with("Warning [max_retries]"));
    }

    #[test]
    fn test_yaml_round_trip_of_defaults() {
        let yaml = CourierConfig::default().to_yaml().unwrap();
        assert_eq!(
            CourierConfig::parse_yaml(&yaml).unwrap(),
            CourierConfig::default()
        );
    }
}
