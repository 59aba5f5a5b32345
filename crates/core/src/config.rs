use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::calendar::WorkCalendar;
use crate::domain::leave_request::LeaveCategory;

/// Process-wide leave policy: thresholds, default per-category allocations,
/// and the working calendar. Injected explicitly into the validator and the
/// lifecycle coordinator so tests can override any knob per case.
#[derive(Clone, Debug, PartialEq)]
pub struct LeavePolicyConfig {
    /// Emergency requests at or under this many days auto-approve and skip
    /// the balance gate.
    pub emergency_auto_approve_ceiling: Decimal,
    /// How far in the past a request may start.
    pub backdated_window_days: i64,
    /// Remaining-balance level that triggers a non-fatal warning.
    pub low_balance_warning_threshold: Decimal,
    /// Maximum inclusive calendar span of a single request.
    pub max_request_span_days: i64,
    pub default_allocations: BTreeMap<LeaveCategory, Decimal>,
    pub rest_days: Vec<Weekday>,
    pub holidays: Vec<NaiveDate>,
}

impl Default for LeavePolicyConfig {
    fn default() -> Self {
        Self {
            emergency_auto_approve_ceiling: Decimal::from(2),
            backdated_window_days: 30,
            low_balance_warning_threshold: Decimal::from(5),
            max_request_span_days: 365,
            default_allocations: BTreeMap::from([
                (LeaveCategory::Vacation, Decimal::from(20)),
                (LeaveCategory::Sick, Decimal::from(10)),
                (LeaveCategory::Personal, Decimal::from(5)),
                (LeaveCategory::Emergency, Decimal::from(5)),
                (LeaveCategory::Maternity, Decimal::from(90)),
                (LeaveCategory::Paternity, Decimal::from(10)),
                (LeaveCategory::Bereavement, Decimal::from(5)),
                (LeaveCategory::Compensatory, Decimal::ZERO),
                (LeaveCategory::Unpaid, Decimal::ZERO),
            ]),
            rest_days: vec![Weekday::Sat, Weekday::Sun],
            holidays: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub emergency_auto_approve_ceiling: Option<Decimal>,
    pub backdated_window_days: Option<i64>,
    pub low_balance_warning_threshold: Option<Decimal>,
    pub max_request_span_days: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl LeavePolicyConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leaveflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn work_calendar(&self) -> WorkCalendar {
        WorkCalendar::new(self.rest_days.iter().copied(), self.holidays.iter().copied())
    }

    pub fn allocation_for(&self, category: LeaveCategory) -> Decimal {
        self.default_allocations.get(&category).copied().unwrap_or(Decimal::ZERO)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(thresholds) = patch.thresholds {
            if let Some(value) = thresholds.emergency_auto_approve_ceiling {
                self.emergency_auto_approve_ceiling = value;
            }
            if let Some(value) = thresholds.backdated_window_days {
                self.backdated_window_days = value;
            }
            if let Some(value) = thresholds.low_balance_warning_threshold {
                self.low_balance_warning_threshold = value;
            }
            if let Some(value) = thresholds.max_request_span_days {
                self.max_request_span_days = value;
            }
        }

        if let Some(allocations) = patch.allocations {
            for (raw_category, days) in allocations {
                let category = LeaveCategory::parse(&raw_category).ok_or_else(|| {
                    ConfigError::Validation(format!("unknown leave category `{raw_category}`"))
                })?;
                self.default_allocations.insert(category, days);
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(rest_days) = calendar.rest_days {
                self.rest_days = rest_days
                    .iter()
                    .map(|raw| {
                        Weekday::from_str(raw).map_err(|_| {
                            ConfigError::Validation(format!("unknown rest day `{raw}`"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
            }
            if let Some(holidays) = calendar.holidays {
                self.holidays = holidays;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEAVEFLOW_EMERGENCY_CEILING") {
            self.emergency_auto_approve_ceiling =
                parse_decimal("LEAVEFLOW_EMERGENCY_CEILING", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_BACKDATED_WINDOW_DAYS") {
            self.backdated_window_days = parse_i64("LEAVEFLOW_BACKDATED_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_LOW_BALANCE_THRESHOLD") {
            self.low_balance_warning_threshold =
                parse_decimal("LEAVEFLOW_LOW_BALANCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_MAX_SPAN_DAYS") {
            self.max_request_span_days = parse_i64("LEAVEFLOW_MAX_SPAN_DAYS", &value)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(value) = overrides.emergency_auto_approve_ceiling {
            self.emergency_auto_approve_ceiling = value;
        }
        if let Some(value) = overrides.backdated_window_days {
            self.backdated_window_days = value;
        }
        if let Some(value) = overrides.low_balance_warning_threshold {
            self.low_balance_warning_threshold = value;
        }
        if let Some(value) = overrides.max_request_span_days {
            self.max_request_span_days = value;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.emergency_auto_approve_ceiling < Decimal::ZERO {
            return Err(ConfigError::Validation(
                "thresholds.emergency_auto_approve_ceiling must not be negative".to_string(),
            ));
        }
        if self.backdated_window_days < 0 {
            return Err(ConfigError::Validation(
                "thresholds.backdated_window_days must not be negative".to_string(),
            ));
        }
        if self.low_balance_warning_threshold < Decimal::ZERO {
            return Err(ConfigError::Validation(
                "thresholds.low_balance_warning_threshold must not be negative".to_string(),
            ));
        }
        if self.max_request_span_days < 1 {
            return Err(ConfigError::Validation(
                "thresholds.max_request_span_days must be at least 1".to_string(),
            ));
        }
        for (category, days) in &self.default_allocations {
            if *days < Decimal::ZERO {
                return Err(ConfigError::Validation(format!(
                    "allocations.{category} must not be negative"
                )));
            }
            if !half_day_aligned(*days) {
                return Err(ConfigError::Validation(format!(
                    "allocations.{category} must be a multiple of 0.5 days"
                )));
            }
        }
        if !half_day_aligned(self.emergency_auto_approve_ceiling)
            || !half_day_aligned(self.low_balance_warning_threshold)
        {
            return Err(ConfigError::Validation(
                "day thresholds must be multiples of 0.5 days".to_string(),
            ));
        }
        if self.rest_days.len() >= 7 {
            return Err(ConfigError::Validation(
                "calendar.rest_days must leave at least one working weekday".to_string(),
            ));
        }
        Ok(())
    }
}

/// Every day count in the system moves on a half-day grid; the persistence
/// adapter relies on this for exact arithmetic.
fn half_day_aligned(value: Decimal) -> bool {
    (value * Decimal::from(2)).fract().is_zero()
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leaveflow.toml"), PathBuf::from("config/leaveflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    thresholds: Option<ThresholdsPatch>,
    allocations: Option<BTreeMap<String, Decimal>>,
    calendar: Option<CalendarPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ThresholdsPatch {
    emergency_auto_approve_ceiling: Option<Decimal>,
    backdated_window_days: Option<i64>,
    low_balance_warning_threshold: Option<Decimal>,
    max_request_span_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    rest_days: Option<Vec<String>>,
    holidays: Option<Vec<NaiveDate>>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::sync::{Mutex, OnceLock};

    use chrono::Weekday;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{ConfigError, ConfigOverrides, LeavePolicyConfig, LoadOptions};
    use crate::domain::leave_request::LeaveCategory;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_pass_validation() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars(&[
            "LEAVEFLOW_EMERGENCY_CEILING",
            "LEAVEFLOW_BACKDATED_WINDOW_DAYS",
            "LEAVEFLOW_LOW_BALANCE_THRESHOLD",
            "LEAVEFLOW_MAX_SPAN_DAYS",
        ]);

        let config = LeavePolicyConfig::load(LoadOptions::default()).expect("load defaults");
        assert_eq!(config.emergency_auto_approve_ceiling, Decimal::from(2));
        assert_eq!(config.backdated_window_days, 30);
        assert_eq!(config.allocation_for(LeaveCategory::Vacation), Decimal::from(20));
        assert_eq!(config.allocation_for(LeaveCategory::Unpaid), Decimal::ZERO);
        assert_eq!(config.rest_days, vec![Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn file_patch_overrides_thresholds_and_allocations() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars(&["LEAVEFLOW_EMERGENCY_CEILING", "LEAVEFLOW_BACKDATED_WINDOW_DAYS"]);

        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("leaveflow.toml");
        fs::write(
            &path,
            r#"
[thresholds]
emergency_auto_approve_ceiling = 3.0
backdated_window_days = 14

[allocations]
vacation = 25.0
compensatory = 2.5

[calendar]
rest_days = ["Friday", "Saturday"]
holidays = ["2026-12-25"]
"#,
        )
        .expect("write config");

        let config = LeavePolicyConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        })
        .expect("load patched config");

        assert_eq!(config.emergency_auto_approve_ceiling, Decimal::from(3));
        assert_eq!(config.backdated_window_days, 14);
        assert_eq!(config.allocation_for(LeaveCategory::Vacation), Decimal::from(25));
        assert_eq!(config.allocation_for(LeaveCategory::Compensatory), Decimal::new(25, 1));
        assert_eq!(config.rest_days, vec![Weekday::Fri, Weekday::Sat]);
        assert_eq!(config.holidays.len(), 1);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let _guard = env_lock().lock().expect("env lock");
        env::set_var("LEAVEFLOW_EMERGENCY_CEILING", "1.5");

        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("leaveflow.toml");
        fs::write(&path, "[thresholds]\nemergency_auto_approve_ceiling = 4.0\n")
            .expect("write config");

        let result = LeavePolicyConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        });
        clear_vars(&["LEAVEFLOW_EMERGENCY_CEILING"]);

        let config = result.expect("load config");
        assert_eq!(config.emergency_auto_approve_ceiling, Decimal::new(15, 1));
    }

    #[test]
    fn explicit_overrides_win_over_everything() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars(&["LEAVEFLOW_MAX_SPAN_DAYS"]);

        let config = LeavePolicyConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                max_request_span_days: Some(90),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load config");
        assert_eq!(config.max_request_span_days, 90);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let _guard = env_lock().lock().expect("env lock");
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("absent.toml");

        let error = LeavePolicyConfig::load(LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("absent file must fail when required");
        assert!(matches!(error, ConfigError::MissingConfigFile(expected) if expected == path));
    }

    #[test]
    fn off_grid_threshold_fails_validation() {
        let mut config = LeavePolicyConfig::default();
        config.emergency_auto_approve_ceiling = Decimal::new(17, 1);
        let error = config.validate().expect_err("1.7 is off the half-day grid");
        assert!(matches!(error, ConfigError::Validation(message) if message.contains("0.5")));
    }

    #[test]
    fn rest_days_must_leave_a_working_weekday() {
        let mut config = LeavePolicyConfig::default();
        config.rest_days = vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        assert!(config.validate().is_err());
    }
}
