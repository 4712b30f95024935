use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use cubepull_config::ScheduleConfig;
use cubepull_core::SchedulerConfig;
use cubepull_state::CheckpointBackend;

/// Project configuration from cubepull.toml
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub schedule: ScheduleConfig,
    pub state: StateConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    pub backend: StateBackend,
    pub path: PathBuf,
    pub lock_path: PathBuf,
}

/// External program that runs one query per invocation.
///
/// The rendered query is written to its stdin and CSV is read from its stdout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub attempt_timeout_secs: u64,
    /// Exit codes meaning the query itself was rejected; these are not retried.
    #[serde(default)]
    pub permanent_exit_codes: Vec<i32>,
    /// Query text with `{measures}` and `{query_date}` placeholders.
    pub query_template: String,
    pub standard_measures: String,
    pub prior_year_measures: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub file_suffix: String,
    #[serde(default)]
    pub drop_columns_containing: Vec<String>,
}

impl ProjectConfig {
    /// Read, parse and validate a project config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: ProjectConfig =
            toml::from_str(content).context("Failed to parse cubepull.toml")?;

        cubepull_config::validate_schedule(&config.schedule)?;
        if config.source.attempt_timeout_secs == 0 {
            anyhow::bail!("source.attempt_timeout_secs must be greater than zero");
        }
        if config.source.program.trim().is_empty() {
            anyhow::bail!("source.program must not be empty");
        }

        Ok(config)
    }

    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        Ok(cubepull_config::to_scheduler_config(&self.schedule)?)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.source.attempt_timeout_secs)
    }

    /// Open the configured checkpoint backend.
    pub fn open_store(&self) -> Result<CheckpointBackend> {
        let store = match self.state.backend {
            StateBackend::Json => CheckpointBackend::json(&self.state.path),
            StateBackend::Sqlite => CheckpointBackend::sqlite(&self.state.path).with_context(
                || format!("Failed to open checkpoint database: {}", self.state.path.display()),
            )?,
        };
        Ok(store)
    }

    /// Program arguments with `${VAR}` references resolved.
    pub fn source_args(&self) -> Result<Vec<String>> {
        self.source.args.iter().map(|arg| resolve_env(arg)).collect()
    }

    /// Extra environment for the source program with `${VAR}` references resolved.
    pub fn source_env(&self) -> Result<Vec<(String, String)>> {
        self.source
            .env
            .iter()
            .map(|(key, value)| {
                let resolved = resolve_env(value)
                    .with_context(|| format!("Failed to resolve source.env.{}", key))?;
                Ok((key.clone(), resolved))
            })
            .collect()
    }
}

/// Resolve environment variables in a string.
/// Supports ${VAR_NAME} syntax; an unset variable is an error.
pub fn resolve_env(s: &str) -> Result<String> {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            anyhow::bail!("Unterminated variable reference in '{}'", s);
        };

        let var_name = &rest[start + 2..start + end];
        let value = std::env::var(var_name)
            .with_context(|| format!("Environment variable {} is not set", var_name))?;

        result.push_str(&rest[..start]);
        result.push_str(&value);
        rest = &rest[start + end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Template written by `cubepull init` when no config exists.
pub const TEMPLATE: &str = r#"# cubepull configuration
# Secrets are loaded from a .env file and referenced as ${VAR}.

[schedule]
max_attempts = 5
long_attempt_threshold = 3
wait_between_attempts_secs = 95
extra_wait_for_long_attempt_secs = 220
wait_at_run_start_secs = 10
wait_between_queries_secs = 95
extra_wait_during_daytime_secs = 270
extra_wait_during_business_day_secs = 840
business_day_end = "17:00:00"
morning_start_time = "06:30:00"
evening_end_time = "21:30:00"
gate_poll_interval_secs = 900
earliest_supported_date = "2015-02-02"
prior_year_date_offset_days = 364

[state]
backend = "json"
path = "state/checkpoint.json"
lock_path = "state/cubepull.lock"

[source]
program = "cube-query"
args = ["--server", "${CUBE_SERVER}", "--catalog", "${CUBE_CATALOG}"]
attempt_timeout_secs = 1800
permanent_exit_codes = [2]
query_template = "SELECT {measures} ON COLUMNS FROM [Cube] WHERE ([Date].[Date].[Date].[{query_date}])"
standard_measures = "{[Measures].[Sales],[Measures].[Units]}"
prior_year_measures = "{[Measures].[Sales LY],[Measures].[Units LY]}"

[source.env]
CUBE_USER = "${CUBE_USER}"
CUBE_PASSWORD = "${CUBE_PASSWORD}"

[output]
directory = "output"
file_suffix = "_daily.csv"
drop_columns_containing = ["member_unique_name"]
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_resolve_env() {
        std::env::set_var("CUBEPULL_TEST_VAR", "hello");

        assert_eq!(resolve_env("${CUBEPULL_TEST_VAR}").unwrap(), "hello");
        assert_eq!(
            resolve_env("prefix_${CUBEPULL_TEST_VAR}_suffix").unwrap(),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env("no_vars").unwrap(), "no_vars");

        std::env::remove_var("CUBEPULL_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_resolve_env_unset_variable_fails() {
        std::env::remove_var("CUBEPULL_UNSET_VAR");

        let err = resolve_env("x${CUBEPULL_UNSET_VAR}").unwrap_err();
        assert!(err.to_string().contains("CUBEPULL_UNSET_VAR"));
    }

    #[test]
    fn test_resolve_env_unterminated_fails() {
        assert!(resolve_env("${OPEN").is_err());
    }

    #[test]
    fn test_template_parses() {
        let config = ProjectConfig::parse(TEMPLATE).unwrap();

        assert_eq!(config.state.backend, StateBackend::Json);
        assert_eq!(config.schedule.max_attempts, 5);
        assert_eq!(config.source.permanent_exit_codes, vec![2]);
        assert_eq!(config.output.drop_columns_containing, vec!["member_unique_name"]);
        assert_eq!(config.attempt_timeout(), Duration::from_secs(1800));
        assert!(config.scheduler_config().is_ok());
    }

    #[test]
    #[serial]
    fn test_source_env_resolution() {
        std::env::set_var("CUBE_USER", "analyst");
        std::env::set_var("CUBE_PASSWORD", "secret");

        let config = ProjectConfig::parse(TEMPLATE).unwrap();
        let env = config.source_env().unwrap();
        assert_eq!(
            env,
            vec![
                ("CUBE_PASSWORD".to_string(), "secret".to_string()),
                ("CUBE_USER".to_string(), "analyst".to_string()),
            ]
        );

        std::env::remove_var("CUBE_PASSWORD");
        assert!(config.source_env().is_err());

        std::env::remove_var("CUBE_USER");
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let broken = TEMPLATE.replace("max_attempts = 5", "max_attempts = 0");
        assert!(ProjectConfig::parse(&broken).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let broken = TEMPLATE.replace("attempt_timeout_secs = 1800", "attempt_timeout_secs = 0");
        assert!(ProjectConfig::parse(&broken).is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let broken = TEMPLATE.replace("backend = \"json\"", "backend = \"postgres\"");
        assert!(ProjectConfig::parse(&broken).is_err());
    }
}
