use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use cubepull_core::{FetchError, FetchRequest, FetchVariant, QuerySource, Rows};

use crate::config::ProjectConfig;

/// Builds the query text for a request.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    template: String,
    standard_measures: String,
    prior_year_measures: String,
}

impl QueryTemplate {
    pub fn new(
        template: impl Into<String>,
        standard_measures: impl Into<String>,
        prior_year_measures: impl Into<String>,
    ) -> Self {
        Self {
            template: template.into(),
            standard_measures: standard_measures.into(),
            prior_year_measures: prior_year_measures.into(),
        }
    }

    pub fn render(&self, request: &FetchRequest) -> String {
        let measures = match request.variant {
            FetchVariant::Standard => &self.standard_measures,
            FetchVariant::PriorYearShifted => &self.prior_year_measures,
        };

        self.template
            .replace("{measures}", measures)
            .replace("{query_date}", &request.query_date.format("%Y-%m-%d").to_string())
    }
}

/// Runs an external query program once per attempt.
///
/// Each attempt spawns a fresh child, so a failed session never leaks into
/// the next try. The child is killed if it outlives the attempt timeout.
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    timeout: Duration,
    permanent_exit_codes: Vec<i32>,
    template: QueryTemplate,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, template: QueryTemplate, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout,
            permanent_exit_codes: Vec::new(),
            template,
        }
    }

    pub fn from_config(config: &ProjectConfig) -> anyhow::Result<Self> {
        let template = QueryTemplate::new(
            &config.source.query_template,
            &config.source.standard_measures,
            &config.source.prior_year_measures,
        );

        Ok(Self::new(&config.source.program, template, config.attempt_timeout())
            .with_args(config.source_args()?)
            .with_env(config.source_env()?)
            .with_permanent_exit_codes(config.source.permanent_exit_codes.clone()))
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn with_permanent_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.permanent_exit_codes = codes;
        self
    }

    async fn execute(&self, query: String) -> Result<Vec<u8>, FetchError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::transient(format!("failed to start {}: {}", self.program, e)))?;

        let stdin = child.stdin.take();
        let send = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(query.as_bytes()).await?;
            }
            // stdin is dropped here, so the program sees EOF.
            Ok::<_, std::io::Error>(())
        };

        // The query is sent while output is collected, and both count against the timeout.
        let attempt = async { tokio::join!(send, child.wait_with_output()) };
        let (sent, output) = match tokio::time::timeout(self.timeout, attempt).await {
            Ok((sent, output)) => (
                sent,
                output.map_err(|e| FetchError::transient(format!("query process failed: {}", e)))?,
            ),
            Err(_) => {
                return Err(FetchError::transient(format!(
                    "query timed out after {:?}",
                    self.timeout
                )));
            }
        };

        if output.status.success() {
            sent.map_err(|e| FetchError::transient(format!("failed to send query: {}", e)))?;
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = format!(
            "query process exited with {}: {}",
            output.status,
            stderr.trim()
        );

        match output.status.code() {
            Some(code) if self.permanent_exit_codes.contains(&code) => {
                Err(FetchError::permanent(message))
            }
            _ => Err(FetchError::transient(message)),
        }
    }
}

impl QuerySource for CommandSource {
    fn fetch(&self, request: &FetchRequest) -> impl Future<Output = Result<Rows, FetchError>> + Send {
        let query = self.template.render(request);
        let date = request.date;
        debug!(date = %date, variant = %request.variant, query = %query, "Running query");

        async move {
            let stdout = self.execute(query).await?;
            let rows = parse_csv(&stdout)?;

            debug!(date = %date, rows = rows.len(), "Query returned");
            Ok(rows)
        }
    }
}

/// Parse CSV with a header row into rows.
pub fn parse_csv(data: &[u8]) -> Result<Rows, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);

    let columns = reader
        .headers()
        .map_err(|e| FetchError::transient(format!("unreadable result header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| FetchError::transient(format!("unreadable result row: {}", e)))?;
        records.push(record.iter().map(str::to_string).collect());
    }

    Ok(Rows::new(columns, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};
    use cubepull_core::VariantPolicy;

    fn policy() -> VariantPolicy {
        VariantPolicy {
            earliest_supported_date: NaiveDate::from_ymd_opt(2015, 2, 2).unwrap(),
            prior_year_offset: Days::new(364),
        }
    }

    fn template() -> QueryTemplate {
        QueryTemplate::new(
            "SELECT {measures} ON COLUMNS WHERE ([Date].[{query_date}])",
            "{[Measures].[Sales]}",
            "{[Measures].[Sales LY]}",
        )
    }

    #[test]
    fn test_render_standard_query() {
        let request = FetchRequest::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), &policy());

        assert_eq!(
            template().render(&request),
            "SELECT {[Measures].[Sales]} ON COLUMNS WHERE ([Date].[2024-03-05])"
        );
    }

    #[test]
    fn test_render_prior_year_query() {
        let request = FetchRequest::new(NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(), &policy());

        assert_eq!(
            template().render(&request),
            "SELECT {[Measures].[Sales LY]} ON COLUMNS WHERE ([Date].[2015-12-31])"
        );
    }

    #[test]
    fn test_parse_csv() {
        let rows = parse_csv(b"store,sales\n\"Main St\",10\nDepot,\n").unwrap();

        assert_eq!(rows.columns, vec!["store", "sales"]);
        assert_eq!(
            rows.records,
            vec![
                vec!["Main St".to_string(), "10".to_string()],
                vec!["Depot".to_string(), "".to_string()],
            ]
        );
    }

    #[test]
    fn test_parse_ragged_csv_fails() {
        let err = parse_csv(b"a,b\n1,2,3\n").unwrap_err();
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_echoes_query() {
        let source = CommandSource::new("sh", template(), Duration::from_secs(10)).with_args(vec![
            "-c".to_string(),
            "read q; printf 'query\\n\"%s\"\\n' \"$q\"".to_string(),
        ]);
        let request = FetchRequest::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), &policy());

        let rows = source.fetch(&request).await.unwrap();
        assert_eq!(rows.columns, vec!["query"]);
        assert_eq!(
            rows.records[0][0],
            "SELECT {[Measures].[Sales]} ON COLUMNS WHERE ([Date].[2024-03-05])"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes_are_classified() {
        let request = FetchRequest::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), &policy());

        let rejected = CommandSource::new("sh", template(), Duration::from_secs(10))
            .with_args(vec!["-c".to_string(), "cat >/dev/null; exit 2".to_string()])
            .with_permanent_exit_codes(vec![2]);
        assert!(!rejected.fetch(&request).await.unwrap_err().is_retryable());

        let busy = CommandSource::new("sh", template(), Duration::from_secs(10))
            .with_args(vec!["-c".to_string(), "cat >/dev/null; exit 1".to_string()])
            .with_permanent_exit_codes(vec![2]);
        assert!(busy.fetch(&request).await.unwrap_err().is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_query_times_out() {
        let source = CommandSource::new("sh", template(), Duration::from_millis(100))
            .with_args(vec!["-c".to_string(), "sleep 5".to_string()]);
        let request = FetchRequest::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), &policy());

        let err = source.fetch(&request).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_covers_query_the_program_never_reads() {
        let large = QueryTemplate::new("x".repeat(1024 * 1024), "", "");
        let source = CommandSource::new("sh", large, Duration::from_millis(200))
            .with_args(vec!["-c".to_string(), "sleep 4".to_string()]);
        let request = FetchRequest::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), &policy());

        let started = std::time::Instant::now();
        let err = source.fetch(&request).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_program_is_transient() {
        let source = CommandSource::new(
            "cubepull-definitely-not-installed",
            template(),
            Duration::from_secs(1),
        );
        let request = FetchRequest::new(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), &policy());

        assert!(source.fetch(&request).await.unwrap_err().is_retryable());
    }
}
