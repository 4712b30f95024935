use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use cubepull_core::{ResultSink, Rows};

use crate::config::OutputConfig;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("write task failed: {0}")]
    Task(String),
}

/// Writes one CSV file per date into an output directory.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    directory: PathBuf,
    file_suffix: String,
    drop_columns_containing: Vec<String>,
}

impl CsvFileSink {
    pub fn new(directory: impl Into<PathBuf>, file_suffix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_suffix: file_suffix.into(),
            drop_columns_containing: Vec::new(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.directory, &config.file_suffix)
            .with_dropped_columns(config.drop_columns_containing.clone())
    }

    /// Drop every column whose name contains one of `patterns`.
    pub fn with_dropped_columns(mut self, patterns: Vec<String>) -> Self {
        self.drop_columns_containing = patterns;
        self
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.directory
            .join(format!("{}{}", date.format("%Y-%m-%d"), self.file_suffix))
    }

    fn kept_columns(&self, rows: &Rows) -> Vec<usize> {
        rows.columns
            .iter()
            .enumerate()
            .filter(|(_, name)| {
                !self
                    .drop_columns_containing
                    .iter()
                    .any(|pattern| name.contains(pattern.as_str()))
            })
            .map(|(i, _)| i)
            .collect()
    }
}

impl ResultSink for CsvFileSink {
    type Error = SinkError;

    fn write(
        &self,
        date: NaiveDate,
        rows: &Rows,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let path = self.path_for(date);
        let directory = self.directory.clone();
        let kept = self.kept_columns(rows);
        let rows = rows.clone();

        async move {
            let count = rows.len();
            let written = path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&directory, &path, &rows, &kept))
                .await
                .map_err(|e| SinkError::Task(e.to_string()))??;

            info!(date = %date, rows = count, path = %written.display(), "Wrote results");
            Ok(())
        }
    }
}

fn write_atomic(directory: &Path, path: &Path, rows: &Rows, kept: &[usize]) -> Result<(), SinkError> {
    fs::create_dir_all(directory).map_err(io_error(directory))?;
    let mut tmp = NamedTempFile::new_in(directory).map_err(io_error(directory))?;

    {
        let mut writer = csv::Writer::from_writer(&mut tmp);
        if !kept.is_empty() {
            writer.write_record(kept.iter().map(|&i| rows.columns[i].as_str()))?;
            for record in &rows.records {
                writer.write_record(
                    kept.iter()
                        .map(|&i| record.get(i).map(String::as_str).unwrap_or("")),
                )?;
            }
        }
        writer.flush().map_err(io_error(path))?;
    }

    tmp.as_file().sync_all().map_err(io_error(path))?;
    tmp.persist(path).map_err(|e| SinkError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError {
    let path = path.to_path_buf();
    move |source| SinkError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rows() -> Rows {
        Rows::new(
            vec![
                "[Store].[Name].[MEMBER_CAPTION]".to_string(),
                "[Store].[Name].[member_unique_name]".to_string(),
                "[Measures].[Sales]".to_string(),
            ],
            vec![
                vec!["Main St".to_string(), "[Store].&[1]".to_string(), "10".to_string()],
                vec!["Depot, North".to_string(), "[Store].&[2]".to_string(), "".to_string()],
            ],
        )
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
    }

    #[test]
    fn test_path_for_date() {
        let sink = CsvFileSink::new("/data/out", "_sales.csv");
        assert_eq!(
            sink.path_for(date()),
            PathBuf::from("/data/out/2024-01-11_sales.csv")
        );
    }

    #[tokio::test]
    async fn test_write_drops_matching_columns() {
        let dir = TempDir::new().unwrap();
        let sink = CsvFileSink::new(dir.path().join("out"), ".csv")
            .with_dropped_columns(vec!["member_unique_name".to_string()]);

        sink.write(date(), &rows()).await.unwrap();

        let content = fs::read_to_string(dir.path().join("out/2024-01-11.csv")).unwrap();
        assert_eq!(
            content,
            "[Store].[Name].[MEMBER_CAPTION],[Measures].[Sales]\nMain St,10\n\"Depot, North\",\n"
        );
    }

    #[tokio::test]
    async fn test_write_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let sink = CsvFileSink::new(dir.path(), ".csv");

        sink.write(date(), &rows()).await.unwrap();
        let single = Rows::new(vec!["a".to_string()], vec![vec!["1".to_string()]]);
        sink.write(date(), &single).await.unwrap();

        let content = fs::read_to_string(sink.path_for(date())).unwrap();
        assert_eq!(content, "a\n1\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_writes_header_only() {
        let dir = TempDir::new().unwrap();
        let sink = CsvFileSink::new(dir.path(), ".csv");

        let empty = Rows::new(vec!["a".to_string(), "b".to_string()], Vec::new());
        sink.write(date(), &empty).await.unwrap();

        let content = fs::read_to_string(sink.path_for(date())).unwrap();
        assert_eq!(content, "a,b\n");
    }
}
