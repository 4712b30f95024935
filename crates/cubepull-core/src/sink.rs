use std::future::Future;

use chrono::NaiveDate;

use crate::types::Rows;

/// Destination for the rows of a successfully fetched date.
///
/// Called exactly once per successful date. A failure here is fatal to the run.
pub trait ResultSink: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn write(
        &self,
        date: NaiveDate,
        rows: &Rows,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
