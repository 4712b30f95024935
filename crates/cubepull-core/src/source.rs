use std::future::Future;

use crate::error::FetchError;
use crate::types::{FetchRequest, Rows};

/// One upstream fetch for a single date.
///
/// Each call is one attempt and must own its connection for exactly that
/// attempt: nothing may be carried over into the next call. Failures the
/// implementation cannot classify should be reported as
/// [`FetchError::Transient`].
pub trait QuerySource: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> impl Future<Output = Result<Rows, FetchError>> + Send;
}
