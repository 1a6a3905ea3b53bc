use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::{Rows, Written};
use crate::error::BackendError;
use crate::models::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Outcome of one service call. Exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResult<T> {
    pub data: Option<T>,
    pub error: Option<BackendError>,
    pub status: Status,
}

impl<T> ServiceResult<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: Status::Success,
        }
    }

    pub fn failure(error: BackendError) -> Self {
        Self {
            data: None,
            error: Some(error),
            status: Status::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn into_result(self) -> Result<T, BackendError> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(BackendError::internal("service returned no data")),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ServiceResult<U> {
        ServiceResult {
            data: self.data.map(f),
            error: self.error,
            status: self.status,
        }
    }
}

impl<T> From<Result<T, BackendError>> for ServiceResult<T> {
    fn from(result: Result<T, BackendError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(error) => Self::failure(error),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one backend call and folds every outcome, panics included, into a [`ServiceResult`].
/// Single attempt, no retry.
pub async fn run<T, F>(operation: &str, call: F) -> ServiceResult<T>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(data)) => ServiceResult::success(data),
        Ok(Err(error)) => {
            tracing::warn!(operation, kind = ?error.kind, "{}", error.message);
            ServiceResult::failure(error)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(operation, "service call panicked: {}", message);
            ServiceResult::failure(BackendError::internal(message))
        }
    }
}

pub(crate) fn decode<T: DeserializeOwned>(row: Value) -> Result<T, BackendError> {
    Ok(serde_json::from_value(row)?)
}

pub(crate) fn decode_all<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, BackendError> {
    rows.into_iter().map(decode).collect()
}

/// First written or selected row; `what` names it in the not-found message.
pub(crate) fn first<T: DeserializeOwned>(rows: Written, what: &str) -> Result<T, BackendError> {
    match rows.into_iter().next() {
        Some(row) => decode(row),
        None => Err(BackendError::not_found(format!("{} not found", what))),
    }
}

pub(crate) fn first_opt<T: DeserializeOwned>(rows: Written) -> Result<Option<T>, BackendError> {
    rows.into_iter().next().map(decode).transpose()
}

pub(crate) fn page<T: DeserializeOwned>(
    rows: Rows,
    page: u32,
    page_size: u32,
) -> Result<Page<T>, BackendError> {
    let total = rows.count.unwrap_or(rows.rows.len() as u64);
    Ok(Page {
        items: decode_all(rows.rows)?,
        total,
        page: page.max(1),
        page_size,
    })
}

/// Serializes a payload bound for a write; structs become JSON objects.
pub(crate) fn row<T: Serialize>(value: &T) -> Result<Value, BackendError> {
    Ok(serde_json::to_value(value)?)
}
