//! In-memory `CloudApi` for coordinator and HTTP tests.
//!
//! Records every upload batch and status call, and fails calls on demand.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{models::StatusResponse, CloudApi, CloudError};
use crate::readings::Reading;

#[derive(Debug, Default, Clone)]
pub struct FakeCloud {
    inner: Arc<Mutex<FakeCloudInner>>,
}

#[derive(Debug, Default)]
struct FakeCloudInner {
    uploads: Vec<Vec<Reading>>,
    status_calls: usize,
    unpair_calls: usize,
    status: StatusResponse,
    upload_failures: VecDeque<CloudError>,
    status_failures: VecDeque<CloudError>,
    unpair_result: Option<Result<bool, CloudError>>,
    status_delay: Option<Duration>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status returned by every successful `get_status`.
    pub fn set_status(&self, status: StatusResponse) {
        self.inner.lock().unwrap().status = status;
    }

    /// Fail the next upload with `error`. Queued failures are used in order.
    pub fn fail_next_upload(&self, error: CloudError) {
        self.inner.lock().unwrap().upload_failures.push_back(error);
    }

    /// Fail the next status call with `error`.
    pub fn fail_next_status(&self, error: CloudError) {
        self.inner.lock().unwrap().status_failures.push_back(error);
    }

    /// Make every status call take `delay` before answering.
    pub fn delay_status(&self, delay: Duration) {
        self.inner.lock().unwrap().status_delay = Some(delay);
    }

    pub fn set_unpair_result(&self, result: Result<bool, CloudError>) {
        self.inner.lock().unwrap().unpair_result = Some(result);
    }

    /// Every batch passed to `post_readings`, failed attempts included.
    pub fn uploads(&self) -> Vec<Vec<Reading>> {
        self.inner.lock().unwrap().uploads.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.inner.lock().unwrap().status_calls
    }

    pub fn unpair_calls(&self) -> usize {
        self.inner.lock().unwrap().unpair_calls
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn post_readings(&self, readings: &[Reading]) -> Result<Value, CloudError> {
        let mut inner = self.inner.lock().unwrap();
        inner.uploads.push(readings.to_vec());
        match inner.upload_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(json!({ "accepted": readings.len() })),
        }
    }

    async fn get_status(&self) -> Result<StatusResponse, CloudError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.status_calls += 1;
            inner.status_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        match inner.status_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(inner.status.clone()),
        }
    }

    async fn unpair(&self) -> Result<bool, CloudError> {
        let mut inner = self.inner.lock().unwrap();
        inner.unpair_calls += 1;
        inner.unpair_result.clone().unwrap_or(Ok(true))
    }
}
