use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::time::Instant;

use crate::cloud::{Capability, CloudTransport, StatusReply, SubmitAck, TransportError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloud transport that replays queued responses.
///
/// Submits answer from the submit queue, falling back to `{job_id: "job-1"}`.
/// Polls answer from the status queue, falling back to the default status
/// (`queued` unless changed). Call instants use tokio time, so they are
/// exact under a paused clock.
pub struct ScriptedTransport {
    submits: Mutex<VecDeque<Result<SubmitAck, TransportError>>>,
    statuses: Mutex<VecDeque<Result<StatusReply, TransportError>>>,
    default_status: Mutex<StatusReply>,
    submit_calls: Mutex<Vec<Instant>>,
    status_calls: Mutex<Vec<Instant>>,
    payloads: Mutex<Vec<(Capability, Value)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            submits: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            default_status: Mutex::new(StatusReply::queued()),
            submit_calls: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn push_submit(&self, response: Result<SubmitAck, TransportError>) -> &Self {
        lock(&self.submits).push_back(response);
        self
    }

    pub fn push_status(&self, response: Result<StatusReply, TransportError>) -> &Self {
        lock(&self.statuses).push_back(response);
        self
    }

    pub fn set_default_status(&self, reply: StatusReply) {
        *lock(&self.default_status) = reply;
    }

    pub fn submit_calls(&self) -> usize {
        lock(&self.submit_calls).len()
    }

    pub fn status_calls(&self) -> usize {
        lock(&self.status_calls).len()
    }

    pub fn submit_instants(&self) -> Vec<Instant> {
        lock(&self.submit_calls).clone()
    }

    pub fn status_instants(&self) -> Vec<Instant> {
        lock(&self.status_calls).clone()
    }

    /// Submitted bodies in call order.
    pub fn payloads(&self) -> Vec<(Capability, Value)> {
        lock(&self.payloads).clone()
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudTransport for ScriptedTransport {
    fn submit<'a>(
        &'a self,
        capability: Capability,
        payload: &'a Value,
    ) -> BoxFuture<'a, Result<SubmitAck, TransportError>> {
        lock(&self.submit_calls).push(Instant::now());
        lock(&self.payloads).push((capability, payload.clone()));
        let response = lock(&self.submits).pop_front().unwrap_or_else(|| {
            Ok(SubmitAck {
                job_id: "job-1".to_string(),
            })
        });
        futures::future::ready(response).boxed()
    }

    fn status<'a>(
        &'a self,
        _capability: Capability,
        _job_id: &'a str,
    ) -> BoxFuture<'a, Result<StatusReply, TransportError>> {
        lock(&self.status_calls).push(Instant::now());
        let response = lock(&self.statuses)
            .pop_front()
            .unwrap_or_else(|| Ok(lock(&self.default_status).clone()));
        futures::future::ready(response).boxed()
    }
}
