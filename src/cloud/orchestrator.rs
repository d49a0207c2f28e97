//! Cloud job lifecycle: submit, poll, retry, complete or fail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::config::{CloudConfig, CloudMode};
use crate::error::{ProcessingError, ProcessingErrorKind};
use crate::processing::now_timestamp_ms;

use super::mock::MockProvider;
use super::retry::RetryPolicy;
use super::transport::{CloudTransport, HttpTransport};
use super::types::{Capability, CloudJob, CloudRequest, CloudResult, JobStatus, PollPolicy};

/// How the orchestrator reaches a cloud API. Chosen once at construction.
#[derive(Clone)]
pub enum CloudBackend {
    /// Results are synthesized at submit time; nothing is polled
    Mock(MockProvider),
    Remote(Arc<dyn CloudTransport>),
}

impl CloudBackend {
    pub fn from_config(config: &CloudConfig) -> Self {
        match config.mode {
            CloudMode::Mock => CloudBackend::Mock(MockProvider::new()),
            CloudMode::Live => CloudBackend::Remote(Arc::new(HttpTransport::new(config))),
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, CloudBackend::Mock(_))
    }
}

/// Reference to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub capability: Capability,
}

/// Outcome of `submit`.
#[derive(Debug, Clone)]
pub enum Submission {
    /// Queued on the server; await it with `await_completion`
    Job(JobHandle),
    /// Produced inline by the mock provider
    Completed(CloudResult),
}

type SharedOutcome = Shared<BoxFuture<'static, Result<CloudResult, ProcessingError>>>;

struct JobEntry {
    record: CloudJob,
    original_uri: String,
    cancel: CancellationToken,
    /// Poll chain shared by every awaiter of this job
    waiter: Option<SharedOutcome>,
    awaiters: usize,
}

/// Registered for each `await_completion` call while it is pending.
///
/// When the last awaiter goes away without the job having finished, the
/// poll chain is dropped with it, so the record is removed as well.
struct AwaiterGuard {
    inner: Arc<Inner>,
    job_id: String,
}

impl Drop for AwaiterGuard {
    fn drop(&mut self) {
        let mut jobs = self.inner.lock_jobs();
        let abandoned = match jobs.get_mut(&self.job_id) {
            Some(entry) => {
                entry.awaiters = entry.awaiters.saturating_sub(1);
                entry.awaiters == 0 && entry.waiter.is_some()
            }
            None => false,
        };
        if abandoned {
            if let Some(entry) = jobs.remove(&self.job_id) {
                entry.cancel.cancel();
                tracing::info!(job_id = %self.job_id, "[CloudJobs] Job abandoned by all awaiters");
            }
        }
    }
}

struct Inner {
    backend: CloudBackend,
    retry: RetryPolicy,
    default_poll: PollPolicy,
    jobs: Mutex<HashMap<String, JobEntry>>,
}

/// Tracks in-flight cloud jobs.
///
/// Jobs are keyed by id and share no state with each other. A record lives
/// from submit until its terminal result has been delivered, or until every
/// awaiter has been dropped. A submitted job that was never awaited stays
/// until it is cancelled. Cloning yields another handle onto the same job
/// table.
#[derive(Clone)]
pub struct CloudOrchestrator {
    inner: Arc<Inner>,
}

impl CloudOrchestrator {
    pub fn new(backend: CloudBackend, retry: RetryPolicy, default_poll: PollPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                retry,
                default_poll,
                jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn default_poll(&self) -> PollPolicy {
        self.inner.default_poll
    }

    pub fn is_mock(&self) -> bool {
        self.inner.backend.is_mock()
    }

    /// Validate and submit a request.
    ///
    /// Options are checked before any network call. The submit call itself
    /// is retried on transport failures.
    pub async fn submit(&self, request: &CloudRequest) -> Result<Submission, ProcessingError> {
        request.validate()?;
        let capability = request.capability();

        let transport = match &self.inner.backend {
            CloudBackend::Mock(provider) => {
                return Ok(Submission::Completed(provider.complete(request)));
            }
            CloudBackend::Remote(transport) => Arc::clone(transport),
        };

        let payload = request.payload();
        let transport = transport.as_ref();
        let ack = self
            .inner
            .retry
            .run("submit", || transport.submit(capability, &payload))
            .await?;

        tracing::info!(
            job_id = %ack.job_id,
            capability = %capability,
            "[CloudJobs] Submitted job"
        );

        self.inner.lock_jobs().insert(
            ack.job_id.clone(),
            JobEntry {
                record: CloudJob::new(ack.job_id.clone(), capability),
                original_uri: request.source_uri.clone(),
                cancel: CancellationToken::new(),
                waiter: None,
                awaiters: 0,
            },
        );

        Ok(Submission::Job(JobHandle {
            job_id: ack.job_id,
            capability,
        }))
    }

    /// Poll a job until it reaches a terminal state.
    ///
    /// At most `policy.max_attempts` status polls are issued, spaced by the
    /// poll interval, before the job is reported as `Timeout`. A second call
    /// for a job that is already being awaited attaches to the same poll
    /// chain instead of starting another one.
    pub async fn await_completion(
        &self,
        handle: &JobHandle,
        policy: PollPolicy,
    ) -> Result<CloudResult, ProcessingError> {
        let (outcome, _guard) = {
            let mut jobs = self.inner.lock_jobs();
            let entry = jobs.get_mut(&handle.job_id).ok_or_else(|| {
                ProcessingError::cloud(ProcessingErrorKind::UnknownJob {
                    job_id: handle.job_id.clone(),
                })
            })?;
            entry.awaiters += 1;
            let guard = AwaiterGuard {
                inner: Arc::clone(&self.inner),
                job_id: handle.job_id.clone(),
            };

            let outcome = match &entry.waiter {
                Some(waiter) => {
                    tracing::debug!(job_id = %handle.job_id, "[CloudJobs] Joining in-flight poll");
                    waiter.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let job = handle.clone();
                    let original_uri = entry.original_uri.clone();
                    let cancel = entry.cancel.clone();
                    let waiter = async move {
                        inner
                            .poll_until_terminal(job, original_uri, cancel, policy)
                            .await
                    }
                    .boxed()
                    .shared();
                    entry.waiter = Some(waiter.clone());
                    waiter
                }
            };
            (outcome, guard)
        };

        outcome.await
    }

    /// Submit and, when queued, await with `policy`.
    pub async fn run(
        &self,
        request: &CloudRequest,
        policy: PollPolicy,
    ) -> Result<CloudResult, ProcessingError> {
        match self.submit(request).await? {
            Submission::Completed(result) => Ok(result),
            Submission::Job(handle) => self.await_completion(&handle, policy).await,
        }
    }

    /// Snapshot of an in-flight job record.
    pub fn job(&self, job_id: &str) -> Option<CloudJob> {
        self.inner
            .lock_jobs()
            .get(job_id)
            .map(|entry| entry.record.clone())
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock_jobs().len()
    }

    /// Stop polling a job; its awaiters resolve with `Cancelled`.
    ///
    /// A job nobody awaits is removed right away. Returns false for unknown
    /// or already-consumed jobs.
    pub fn cancel(&self, job_id: &str) -> bool {
        let mut jobs = self.inner.lock_jobs();
        let idle = match jobs.get(job_id) {
            Some(entry) => {
                entry.cancel.cancel();
                tracing::info!(job_id, "[CloudJobs] Cancel requested");
                entry.waiter.is_none()
            }
            None => return false,
        };
        if idle {
            jobs.remove(job_id);
        }
        true
    }

    pub fn cancel_all(&self) {
        for entry in self.inner.lock_jobs().values() {
            entry.cancel.cancel();
        }
    }
}

impl Inner {
    fn lock_jobs(&self) -> MutexGuard<'_, HashMap<String, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_until_terminal(
        self: Arc<Self>,
        job: JobHandle,
        original_uri: String,
        cancel: CancellationToken,
        policy: PollPolicy,
    ) -> Result<CloudResult, ProcessingError> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProcessingError::cloud(ProcessingErrorKind::Cancelled {
                job_id: job.job_id.clone(),
            })),
            outcome = self.poll_loop(&job, &original_uri, policy) => outcome,
        };

        match &outcome {
            Ok(_) => tracing::info!(job_id = %job.job_id, "[CloudJobs] Job succeeded"),
            Err(err) => tracing::warn!(job_id = %job.job_id, error = %err, "[CloudJobs] Job ended"),
        }

        // Terminal result delivered; the record is no longer needed.
        self.lock_jobs().remove(&job.job_id);
        outcome
    }

    async fn poll_loop(
        &self,
        job: &JobHandle,
        original_uri: &str,
        policy: PollPolicy,
    ) -> Result<CloudResult, ProcessingError> {
        let transport = match &self.backend {
            CloudBackend::Remote(transport) => Arc::clone(transport),
            CloudBackend::Mock(_) => {
                return Err(ProcessingError::cloud(ProcessingErrorKind::UnknownJob {
                    job_id: job.job_id.clone(),
                }))
            }
        };
        let transport = transport.as_ref();
        let job_id = job.job_id.as_str();
        let max_polls = policy.max_attempts.max(1);

        for poll in 1..=max_polls {
            let reply = match self
                .retry
                .run("status", || transport.status(job.capability, job_id))
                .await
            {
                Ok(reply) => reply,
                Err(err) => {
                    self.record(job_id, None, Some(err.to_string()));
                    return Err(err);
                }
            };

            self.record(job_id, Some(reply.status), reply.error.clone());
            tracing::debug!(job_id, poll, status = ?reply.status, "[CloudJobs] Polled job");

            match reply.status {
                JobStatus::Succeeded => {
                    return reply.into_result(
                        job_id,
                        job.capability,
                        original_uri,
                        now_timestamp_ms(),
                    );
                }
                JobStatus::Failed => {
                    return Err(ProcessingError::cloud(ProcessingErrorKind::JobFailed {
                        job_id: job_id.to_string(),
                        message: reply
                            .error
                            .unwrap_or_else(|| "no reason given".to_string()),
                    }));
                }
                JobStatus::Queued | JobStatus::Processing => {}
            }

            if poll < max_polls {
                tokio::time::sleep(policy.interval()).await;
            }
        }

        Err(ProcessingError::cloud(ProcessingErrorKind::Timeout {
            job_id: job_id.to_string(),
            attempts: max_polls,
        }))
    }

    fn record(&self, job_id: &str, status: Option<JobStatus>, error: Option<String>) {
        if let Some(entry) = self.lock_jobs().get_mut(job_id) {
            let record = &mut entry.record;
            if let Some(status) = status {
                record.attempts += 1;
                if !record.advance(status) && status != record.status {
                    log::warn!(
                        "[CloudJobs] Ignoring backwards status {:?} -> {:?} for {}",
                        record.status,
                        status,
                        job_id
                    );
                }
            }
            if error.is_some() {
                record.last_error = error;
            }
        }
    }
}
