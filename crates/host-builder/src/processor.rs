//! Per-host create-or-skip logic.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::job::{HostPayload, Job, JobError};
use crate::remote::{RemoteClient, RemoteError};

/// Errors that abandon a single job.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The existence check or a reference lookup failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The job's own fields cannot be submitted.
    #[error(transparent)]
    Job(#[from] JobError),
}

impl ProcessError {
    /// HTTP status behind the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote(e) => e.status(),
            Self::Job(_) => None,
        }
    }
}

/// How a single job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The host was created.
    Created,
    /// A host with this name already existed; nothing was submitted.
    AlreadyExists,
    /// The create request was rejected. The job is not retried.
    PartialFailure,
}

/// Turns jobs into create requests against the management API.
#[derive(Clone)]
pub struct HostJobProcessor {
    client: Arc<dyn RemoteClient>,
}

impl HostJobProcessor {
    /// Create a processor backed by `client`.
    #[must_use]
    pub fn new(client: Arc<dyn RemoteClient>) -> Self {
        Self { client }
    }

    /// Create the host for `job` unless it already exists.
    ///
    /// A rejected create is logged and reported as
    /// [`Outcome::PartialFailure`].
    ///
    /// # Errors
    /// Returns the error from the existence check, a reference lookup or a
    /// malformed reference field; the job is abandoned in that case.
    pub async fn process(&self, job: &Job) -> Result<Outcome, ProcessError> {
        let started = Instant::now();

        info!("Creating host");
        debug!(?job, "Host job");

        let existing = self.client.find_host_by_name_prefix(job.name()).await?;
        if let Some(host) = existing.first() {
            warn!(host_id = host.id, existing = %host.name, "Host already exists");
            return Ok(Outcome::AlreadyExists);
        }

        let payload = self.build_payload(job).await?;
        debug!(payload = %serde_json::Value::Object(payload.clone()), "Host payload");

        match self.client.create_host(payload).await {
            Ok(host) => {
                info!(
                    host_id = host.id,
                    elapsed = format!("{:.2}s", started.elapsed().as_secs_f64()),
                    "Host created"
                );
                Ok(Outcome::Created)
            }
            Err(e) => {
                error!(error = %e, status = ?e.status(), "Failed to create host");
                Ok(Outcome::PartialFailure)
            }
        }
    }

    /// Build the create payload for `job`, resolving its references.
    ///
    /// References without a match are left out of the payload.
    ///
    /// # Errors
    /// Returns an error if a reference field is malformed or its lookup
    /// fails.
    pub async fn build_payload(&self, job: &Job) -> Result<HostPayload, ProcessError> {
        let references = job.references()?;
        let mut payload = job.base_payload();

        for (kind, identifier) in references {
            match self.client.resolve(kind, &identifier).await? {
                Some(id) => {
                    payload.insert(kind.id_field().to_string(), id.into());
                }
                None => {
                    warn!(kind = %kind, identifier = %identifier, "Could not match an id");
                }
            }
        }

        Ok(payload)
    }
}
