//! Concurrent host provisioning against the Foreman management API.
//!
//! Hosts listed in a YAML template are queued as jobs and drained by a fixed
//! pool of workers. Each job is checked for an existing host first, has its
//! host group, subnet and compute profile names resolved to ids, and is then
//! submitted as a create request. A failed job is logged and never stops the
//! rest of the batch.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use foreman_host_builder::{
//!     config, template, ForemanClient, HostJobProcessor, JobQueue, ShutdownCoordinator,
//!     WorkerPool,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_or_create("builder.toml".as_ref())?;
//!     let queue: Arc<JobQueue> = Arc::new(template::load_jobs("hosts.yaml".as_ref())?.into_iter().collect());
//!
//!     let processor = HostJobProcessor::new(Arc::new(ForemanClient::new(&config)?));
//!     let shutdown = ShutdownCoordinator::new();
//!     shutdown.listen()?;
//!
//!     let summary = WorkerPool::new(8, queue, processor).run(&shutdown.token()).await;
//!     println!("created {} hosts", summary.tally.created);
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod job;
pub mod pool;
pub mod processor;
pub mod queue;
pub mod remote;
pub mod shutdown;
pub mod template;

pub use config::ClientConfig;
pub use job::{HostPayload, Job, ReferenceKind};
pub use pool::{RunSummary, WorkerPool};
pub use processor::{HostJobProcessor, Outcome, ProcessError};
pub use queue::JobQueue;
pub use remote::foreman::ForemanClient;
pub use remote::{HostRecord, RemoteClient, RemoteError};
pub use shutdown::ShutdownCoordinator;
