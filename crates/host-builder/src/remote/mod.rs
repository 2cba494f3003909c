//! Management API boundary used by the host processor.

pub mod foreman;
mod traits;

#[cfg(test)]
pub use traits::MockRemoteClient;
pub use traits::{HostRecord, RemoteClient, RemoteError};
