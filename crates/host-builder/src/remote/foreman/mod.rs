//! Foreman management API client.
//!
//! Implements [`RemoteClient`](crate::remote::RemoteClient) against the
//! Foreman v2 REST API.

mod client;
mod models;

pub use client::ForemanClient;
pub use models::*;
