//! Host plugin protocol (`hemmer.provider.v1`).
//!
//! The message types follow `proto/provider.proto`; the service module routes
//! gRPC calls to a [`service::Provider`] implementation. Provider code should
//! not need either directly: [`crate::server`] adapts them to
//! [`crate::ProviderService`].

#![allow(missing_docs)]

mod messages;
pub mod service;

pub use messages::*;
pub use service::{ProviderServer, SERVICE_NAME};
