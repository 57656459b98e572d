//! Role-gated gRPC device catalog.
//!
//! Admins create devices and upload their images, admins and users rate them,
//! and search is open to every caller. Every call passes an access gate that
//! checks the bearer token's role against the method being invoked.
//!
//! - [`store`]: device, image, rating and user stores
//! - [`auth`]: tokens, the access gate and the login service
//! - [`server`]: the device service and server assembly
//! - [`sample`] and [`serializer`]: demo data and file encoding

/// Generated protobuf messages and gRPC stubs.
pub mod proto {
    #![allow(clippy::all, missing_docs)]
    tonic::include_proto!("catalog.v1");
}

pub mod auth;
pub mod error;
pub mod sample;
pub mod serializer;
pub mod server;
pub mod store;

pub use error::{Error, Result};
