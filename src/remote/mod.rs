//! Remote boundary: HTTP plumbing, wire models and the gateway capability.

pub mod gateway;
pub mod http;
pub mod models;

pub use gateway::{GraphGateway, RemoteGateway};
