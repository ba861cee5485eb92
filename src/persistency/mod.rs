//! Durable storage for metadata and content.

pub mod store;

pub use store::Persistence;
