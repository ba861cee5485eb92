//! graphfs — the in-process metadata and content cache that projects a
//! OneDrive drive as a POSIX-like filesystem.
//!
//! The crate sits between a FUSE kernel shim and the Microsoft Graph API.
//! Filesystem requests arrive at the [`fuse::GraphFs`] handlers, resolve
//! paths through the lazily populated metadata graph in [`cache`], touch
//! file bodies through the two-tier content store, and only reach the
//! network through the [`remote::RemoteGateway`] capability. A background
//! [`sync::DeltaSynchronizer`] folds server-side changes back into the
//! cache. Token acquisition, URL mounting and the kernel protocol itself
//! all live outside this crate.

pub mod auth;
pub mod cache;
pub mod error;
pub mod fuse;
pub mod persistency;
pub mod remote;
pub mod sync;
