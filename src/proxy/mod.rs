//! Pass-through backend for a remote schema registry
//!
//! Identifier assignment, version ordering and compatibility enforcement all
//! belong to the remote service. This module only translates the subject
//! contract into its REST calls and maps its answers and errors back.

mod client;
mod subject;

pub use client::{RemoteRegistry, DEFAULT_COMPATIBILITY, EXPLICIT_COMPATIBILITY};
pub use subject::ProxySubject;
