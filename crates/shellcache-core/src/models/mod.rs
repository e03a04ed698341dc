//! Data models shared by the stores, the provisioner and the router.
//!
//! - `Request`, `Method`, `RequestMode`: an intercepted resource request
//! - `ResourceKey`: canonical identity of a cacheable (GET) request
//! - `Response`: status, headers and body of a fetched resource
//! - `CachedEntry`: an immutable response snapshot held in a store

pub mod entry;
pub mod request;

pub use entry::{CachedEntry, Response};
pub use request::{Method, Request, RequestMode, ResourceKey};
