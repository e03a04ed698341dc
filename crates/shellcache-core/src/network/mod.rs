//! Network transport capability.
//!
//! The coordinator never talks to the network directly; it goes through a
//! `Fetcher`. `HttpFetcher` is the production transport, `StaticFetcher`
//! serves scripted responses for tests and offline demos.

pub mod http;
pub mod scripted;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{Request, Response};

pub use http::HttpFetcher;
pub use scripted::{ScriptedResponse, StaticFetcher};

/// Fetch a resource from the network. Must be idempotent for GET.
///
/// A fetch that produces any HTTP response, including error statuses, is a
/// success at this layer; only transport failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
