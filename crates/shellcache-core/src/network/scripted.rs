use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::Fetcher;
use crate::error::FetchError;
use crate::models::{Request, ResourceKey, Response};

/// What a scripted URL does when fetched.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Respond(Response),
    /// Resolve after a delay
    Delayed(Duration, Response),
    /// Transport failure with the given reason
    Fail(String),
    /// Never resolves
    Hang,
}

/// In-memory transport serving scripted responses keyed by URL (fragment
/// ignored). Unknown URLs fail as unreachable. Every fetch is recorded.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    routes: Mutex<HashMap<String, ScriptedResponse>>,
    history: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, scripted: ScriptedResponse) {
        lock(&self.routes).insert(canonical(url), scripted);
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.script(url, ScriptedResponse::Respond(response));
    }

    pub fn fail(&self, url: &str) {
        self.script(url, ScriptedResponse::Fail("scripted failure".to_string()));
    }

    pub fn hang(&self, url: &str) {
        self.script(url, ScriptedResponse::Hang);
    }

    /// Total number of fetches issued
    pub fn calls(&self) -> usize {
        lock(&self.history).len()
    }

    /// Number of fetches issued for one URL
    pub fn calls_for(&self, url: &str) -> usize {
        let url = canonical(url);
        lock(&self.history).iter().filter(|u| **u == url).count()
    }
}

fn canonical(url: &str) -> String {
    match ResourceKey::parse(url) {
        Ok(key) => key.url().to_string(),
        Err(_) => url.to_string(),
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = ResourceKey::from_url(&request.url).url().to_string();
        lock(&self.history).push(url.clone());
        let scripted = lock(&self.routes).get(&url).cloned();

        match scripted {
            Some(ScriptedResponse::Respond(response)) => Ok(response),
            Some(ScriptedResponse::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(ScriptedResponse::Fail(reason)) => Err(FetchError::Unreachable(reason)),
            Some(ScriptedResponse::Hang) => futures::future::pending().await,
            None => Err(FetchError::Unreachable(format!("no route for {}", url))),
        }
    }
}
