//! Scripted origin shared by the tests of this crate.

use async_trait::async_trait;
use chorale_fetch::error::{ErrorKind, Result};
use chorale_fetch::{FetchMode, Fetcher};
use chorale_storage::AssetUrl;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Default)]
pub(crate) struct FakeOrigin {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(String, FetchMode)>>,
    delay: Option<Duration>,
}

impl FakeOrigin {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub(crate) fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    pub(crate) fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<(String, FetchMode)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(called, _)| called == url).count()
    }
}

#[async_trait]
impl Fetcher for FakeOrigin {
    async fn fetch(&self, url: &AssetUrl, mode: FetchMode) -> Result<Vec<u8>> {
        self.calls.lock().unwrap().push((url.to_string(), mode));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Network("offline".to_string()));
        }
        if self.failing.lock().unwrap().contains(url.as_str()) {
            exn::bail!(ErrorKind::Status(503));
        }
        let body = self.bodies.lock().unwrap().get(url.as_str()).cloned();
        match body {
            Some(body) => Ok(body),
            None => exn::bail!(ErrorKind::Status(404)),
        }
    }
}
