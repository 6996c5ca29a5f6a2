//! Ordered endpoint pool with bounded rotation.
//!
//! The pool never changes after startup. Rotation starts at an arbitrary
//! index and visits every endpoint exactly once, so a failover sweep is
//! always finite.

use std::sync::Arc;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// A candidate JSON-RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEndpoint {
    /// Endpoint URL.
    pub url: String,
    /// Failover priority (0 = tried first on a cold start).
    pub rank: usize,
}

impl NetworkEndpoint {
    /// URL shortened for log lines; provider keys usually sit at the end.
    pub fn display_url(&self) -> &str {
        match self.url.char_indices().nth(40) {
            Some((idx, _)) => &self.url[..idx],
            None => &self.url,
        }
    }
}

/// Fixed, ordered set of endpoints.
#[derive(Debug, Clone)]
pub struct EndpointPool {
    endpoints: Arc<[NetworkEndpoint]>,
}

impl EndpointPool {
    /// Build a pool from URLs; rank follows list order.
    ///
    /// Unparseable URLs are rejected so a typo cannot silently shrink the
    /// failover set.
    pub fn new<I, S>(urls: I) -> BlockchainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut endpoints = Vec::new();
        for (rank, raw) in urls.into_iter().enumerate() {
            let raw = raw.as_ref().trim();
            url::Url::parse(raw).map_err(|e| {
                BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", raw, e))
            })?;
            endpoints.push(NetworkEndpoint {
                url: raw.to_string(),
                rank,
            });
        }
        Ok(Self {
            endpoints: endpoints.into(),
        })
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoint at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&NetworkEndpoint> {
        self.endpoints.get(index)
    }

    /// All endpoints in rank order.
    pub fn endpoints(&self) -> &[NetworkEndpoint] {
        &self.endpoints
    }

    /// Visit every endpoint once, starting at `start` and wrapping around.
    pub fn rotation(&self, start: usize) -> Rotation<'_> {
        let len = self.endpoints.len();
        Rotation {
            endpoints: &self.endpoints,
            start: if len == 0 { 0 } else { start % len },
            step: 0,
        }
    }
}

/// Lazy, finite iterator produced by [`EndpointPool::rotation`].
#[derive(Debug, Clone)]
pub struct Rotation<'a> {
    endpoints: &'a [NetworkEndpoint],
    start: usize,
    step: usize,
}

impl<'a> Iterator for Rotation<'a> {
    type Item = (usize, &'a NetworkEndpoint);

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.endpoints.len();
        if self.step >= len {
            return None;
        }
        let index = (self.start + self.step) % len;
        self.step += 1;
        Some((index, &self.endpoints[index]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.endpoints.len() - self.step;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Rotation<'_> {}
