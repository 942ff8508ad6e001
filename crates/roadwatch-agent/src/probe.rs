// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connectivity prober
//!
//! Each sync cycle starts with a short reachability check. A failed check
//! skips the cycle without touching the queue.

use reqwest::{Client, StatusCode};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Why a probe reported the sink unreachable. Logged, never propagated.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe transport error: {0}")]
    Transport(String),

    #[error("health endpoint answered {0}")]
    Unhealthy(StatusCode),
}

/// Reachability probe trait
pub trait Prober: Send + Sync {
    /// `true` when the sink answered its health check in time.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}

impl<P: Prober> Prober for std::sync::Arc<P> {
    fn is_reachable(&self) -> impl Future<Output = bool> + Send {
        (**self).is_reachable()
    }
}

/// HTTP GET against the sink's health surface.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probe with the failure reason kept.
    pub async fn check(&self) -> Result<(), ProbeError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Unhealthy(status))
        }
    }
}

impl Prober for HttpProber {
    async fn is_reachable(&self) -> bool {
        // Outer bound, name resolution included
        match tokio::time::timeout(self.timeout, self.check()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!("Sink probe failed for {}: {}", self.url, e);
                false
            }
            Err(_) => {
                let err = ProbeError::Timeout(self.timeout);
                tracing::debug!("Sink probe failed for {}: {}", self.url, err);
                false
            }
        }
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Prober with a switchable answer.
#[derive(Debug)]
pub struct MockProber {
    reachable: AtomicBool,
    probes: AtomicU64,
}

impl MockProber {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            probes: AtomicU64::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of probes performed.
    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::SeqCst)
    }
}

impl Prober for MockProber {
    async fn is_reachable(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}
