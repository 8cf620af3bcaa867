//! Retry, stall detection and fallback around one streaming call.
//!
//! An attempt moves through requesting, streaming and then either completes
//! or fails. A failed attempt is retried after a backoff (retryable faults
//! only, while budget remains) or handed to the fallback transports (network
//! faults only, when the [`FallbackPolicy`] applies). Nothing is retried once
//! a delta has reached the caller.

use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::errors::{StreamFault, TimeoutKind};
use crate::core::timeout::{TimeoutController, MAX_TIMEOUT};
use crate::core::transport::{StreamRequest, StreamTransport, TransportChain};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 10_000;

/// When the fallback transports are used after a network fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    Never,
    Always,
    /// Only on the platforms listed in [`StreamPolicy::fallback_platforms`].
    #[default]
    Auto,
}

impl FallbackPolicy {
    pub fn applies_to(self, platform: &str, platforms: &[String]) -> bool {
        match self {
            FallbackPolicy::Never => false,
            FallbackPolicy::Always => true,
            FallbackPolicy::Auto => platforms
                .iter()
                .any(|candidate| candidate.trim().eq_ignore_ascii_case(platform)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPolicy {
    /// Overall bound on one attempt, connect and read included.
    pub request_timeout: Duration,
    /// Longest silence tolerated between valid deltas.
    pub stall_timeout: Duration,
    pub max_retries: u32,
    pub fallback: FallbackPolicy,
    /// Platform names as reported by `std::env::consts::OS`.
    pub fallback_platforms: Vec<String>,
}

impl Default for StreamPolicy {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            max_retries: 0,
            fallback: FallbackPolicy::default(),
            fallback_platforms: default_fallback_platforms(),
        }
    }
}

pub fn default_fallback_platforms() -> Vec<String> {
    vec!["windows".to_string()]
}

impl StreamPolicy {
    pub fn fallback_enabled(&self) -> bool {
        self.fallback
            .applies_to(std::env::consts::OS, &self.fallback_platforms)
    }
}

/// Delay before retry number `retry + 1`: `min(1000 * 2^retry, 10000)` ms.
pub fn backoff_delay(retry: u32) -> Duration {
    let factor = 2_u64.checked_pow(retry).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).min(BACKOFF_CAP_MS))
}

/// State of one attempt. Never outlives [`StreamOrchestrator::run`].
struct StreamSession {
    attempt: u32,
    transport: String,
    text: String,
    chunk_count: usize,
    valid_chunks: usize,
    started_at: Instant,
    last_chunk_at: Option<Instant>,
}

impl StreamSession {
    fn new(attempt: u32, transport: &str) -> Self {
        Self {
            attempt,
            transport: transport.to_string(),
            text: String::new(),
            chunk_count: 0,
            valid_chunks: 0,
            started_at: Instant::now(),
            last_chunk_at: None,
        }
    }

    /// Record a delta. Returns false for blank deltas, which are dropped.
    fn record(&mut self, delta: &str) -> bool {
        self.chunk_count += 1;
        if delta.trim().is_empty() {
            return false;
        }
        self.valid_chunks += 1;
        self.text.push_str(delta);
        self.last_chunk_at = Some(Instant::now());
        true
    }

    fn delivered(&self) -> bool {
        self.valid_chunks > 0
    }
}

pub struct StreamOrchestrator<'a> {
    transports: &'a TransportChain,
    policy: &'a StreamPolicy,
}

impl<'a> StreamOrchestrator<'a> {
    pub fn new(transports: &'a TransportChain, policy: &'a StreamPolicy) -> Self {
        Self { transports, policy }
    }

    /// Stream `request` to completion, calling `on_chunk` with every
    /// non-blank delta in arrival order. Returns the assembled text.
    pub async fn run<F>(
        &self,
        request: &StreamRequest,
        on_chunk: &mut F,
    ) -> Result<String, StreamFault>
    where
        F: FnMut(&str) + Send,
    {
        let mut retry = 0_u32;
        loop {
            let primary = self.transports.primary();
            let mut session = StreamSession::new(retry + 1, primary.name());
            let fault = match self.attempt(primary, request, &mut session, on_chunk).await {
                Ok(()) => return Ok(session.text),
                Err(fault) => fault,
            };

            if session.delivered() {
                warn!(
                    transport = %session.transport,
                    chunks = session.valid_chunks,
                    %fault,
                    "Stream failed after delivering text; not retrying"
                );
                return Err(fault);
            }

            if fault.is_network()
                && self.transports.has_fallbacks()
                && self.policy.fallback_enabled()
            {
                return self
                    .run_fallbacks(request, fault, session.attempt, on_chunk)
                    .await;
            }

            if fault.is_retryable() && retry < self.policy.max_retries {
                let delay = backoff_delay(retry);
                warn!(
                    attempt = session.attempt,
                    max_attempts = self.policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    %fault,
                    "Stream attempt failed; retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
                continue;
            }

            warn!(attempt = session.attempt, %fault, "Stream failed");
            return Err(fault);
        }
    }

    async fn run_fallbacks<F>(
        &self,
        request: &StreamRequest,
        primary_fault: StreamFault,
        attempt: u32,
        on_chunk: &mut F,
    ) -> Result<String, StreamFault>
    where
        F: FnMut(&str) + Send,
    {
        warn!(%primary_fault, "Primary transport failed; trying fallback transports");
        let mut last_fault = primary_fault;
        for transport in self.transports.fallbacks() {
            let mut session = StreamSession::new(attempt, transport.name());
            match self.attempt(transport, request, &mut session, on_chunk).await {
                Ok(()) => {
                    info!(transport = %session.transport, "Fallback transport succeeded");
                    return Ok(session.text);
                }
                Err(fault) if session.delivered() => {
                    warn!(
                        transport = %session.transport,
                        chunks = session.valid_chunks,
                        %fault,
                        "Fallback stream failed after delivering text"
                    );
                    return Err(fault);
                }
                Err(fault) => {
                    warn!(transport = %session.transport, %fault, "Fallback transport failed");
                    last_fault = fault;
                }
            }
        }
        Err(last_fault)
    }

    /// One attempt on one transport. The overall deadline, the stall timer
    /// and the read loop race; whichever settles first ends the attempt and
    /// the others are dropped together with the response stream.
    async fn attempt<F>(
        &self,
        transport: &dyn StreamTransport,
        request: &StreamRequest,
        session: &mut StreamSession,
        on_chunk: &mut F,
    ) -> Result<(), StreamFault>
    where
        F: FnMut(&str) + Send,
    {
        info!(
            platform = std::env::consts::OS,
            endpoint = %request.endpoint,
            model = %request.payload.model,
            transport = %session.transport,
            attempt = session.attempt,
            max_attempts = self.policy.max_retries + 1,
            "Starting stream attempt"
        );

        let deadline = TimeoutController::arm(self.policy.request_timeout);
        let mut deltas = tokio::select! {
            opened = transport.open(request, deadline.signal()) => opened?,
            _ = deadline.fired() => return Err(StreamFault::Timeout(TimeoutKind::Request)),
        };
        debug!(
            transport = %session.transport,
            connect_ms = session.started_at.elapsed().as_millis() as u64,
            "Stream opened"
        );

        let stall_timeout = self.policy.stall_timeout.min(MAX_TIMEOUT);
        let stall = tokio::time::sleep(stall_timeout);
        tokio::pin!(stall);

        loop {
            tokio::select! {
                _ = deadline.fired() => {
                    return Err(StreamFault::Timeout(TimeoutKind::Request));
                }
                _ = &mut stall => {
                    warn!(
                        transport = %session.transport,
                        chunks = session.chunk_count,
                        deadline_remaining_ms = deadline.remaining().as_millis() as u64,
                        "No valid data within the stall window"
                    );
                    return Err(StreamFault::Timeout(TimeoutKind::Stall));
                }
                item = deltas.next() => match item {
                    Some(Ok(delta)) => {
                        if session.record(&delta) {
                            on_chunk(&delta);
                            stall.as_mut().reset(Instant::now() + stall_timeout);
                        }
                    }
                    Some(Err(fault)) => return Err(fault),
                    None => break,
                },
            }
        }

        debug!(
            transport = %session.transport,
            chunks = session.chunk_count,
            valid_chunks = session.valid_chunks,
            chars = session.text.len(),
            since_last_chunk_ms = session
                .last_chunk_at
                .map(|at| at.elapsed().as_millis() as u64),
            "Stream closed"
        );

        if !session.delivered() {
            return Err(StreamFault::EmptyResponse);
        }
        Ok(())
    }
}
