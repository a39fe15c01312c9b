//! Moderation verdict polling
//!
//! After an upload the item sits in moderation. The poller asks the status
//! endpoint on a fixed interval until one of:
//! - a verdict (`approved`/`flagged`): listeners are told to refresh;
//! - a 404: the item was deleted elsewhere, listeners are told to resync;
//! - the ceiling: polling stops silently and the item stays pending;
//! - cancellation: the owning surface closed.

use super::http::HttpTransport;
use super::types::{ModerationEvent, ModerationStatus, ModerationTicket, PollOutcome};
use super::upload::Endpoints;
use crate::utils::timer::CancellationToken;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Poll timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Wall-clock limit measured from the start of polling
    pub ceiling: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            ceiling: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: ModerationStatus,
}

enum Check {
    Status(ModerationStatus),
    Gone,
    Retry,
}

/// A running poll
pub struct PollHandle {
    token: CancellationToken,
    task: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the poll to end
    pub async fn join(self) -> PollOutcome {
        self.task.await.unwrap_or(PollOutcome::Cancelled)
    }
}

/// Follows moderation tickets until they settle
#[derive(Clone)]
pub struct VerdictPoller {
    transport: Arc<dyn HttpTransport>,
    endpoints: Endpoints,
    config: PollConfig,
    events: broadcast::Sender<ModerationEvent>,
}

impl VerdictPoller {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: Endpoints, config: PollConfig) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            transport,
            endpoints,
            config,
            events,
        }
    }

    /// Subscribe to refresh/resync notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ModerationEvent> {
        self.events.subscribe()
    }

    /// Poll `ticket` on a background task bound to `token`
    pub fn spawn(&self, ticket: ModerationTicket, token: CancellationToken) -> PollHandle {
        self.spawn_with(ticket, token, |_| {})
    }

    /// Like `spawn`, running `on_done` on the poll task once the outcome is known
    pub fn spawn_with<F>(&self, ticket: ModerationTicket, token: CancellationToken, on_done: F) -> PollHandle
    where
        F: FnOnce(PollOutcome) + Send + 'static,
    {
        let poller = self.clone();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let outcome = poller.run(ticket, task_token).await;
            on_done(outcome.clone());
            outcome
        });
        PollHandle { token, task }
    }

    /// Poll until the ticket settles, times out or `token` is cancelled.
    ///
    /// The first request goes out one interval after the call.
    pub async fn run(&self, ticket: ModerationTicket, token: CancellationToken) -> PollOutcome {
        let started = Instant::now();
        let mut interval =
            tokio::time::interval_at(started + self.config.interval, self.config.interval);
        let mut requests = 0u32;

        tracing::info!("Polling moderation status for {}", ticket);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!("Polling for {} cancelled after {} requests", ticket, requests);
                    return PollOutcome::Cancelled;
                }
                _ = interval.tick() => {}
            }

            if started.elapsed() >= self.config.ceiling {
                // Left pending; dependent views pick it up on their own refresh
                tracing::info!(
                    "Stopped polling {} after {:?} without a verdict",
                    ticket,
                    self.config.ceiling
                );
                return PollOutcome::TimedOut;
            }

            requests += 1;
            let check = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!("Polling for {} cancelled mid-request", ticket);
                    return PollOutcome::Cancelled;
                }
                check = self.check(&ticket) => check,
            };

            match check {
                Check::Status(status) => match status.verdict() {
                    Some(verdict) => {
                        tracing::info!("Moderation verdict for {}: {:?}", ticket, verdict);
                        let _ = self.events.send(ModerationEvent::VerdictReached {
                            ticket: ticket.clone(),
                            verdict,
                        });
                        return PollOutcome::Verdict { verdict };
                    }
                    None => tracing::debug!("{} still pending ({} requests)", ticket, requests),
                },
                Check::Gone => {
                    tracing::info!("{} no longer exists; requesting resync", ticket);
                    let _ = self.events.send(ModerationEvent::TargetGone {
                        ticket: ticket.clone(),
                    });
                    return PollOutcome::Gone;
                }
                Check::Retry => {}
            }
        }
    }

    async fn check(&self, ticket: &ModerationTicket) -> Check {
        let url = self.endpoints.status_url(ticket);
        let response = match self.transport.get(&url).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Status request for {} failed: {:#}", ticket, e);
                return Check::Retry;
            }
        };

        if response.status_code == 404 {
            return Check::Gone;
        }
        if !response.is_success() {
            tracing::warn!(
                "Status request for {} returned {}: {}",
                ticket,
                response.status_code,
                response.body_string()
            );
            return Check::Retry;
        }

        match serde_json::from_slice::<StatusResponse>(&response.body) {
            Ok(parsed) => Check::Status(parsed.status),
            Err(e) => {
                tracing::warn!("Unreadable status for {}: {}", ticket, e);
                Check::Retry
            }
        }
    }
}
