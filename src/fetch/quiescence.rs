//! Network quiescence tracking
//!
//! A page is considered rendered once no resource loads have been in flight
//! for a debounce window, or once a hard deadline passes, whichever comes
//! first. The browser engine's driver script makes this decision itself; the
//! fetcher mirrors it from the engine's event log with a [`FetchSession`] so
//! it knows when the engine is overdue.

use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep, sleep};
use tracing::trace;

/// Debounce window used when none is configured
pub const DEFAULT_RESOURCE_WAIT: Duration = Duration::from_millis(300);
/// Hard deadline used when none is configured
pub const DEFAULT_MAX_RENDER_WAIT: Duration = Duration::from_secs(10);

/// One line of the engine's resource log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    Requested { id: u64 },
    /// `status` is missing for loads that failed
    Received { id: u64, status: Option<u16> },
}

impl ResourceEvent {
    /// Parse a log line. Requests look like `> 3 - http://..`, completed
    /// responses like `3 200 - http://..`. Anything else is not an event.
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(rest) = line.strip_prefix("> ") {
            let id = rest.split_whitespace().next()?.parse().ok()?;
            return Some(Self::Requested { id });
        }

        let mut parts = line.split_whitespace();
        let id = parts.next()?.parse().ok()?;
        let status = parts.next()?.parse().ok();
        (parts.next()? == "-").then_some(Self::Received { id, status })
    }
}

/// Why a page was considered rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleReason {
    /// No loads in flight for a whole debounce window
    Quiescent,
    /// The hard deadline passed first
    Deadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub reason: SettleReason,
    /// Time from the start of the session
    pub elapsed: Duration,
    /// Requests seen in total
    pub requests: usize,
    /// Loads still outstanding when the session settled
    pub in_flight: i64,
}

/// Per-fetch quiescence state: an in-flight counter, a debounce timer armed
/// whenever the counter drops to zero, and a hard deadline armed at creation.
#[derive(Debug)]
pub struct FetchSession {
    started: Instant,
    in_flight: i64,
    requests: usize,
    resource_wait: Duration,
    debounce: Option<Pin<Box<Sleep>>>,
    deadline: Pin<Box<Sleep>>,
}

impl FetchSession {
    pub fn new(resource_wait: Duration, max_render_wait: Duration) -> Self {
        Self {
            started: Instant::now(),
            in_flight: 0,
            requests: 0,
            resource_wait,
            debounce: None,
            deadline: Box::pin(sleep(max_render_wait)),
        }
    }

    pub fn record(&mut self, event: ResourceEvent) {
        match event {
            ResourceEvent::Requested { .. } => {
                self.in_flight += 1;
                self.requests += 1;
                self.debounce = None;
            }
            ResourceEvent::Received { .. } => {
                self.in_flight -= 1;
                if self.in_flight == 0 {
                    self.debounce = Some(Box::pin(sleep(self.resource_wait)));
                }
            }
        }
        trace!(?event, in_flight = self.in_flight, "resource event");
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight
    }

    /// Feed events into the session until the page settles.
    ///
    /// The event channel closing does not settle the page; the timers still
    /// decide.
    pub async fn settle(mut self, mut events: mpsc::Receiver<ResourceEvent>) -> Settlement {
        let mut open = true;

        let reason = loop {
            tokio::select! {
                biased;

                () = &mut self.deadline => break SettleReason::Deadline,
                () = debounce(&mut self.debounce) => break SettleReason::Quiescent,
                event = events.recv(), if open => match event {
                    Some(event) => self.record(event),
                    None => open = false,
                },
            }
        };

        Settlement {
            reason,
            elapsed: self.started.elapsed(),
            requests: self.requests,
            in_flight: self.in_flight,
        }
    }
}

async fn debounce(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.await,
        None => std::future::pending().await,
    }
}
