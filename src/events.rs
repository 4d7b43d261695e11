//! In-process fan-out of donation and sponsor events to live dashboards.

use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use utoipa::ToSchema;

use crate::entities::Tier;

/// Contributions at or above this many cents also go out on the sponsor channel.
pub const SPONSOR_EVENT_MIN_CENTS: i64 = 25_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LiveEvent {
    /// `donation` or `sponsor`.
    pub channel: String,
    pub name: String,
    pub amount: f64,
    pub tier: String,
    pub url: String,
    pub at: DateTime<Utc>,
}

/// Slow subscribers lag and skip events; publishers never wait.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LiveEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    /// Number of subscribers reached; zero when nobody is listening.
    pub fn publish(&self, event: LiveEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Announces a contribution, echoing large ones on the sponsor channel.
    pub fn contribution(&self, name: &str, cents: i64, url: Option<&str>) {
        let name = if name.trim().is_empty() { "Supporter" } else { name.trim() };
        let event = LiveEvent {
            channel: "donation".to_string(),
            name: name.to_string(),
            amount: crate::entities::dollars(cents),
            tier: Tier::from_cents(cents).to_string(),
            url: url.unwrap_or_default().to_string(),
            at: Utc::now(),
        };
        if cents >= SPONSOR_EVENT_MIN_CENTS {
            self.publish(LiveEvent { channel: "sponsor".to_string(), ..event.clone() });
        }
        self.publish(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(256)
    }
}

/// Server-sent events for one subscriber, named after the event channel.
pub fn sse_stream(
    rx: broadcast::Receiver<LiveEvent>,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default().event(event.channel.clone()).json_data(&event);
                    return Some((sse, rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
