//! SSE live event stream with replay.
//!
//! Framing: `event: ready` on connect, then each event as
//! `id: <eventId>\ndata: <json>\n\n`, with a `: ping` comment every ~25 s.
//! A reconnect cursor older than the retained buffer gets one
//! `stream.reset` frame (no id) instead of individual events.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use tracing::debug;

use clawboard_events::{BoardEvent, Replay};

use crate::auth::ensure_stream_access;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

fn frame(event: &BoardEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".into());
    match event.event_id {
        Some(id) => Event::default().id(id.to_string()).data(data),
        None => Event::default().data(data),
    }
}

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

pub async fn stream(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    ensure_stream_access(&state.config, &headers, peer, query.token.as_deref())?;

    let cursor = last_event_id(&headers);
    // Subscribe before replay so no event falls between the two.
    let mut subscription = state.hub.subscribe();
    let replay = cursor.map(|since| state.hub.replay(since));
    debug!(?cursor, "sse client connected");

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ready").data("{}"));

        let mut replayed_through = cursor.unwrap_or(0);
        match replay {
            Some(Replay::Reset) => {
                yield Ok(frame(&BoardEvent::reset()));
            }
            Some(Replay::Events(events)) => {
                for event in events {
                    if let Some(id) = event.event_id {
                        replayed_through = replayed_through.max(id);
                    }
                    yield Ok(frame(&event));
                }
            }
            None => {}
        }

        while let Some(event) = subscription.recv().await {
            // Events published between subscribe and replay would arrive
            // twice; the id cursor filters them.
            if event.event_id.map(|id| id <= replayed_through).unwrap_or(false) {
                continue;
            }
            yield Ok(frame(&event));
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(25))
            .text("ping"),
    ))
}
