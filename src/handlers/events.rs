use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream, WatchStream};
use tokio_stream::{Stream, StreamExt};

use crate::handlers::session::bearer_token;
use crate::state::AppState;

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

// GET /api/events?flow=<id>&token=<access token>
#[derive(Deserialize)]
pub struct EventsQuery {
    /// Booking flow whose notices this client follows.
    pub flow: Option<String>,
    /// EventSource cannot set headers, so the token may come in the query.
    pub token: Option<String>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let flow = query.flow;
    let notices = BroadcastStream::new(state.notices.subscribe()).filter_map(move |result| {
        match result {
            Ok(notice) if notice.is_visible_to(flow.as_deref()) => {
                let data = serde_json::to_string(&notice).unwrap_or_default();
                Some(Ok(Event::default().data(data).event("notice")))
            }
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notice stream lagged");
                None
            }
        }
    });

    // driving updates only for a signed-in caller, and only their own
    let token = query
        .token
        .or_else(|| bearer_token(&headers).map(str::to_string))
        .filter(|token| state.sessions.current_session(token).is_some());
    let driving: EventStream = match token {
        Some(token) => Box::pin(WatchStream::new(state.driving.mode(&token).subscribe()).map(
            |snapshot| {
                let data = serde_json::to_string(&snapshot).unwrap_or_default();
                Ok(Event::default().data(data).event("driving"))
            },
        )),
        None => Box::pin(tokio_stream::empty()),
    };

    let keepalive = IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
        .map(|_| Ok(Event::default().comment("keepalive")));

    Sse::new(notices.merge(driving).merge(keepalive))
}
