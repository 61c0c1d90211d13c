//! Per-household change notifications.
//!
//! Every mutation publishes a [`ServerEvent`] through the hub; connected
//! sessions of the same household receive it over SSE and re-fetch the
//! affected list. Lagging subscribers drop events rather than block the
//! publisher.

use axum::extract::{Extension, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use kinpoints_shared::api::ServerEvent;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::auth::AuthCtx;
use super::identity::require_member;
use super::{AppError, AppState};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Default)]
pub struct EventHub {
    channels: Arc<Mutex<HashMap<i32, broadcast::Sender<ServerEvent>>>>,
}

impl EventHub {
    /// Fan an event out to the household's subscribers. A household with
    /// no open stream has no channel; the event is simply dropped.
    pub fn publish(&self, household_id: i32, event: ServerEvent) {
        let map = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = map.get(&household_id) {
            let _ = tx.send(event);
        }
    }

    pub fn subscribe(&self, household_id: i32) -> broadcast::Receiver<ServerEvent> {
        let mut map = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(household_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[derive(Deserialize)]
pub(super) struct ScopePath {
    household_id: i32,
}

pub async fn api_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ScopePath>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    require_member(&state, &auth, p.household_id).await?;
    let rx = state.events.subscribe(p.household_id);
    // Server shutdown terminates the stream so graceful stop is not held
    // hostage by idle SSE connections
    let shutdown = state.shutdown_token();
    let stream = BroadcastStream::new(rx)
        .filter_map(|res| async move { res.ok() })
        .map(|ev| Event::default().json_data(&ev))
        .take_until(shutdown.cancelled_owned());
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
