//! Live SSE streams

use super::{caller, ScopeQuery};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use ctf_types::ChallengeId;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::watch;

/// Turn a watch channel into an SSE stream: the current value first, then
/// every change. `keep` is held for the lifetime of the stream.
fn watch_stream<T, K>(
    receiver: watch::Receiver<T>,
    keep: K,
    event_name: &'static str,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    T: Serialize + Clone + Send + Sync + 'static,
    K: Send + 'static,
{
    stream::unfold(
        (receiver, keep, true),
        move |(mut rx, keep, mut first)| async move {
            loop {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                first = false;
                let value = rx.borrow_and_update().clone();
                if let Some(event) = frame(event_name, &value) {
                    return Some((Ok(event), (rx, keep, false)));
                }
            }
        },
    )
}

/// Serialize one SSE frame; an unserializable value is logged and skipped.
fn frame<T: Serialize>(event_name: &'static str, value: &T) -> Option<Event> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Event::default().event(event_name).data(json)),
        Err(err) => {
            tracing::warn!(event = event_name, error = %err, "dropping unserializable stream frame");
            None
        }
    }
}

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("ping")
}

/// Stream the caller's progress on a challenge
pub async fn stream_progress(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let user_id = caller(&headers)?;
    let watcher = state
        .engine
        .watch_progress(&ChallengeId::new(challenge_id), &user_id, &query.event())
        .await?;
    let receiver = watcher.subscribe();

    Ok(Sse::new(watch_stream(receiver, watcher, "progress")).keep_alive(keep_alive()))
}

/// Stream the event-wide solver count of a challenge
pub async fn stream_solvers(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let counter = state
        .engine
        .watch_solvers(&ChallengeId::new(challenge_id), &query.event())
        .await?;
    let receiver = counter.subscribe();

    Ok(Sse::new(watch_stream(receiver, counter, "solvers")).keep_alive(keep_alive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("not representable"))
        }
    }

    #[test]
    fn frame_skips_unserializable_values() {
        assert!(frame("progress", &Unserializable).is_none());
        assert!(frame("solvers", &3usize).is_some());
    }
}
