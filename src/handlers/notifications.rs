use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::auth::Caller;
use crate::handlers::extract::{PathParam, QueryParams};
use crate::models::Notification;
use crate::state::AppState;

// GET /api/notifications
#[derive(Deserialize)]
pub struct NotificationsQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<i64>,
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    QueryParams(query): QueryParams<NotificationsQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let notifications = queries::list_notifications(
        &*state.conn()?,
        &caller.user_id,
        query.unread_only.unwrap_or(false),
        limit,
    )?;
    Ok(Json(notifications))
}

// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    PathParam(id): PathParam<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = queries::mark_notification_read(&*state.conn()?, &caller.user_id, id)?;
    if !updated {
        return Err(AppError::NotFound(format!("notification {id}")));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

// GET /api/notifications/events — SSE stream
#[derive(Deserialize)]
pub struct EventsQuery {
    pub token: Option<String>,
    pub last_id: Option<i64>,
}

fn to_event(notification: &Notification) -> Event {
    let data = serde_json::to_string(notification).unwrap_or_default();
    Event::default()
        .id(notification.id.to_string())
        .event("notification")
        .data(data)
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    QueryParams(query): QueryParams<EventsQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // EventSource can't set headers, so the token comes in the query string.
    let token = query.token.as_deref().ok_or(AppError::Unauthenticated)?;
    let caller = state.resolve_caller(token)?;

    // Subscribe before the catch-up read so nothing falls between the two.
    let rx = state.notifications_tx.subscribe();
    let catchup = queries::get_notifications_since(
        &*state.conn()?,
        &caller.user_id,
        query.last_id.unwrap_or(0),
    )?;
    let last_seen = catchup.last().map(|n| n.id).unwrap_or(query.last_id.unwrap_or(0));

    let catchup_stream =
        tokio_stream::iter(catchup.into_iter().map(|n| Ok::<_, Infallible>(to_event(&n))));

    let user_id = caller.user_id;
    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(n) if n.user_id == user_id && n.id > last_seen => Some(Ok(to_event(&n))),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "notification feed subscriber lagged");
            None
        }
    });

    let keepalive_stream = IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
        .map(|_| Ok(Event::default().comment("keepalive")));

    let combined = catchup_stream.chain(live_stream);
    Ok(Sse::new(combined.merge(keepalive_stream)))
}
