use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::auth::Caller;
use crate::handlers::extract::{JsonBody, PathParam, QueryParams};
use crate::models::{
    Booking, BookingDetails, BookingPage, BookingStatus, CreateBookingRequest, TransitionRequest,
};
use crate::state::AppState;

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    JsonBody(body): JsonBody<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.bookings.create_booking(&caller, body)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    QueryParams(query): QueryParams<BookingsQuery>,
) -> Result<Json<BookingPage>, AppError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<BookingStatus>)
        .transpose()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let page = state
        .bookings
        .list_bookings(&caller, status, query.limit, query.offset)?;
    Ok(Json(page))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    PathParam(id): PathParam<String>,
) -> Result<Json<BookingDetails>, AppError> {
    let details = state.bookings.get_booking(&id, &caller.user_id)?;
    Ok(Json(details))
}

// PATCH /api/bookings/:id
pub async fn transition_booking(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    PathParam(id): PathParam<String>,
    JsonBody(body): JsonBody<TransitionRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.bookings.transition(&id, &caller.user_id, body)?;
    Ok(Json(booking))
}
