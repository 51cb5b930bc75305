//! Booking lifecycle: creation, reads scoped to the two parties, and the
//! status state machine.
//!
//! Every status change goes through [`BookingLifecycle::transition`], which
//! checks (in order) that the booking exists, that the actor is one of its
//! parties, that the transition table has the edge, and that the actor
//! holds the role the edge requires. The write is a compare-and-swap on the
//! status that was read, so two racing transitions cannot both succeed.
//! The counterparty notification is sent after the write commits and its
//! failure never fails the call.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::errors::AppError;
use crate::models::{
    Booking, BookingDetails, BookingPage, BookingStatus, CreateBookingRequest, Identity,
    NewNotification, Pagination, Role, TransitionRequest, UnknownStatus,
};
use crate::services::notifications::NotificationSink;
use crate::services::store::BookingStore;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

pub struct BookingLifecycle {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl BookingLifecycle {
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub fn create_booking(
        &self,
        caller: &Identity,
        request: CreateBookingRequest,
    ) -> Result<Booking, AppError> {
        if caller.role != Role::Client {
            return Err(AppError::Forbidden("only clients can create bookings".to_string()));
        }

        let worker_id = required(request.worker_id, "worker_id")?;
        let service_id = required(request.service_id, "service_id")?;
        let scheduled_date = parse_date(&required(request.scheduled_date, "scheduled_date")?)?;
        let start = parse_time(
            &required(request.scheduled_start_time, "scheduled_start_time")?,
            "scheduled_start_time",
        )?;
        let end = parse_time(
            &required(request.scheduled_end_time, "scheduled_end_time")?,
            "scheduled_end_time",
        )?;

        if end <= start {
            return Err(AppError::Validation(
                "scheduled_end_time must be after scheduled_start_time".to_string(),
            ));
        }
        check_coordinates(request.location_lat, request.location_lng)?;
        if request.estimated_cost.is_some_and(|cost| !cost.is_finite() || cost < 0.0) {
            return Err(AppError::Validation(
                "estimated_cost must be a non-negative amount".to_string(),
            ));
        }

        let worker = self
            .store
            .find_user(&worker_id)?
            .filter(|user| user.role == Role::Worker)
            .ok_or_else(|| AppError::NotFound(format!("worker {worker_id}")))?;
        if !worker.is_active {
            return Err(AppError::InvalidState(format!(
                "worker {worker_id} is not currently active"
            )));
        }

        let service = self
            .store
            .find_service(&service_id)?
            .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))?;
        if !service.is_active {
            return Err(AppError::InvalidState(format!(
                "service {service_id} is not currently offered"
            )));
        }

        let now = now();
        let booking = Booking {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: caller.user_id.clone(),
            worker_id,
            service_id,
            scheduled_date,
            scheduled_start_time: start,
            scheduled_end_time: end,
            status: BookingStatus::Pending,
            location_address: request.location_address,
            location_lat: request.location_lat,
            location_lng: request.location_lng,
            estimated_cost: request.estimated_cost,
            client_notes: request.client_notes,
            worker_notes: None,
            cancellation_reason: None,
            cancelled_by: None,
            actual_start_time: None,
            actual_end_time: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_booking(&booking)?;
        tracing::info!(
            booking_id = %booking.id,
            client_id = %booking.client_id,
            worker_id = %booking.worker_id,
            "booking created"
        );

        self.send_notification(NewNotification {
            user_id: booking.worker_id.clone(),
            title: "New Booking Request".to_string(),
            body: format!(
                "You have a new {} request for {} at {}.",
                service.name,
                booking.scheduled_date.format("%Y-%m-%d"),
                booking.scheduled_start_time.format("%H:%M"),
            ),
            kind: "booking_request".to_string(),
            data: serde_json::json!({ "booking_id": booking.id }),
        });

        Ok(booking)
    }

    pub fn get_booking(&self, booking_id: &str, actor_id: &str) -> Result<BookingDetails, AppError> {
        let details = self
            .store
            .find_booking_details(booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

        if details.booking.party_role(actor_id).is_none() {
            return Err(AppError::Forbidden(
                "not a participant of this booking".to_string(),
            ));
        }

        Ok(details)
    }

    pub fn list_bookings(
        &self,
        caller: &Identity,
        status: Option<BookingStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<BookingPage, AppError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let offset = offset.unwrap_or(0).max(0);

        let (bookings, total) =
            self.store
                .list_bookings(&caller.user_id, caller.role, status, limit, offset)?;

        Ok(BookingPage {
            bookings,
            pagination: Pagination {
                total,
                limit,
                offset,
            },
        })
    }

    pub fn transition(
        &self,
        booking_id: &str,
        actor_id: &str,
        request: TransitionRequest,
    ) -> Result<Booking, AppError> {
        let target: BookingStatus = request
            .status
            .parse()
            .map_err(|e: UnknownStatus| AppError::Validation(e.to_string()))?;

        let booking = self
            .store
            .find_booking(booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

        let role = booking.party_role(actor_id).ok_or_else(|| {
            AppError::Forbidden("not a participant of this booking".to_string())
        })?;

        let required = booking
            .status
            .required_actor(target)
            .ok_or(AppError::InvalidTransition {
                from: booking.status,
                to: target,
            })?;

        if !required.permits(role) {
            return Err(AppError::Forbidden(format!(
                "a {role} cannot move a booking to {target}"
            )));
        }

        let updated = booking.with_transition(
            target,
            actor_id,
            request.cancellation_reason,
            request.worker_notes,
            now(),
        );

        if !self.store.update_booking_if_status(&updated, booking.status)? {
            tracing::warn!(booking_id, expected = %booking.status, "lost status update race");
            return Err(AppError::Conflict(booking_id.to_string()));
        }

        tracing::info!(
            booking_id,
            actor_id,
            from = %booking.status,
            to = %target,
            "booking status changed"
        );

        self.send_notification(NewNotification {
            user_id: updated.counterparty(actor_id).to_string(),
            title: format!("Booking {}", target.label()),
            body: format!(
                "Your booking for {} is now {}.",
                updated.scheduled_date.format("%Y-%m-%d"),
                target.label().to_lowercase(),
            ),
            kind: "booking_update".to_string(),
            data: serde_json::json!({ "booking_id": updated.id, "status": target }),
        });

        Ok(updated)
    }

    fn send_notification(&self, notification: NewNotification) {
        let user_id = notification.user_id.clone();
        if let Err(e) = self.notifier.notify(notification) {
            tracing::error!(user_id = %user_id, error = %e, "failed to send notification");
        }
    }
}

/// Timestamps are stored at second precision, so drop the fraction up front
/// and keep the returned booking identical to what a re-read would give.
fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))
}

fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::Validation(format!("scheduled_date must be YYYY-MM-DD, got {value}"))
    })
}

fn parse_time(value: &str, field: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| AppError::Validation(format!("{field} must be HH:MM, got {value}")))
}

fn check_coordinates(lat: Option<f64>, lng: Option<f64>) -> Result<(), AppError> {
    if lat.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
        return Err(AppError::Validation("location_lat out of range".to_string()));
    }
    if lng.is_some_and(|lng| !(-180.0..=180.0).contains(&lng)) {
        return Err(AppError::Validation("location_lng out of range".to_string()));
    }
    Ok(())
}
