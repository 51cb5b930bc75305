use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::user::Role;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub client_id: String,
    pub worker_id: String,
    pub service_id: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_start_time: NaiveTime,
    pub scheduled_end_time: NaiveTime,
    pub status: BookingStatus,
    pub location_address: Option<String>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub estimated_cost: Option<f64>,
    pub client_notes: Option<String>,
    pub worker_notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub actual_start_time: Option<NaiveDateTime>,
    pub actual_end_time: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A booking joined with the display data shown on its detail page.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub service_name: String,
    pub client_name: String,
    pub worker_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Declined,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

/// Which party may trigger a given transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredActor {
    Client,
    Worker,
    Either,
}

impl RequiredActor {
    pub fn permits(self, role: Role) -> bool {
        match self {
            RequiredActor::Either => true,
            RequiredActor::Client => role == Role::Client,
            RequiredActor::Worker => role == Role::Worker,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown booking status: {0}")]
pub struct UnknownStatus(pub String);

impl BookingStatus {
    pub const ALL: [BookingStatus; 8] = [
        BookingStatus::Pending,
        BookingStatus::Accepted,
        BookingStatus::Declined,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Declined => "declined",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }

    /// Human-readable label used in notification titles.
    pub fn label(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Accepted => "Accepted",
            BookingStatus::Declined => "Declined",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::InProgress => "In Progress",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::NoShow => "No Show",
        }
    }

    /// The transition table. `None` means there is no edge from `self` to `next`.
    pub fn required_actor(&self, next: BookingStatus) -> Option<RequiredActor> {
        use BookingStatus::*;

        match (self, next) {
            (Pending, Accepted) => Some(RequiredActor::Worker),
            (Pending, Declined) => Some(RequiredActor::Worker),
            (Pending, Cancelled) => Some(RequiredActor::Either),
            (Accepted, Confirmed) => Some(RequiredActor::Client),
            (Accepted, Cancelled) => Some(RequiredActor::Either),
            (Confirmed, InProgress) => Some(RequiredActor::Worker),
            (Confirmed, Cancelled) => Some(RequiredActor::Either),
            (InProgress, Completed) => Some(RequiredActor::Worker),
            (InProgress, NoShow) => Some(RequiredActor::Worker),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Declined
                | BookingStatus::Completed
                | BookingStatus::Cancelled
                | BookingStatus::NoShow
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl Booking {
    /// The role `actor_id` holds on this booking, if it is a party at all.
    pub fn party_role(&self, actor_id: &str) -> Option<Role> {
        if self.client_id == actor_id {
            Some(Role::Client)
        } else if self.worker_id == actor_id {
            Some(Role::Worker)
        } else {
            None
        }
    }

    /// The party who did not perform the action.
    pub fn counterparty(&self, actor_id: &str) -> &str {
        if self.client_id == actor_id {
            &self.worker_id
        } else {
            &self.client_id
        }
    }

    /// Returns the booking as it looks after moving to `next`. Performs no
    /// legality checks; callers validate against the transition table first.
    pub fn with_transition(
        &self,
        next: BookingStatus,
        actor_id: &str,
        cancellation_reason: Option<String>,
        worker_notes: Option<String>,
        now: NaiveDateTime,
    ) -> Booking {
        let mut updated = self.clone();
        updated.status = next;
        updated.updated_at = now;

        match next {
            BookingStatus::Cancelled => {
                updated.cancellation_reason = cancellation_reason;
                updated.cancelled_by = Some(actor_id.to_string());
            }
            BookingStatus::InProgress => updated.actual_start_time = Some(now),
            BookingStatus::Completed => updated.actual_end_time = Some(now),
            _ => {}
        }

        if worker_notes.is_some() {
            updated.worker_notes = worker_notes;
        }

        updated
    }
}

/// Body of `POST /api/bookings`. Everything is optional here so that each
/// missing field gets its own validation message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBookingRequest {
    pub worker_id: Option<String>,
    pub service_id: Option<String>,
    pub scheduled_date: Option<String>,
    pub scheduled_start_time: Option<String>,
    pub scheduled_end_time: Option<String>,
    pub location_address: Option<String>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub estimated_cost: Option<f64>,
    pub client_notes: Option<String>,
}

/// Body of `PATCH /api/bookings/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    pub cancellation_reason: Option<String>,
    pub worker_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingPage {
    pub bookings: Vec<Booking>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn sample(status: BookingStatus) -> Booking {
        let created = ts("2025-05-20 08:00:00");
        Booking {
            id: "bk-1".to_string(),
            client_id: "C1".to_string(),
            worker_id: "W1".to_string(),
            service_id: "S1".to_string(),
            scheduled_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            scheduled_start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            scheduled_end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            status,
            location_address: None,
            location_lat: None,
            location_lng: None,
            estimated_cost: None,
            client_notes: None,
            worker_notes: None,
            cancellation_reason: None,
            cancelled_by: None,
            actual_start_time: None,
            actual_end_time: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in BookingStatus::ALL {
            assert_eq!(status.as_str().parse::<BookingStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert_eq!(
            "finished".parse::<BookingStatus>(),
            Err(UnknownStatus("finished".to_string()))
        );
        assert!("Pending".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&BookingStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let status: BookingStatus = serde_json::from_str("\"no_show\"").unwrap();
        assert_eq!(status, BookingStatus::NoShow);
    }

    #[test]
    fn test_labels() {
        assert_eq!(BookingStatus::InProgress.label(), "In Progress");
        assert_eq!(BookingStatus::NoShow.label(), "No Show");
        assert_eq!(BookingStatus::Accepted.label(), "Accepted");
    }

    #[test]
    fn test_transition_table_edges() {
        use BookingStatus::*;

        let edges = [
            (Pending, Accepted, RequiredActor::Worker),
            (Pending, Declined, RequiredActor::Worker),
            (Pending, Cancelled, RequiredActor::Either),
            (Accepted, Confirmed, RequiredActor::Client),
            (Accepted, Cancelled, RequiredActor::Either),
            (Confirmed, InProgress, RequiredActor::Worker),
            (Confirmed, Cancelled, RequiredActor::Either),
            (InProgress, Completed, RequiredActor::Worker),
            (InProgress, NoShow, RequiredActor::Worker),
        ];

        let mut allowed = 0;
        for from in BookingStatus::ALL {
            for to in BookingStatus::ALL {
                let expected = edges
                    .iter()
                    .find(|(f, t, _)| *f == from && *t == to)
                    .map(|(_, _, actor)| *actor);
                assert_eq!(from.required_actor(to), expected, "{from} -> {to}");
                if expected.is_some() {
                    allowed += 1;
                }
            }
        }
        assert_eq!(allowed, edges.len());
    }

    #[test]
    fn test_terminal_states_have_no_edges() {
        for status in BookingStatus::ALL {
            let has_edge = BookingStatus::ALL
                .into_iter()
                .any(|next| status.required_actor(next).is_some());
            assert_eq!(status.is_terminal(), !has_edge, "{status}");
        }
        assert!(BookingStatus::Completed.is_terminal());
        assert!(!BookingStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_no_self_transitions() {
        for status in BookingStatus::ALL {
            assert!(status.required_actor(status).is_none());
        }
    }

    #[test]
    fn test_required_actor_permits() {
        assert!(RequiredActor::Either.permits(Role::Client));
        assert!(RequiredActor::Either.permits(Role::Worker));
        assert!(RequiredActor::Worker.permits(Role::Worker));
        assert!(!RequiredActor::Worker.permits(Role::Client));
        assert!(!RequiredActor::Client.permits(Role::Worker));
    }

    #[test]
    fn test_party_role() {
        let booking = sample(BookingStatus::Pending);
        assert_eq!(booking.party_role("C1"), Some(Role::Client));
        assert_eq!(booking.party_role("W1"), Some(Role::Worker));
        assert_eq!(booking.party_role("C2"), None);
        assert_eq!(booking.counterparty("C1"), "W1");
        assert_eq!(booking.counterparty("W1"), "C1");
    }

    #[test]
    fn test_cancel_records_reason_and_actor() {
        let now = ts("2025-05-21 10:00:00");
        let updated = sample(BookingStatus::Pending).with_transition(
            BookingStatus::Cancelled,
            "W1",
            Some("client unreachable".to_string()),
            None,
            now,
        );
        assert_eq!(updated.status, BookingStatus::Cancelled);
        assert_eq!(updated.cancellation_reason.as_deref(), Some("client unreachable"));
        assert_eq!(updated.cancelled_by.as_deref(), Some("W1"));
        assert_eq!(updated.updated_at, now);
    }

    #[test]
    fn test_reason_ignored_outside_cancellation() {
        let updated = sample(BookingStatus::Pending).with_transition(
            BookingStatus::Accepted,
            "W1",
            Some("ignored".to_string()),
            None,
            ts("2025-05-21 10:00:00"),
        );
        assert!(updated.cancellation_reason.is_none());
        assert!(updated.cancelled_by.is_none());
    }

    #[test]
    fn test_start_and_end_times() {
        let started = ts("2025-06-01 09:05:00");
        let finished = ts("2025-06-01 12:40:00");

        let in_progress = sample(BookingStatus::Confirmed).with_transition(
            BookingStatus::InProgress,
            "W1",
            None,
            None,
            started,
        );
        assert_eq!(in_progress.actual_start_time, Some(started));
        assert!(in_progress.actual_end_time.is_none());

        let completed =
            in_progress.with_transition(BookingStatus::Completed, "W1", None, None, finished);
        assert_eq!(completed.actual_start_time, Some(started));
        assert_eq!(completed.actual_end_time, Some(finished));
    }

    #[test]
    fn test_worker_notes_kept_unless_supplied() {
        let mut booking = sample(BookingStatus::Pending);
        booking.worker_notes = Some("bring ladder".to_string());

        let unchanged =
            booking.with_transition(BookingStatus::Accepted, "W1", None, None, ts("2025-05-21 10:00:00"));
        assert_eq!(unchanged.worker_notes.as_deref(), Some("bring ladder"));

        let replaced = booking.with_transition(
            BookingStatus::Accepted,
            "W1",
            None,
            Some("ladder not needed".to_string()),
            ts("2025-05-21 10:00:00"),
        );
        assert_eq!(replaced.worker_notes.as_deref(), Some("ladder not needed"));
    }
}
