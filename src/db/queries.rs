use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingDetails, BookingStatus, NewNotification, Notification, Role, Service, User,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

const BOOKING_COLUMNS: &str = "b.id, b.client_id, b.worker_id, b.service_id, b.scheduled_date, \
     b.scheduled_start_time, b.scheduled_end_time, b.status, b.location_address, b.location_lat, \
     b.location_lng, b.estimated_cost, b.client_notes, b.worker_notes, b.cancellation_reason, \
     b.cancelled_by, b.actual_start_time, b.actual_end_time, b.created_at, b.updated_at";

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .with_context(|| format!("malformed timestamp in database: {s}"))
}

// ── Users ──

pub fn upsert_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, full_name, role, phone, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
           full_name = excluded.full_name,
           phone = excluded.phone,
           is_active = excluded.is_active",
        params![
            user.id,
            user.full_name,
            user.role.as_str(),
            user.phone,
            user.is_active as i32,
            format_timestamp(&user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let row = conn
        .query_row(
            "SELECT id, full_name, role, phone, is_active, created_at FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i32>(4)? != 0,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((id, full_name, role, phone, is_active, created_at)) = row else {
        return Ok(None);
    };

    Ok(Some(User {
        id,
        full_name,
        role: role.parse()?,
        phone,
        is_active,
        created_at: parse_timestamp(&created_at)?,
    }))
}

// ── Services ──

pub fn upsert_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, name, description, is_active) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           description = excluded.description,
           is_active = excluded.is_active",
        params![
            service.id,
            service.name,
            service.description,
            service.is_active as i32,
        ],
    )?;
    Ok(())
}

fn parse_service_row(row: &rusqlite::Row) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        is_active: row.get::<_, i32>(3)? != 0,
    })
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let service = conn
        .query_row(
            "SELECT id, name, description, is_active FROM services WHERE id = ?1",
            params![id],
            parse_service_row,
        )
        .optional()?;
    Ok(service)
}

pub fn list_active_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, is_active FROM services WHERE is_active = 1 ORDER BY name ASC",
    )?;
    let rows = stmt.query_map([], parse_service_row)?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

// ── Bookings ──

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, client_id, worker_id, service_id, scheduled_date, scheduled_start_time,
            scheduled_end_time, status, location_address, location_lat, location_lng, estimated_cost,
            client_notes, worker_notes, cancellation_reason, cancelled_by, actual_start_time,
            actual_end_time, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            booking.id,
            booking.client_id,
            booking.worker_id,
            booking.service_id,
            booking.scheduled_date.format(DATE_FORMAT).to_string(),
            booking.scheduled_start_time.format(TIME_FORMAT).to_string(),
            booking.scheduled_end_time.format(TIME_FORMAT).to_string(),
            booking.status.as_str(),
            booking.location_address,
            booking.location_lat,
            booking.location_lng,
            booking.estimated_cost,
            booking.client_notes,
            booking.worker_notes,
            booking.cancellation_reason,
            booking.cancelled_by,
            booking.actual_start_time.as_ref().map(format_timestamp),
            booking.actual_end_time.as_ref().map(format_timestamp),
            format_timestamp(&booking.created_at),
            format_timestamp(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = ?1");
    let booking = conn
        .query_row(&sql, params![id], |row| Ok(parse_booking_row(row)))
        .optional()?;

    booking.transpose()
}

pub fn get_booking_details(conn: &Connection, id: &str) -> anyhow::Result<Option<BookingDetails>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS}, s.name, c.full_name, w.full_name
         FROM bookings b
         JOIN services s ON s.id = b.service_id
         JOIN users c ON c.id = b.client_id
         JOIN users w ON w.id = b.worker_id
         WHERE b.id = ?1"
    );

    let details = conn
        .query_row(&sql, params![id], |row| {
            Ok(parse_booking_row(row).and_then(|booking| {
                Ok(BookingDetails {
                    booking,
                    service_name: row.get(20)?,
                    client_name: row.get(21)?,
                    worker_name: row.get(22)?,
                })
            }))
        })
        .optional()?;

    details.transpose()
}

/// Writes every lifecycle-owned field of `booking`, but only if the stored
/// row still has status `expected`. Returns false when the row moved on (or
/// does not exist), in which case nothing was written.
pub fn update_booking_if_status(
    conn: &Connection,
    booking: &Booking,
    expected: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           status = ?1,
           worker_notes = ?2,
           cancellation_reason = ?3,
           cancelled_by = ?4,
           actual_start_time = ?5,
           actual_end_time = ?6,
           updated_at = ?7
         WHERE id = ?8 AND status = ?9",
        params![
            booking.status.as_str(),
            booking.worker_notes,
            booking.cancellation_reason,
            booking.cancelled_by,
            booking.actual_start_time.as_ref().map(format_timestamp),
            booking.actual_end_time.as_ref().map(format_timestamp),
            format_timestamp(&booking.updated_at),
            booking.id,
            expected.as_str(),
        ],
    )?;
    Ok(count > 0)
}

/// Bookings where `party_id` holds `role`, newest first, plus the total
/// count ignoring pagination.
pub fn list_bookings_for_party(
    conn: &Connection,
    party_id: &str,
    role: Role,
    status: Option<BookingStatus>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<(Vec<Booking>, i64)> {
    let party_column = match role {
        Role::Client => "client_id",
        Role::Worker => "worker_id",
    };
    let status = status.map(|s| s.as_str());

    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM bookings WHERE {party_column} = ?1 AND (?2 IS NULL OR status = ?2)"
        ),
        params![party_id, status],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         WHERE b.{party_column} = ?1 AND (?2 IS NULL OR b.status = ?2)
         ORDER BY b.created_at DESC, b.rowid DESC
         LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![party_id, status, limit, offset], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok((bookings, total))
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let scheduled_date: String = row.get(4)?;
    let start: String = row.get(5)?;
    let end: String = row.get(6)?;
    let status: String = row.get(7)?;
    let actual_start: Option<String> = row.get(16)?;
    let actual_end: Option<String> = row.get(17)?;
    let created_at: String = row.get(18)?;
    let updated_at: String = row.get(19)?;

    Ok(Booking {
        id: row.get(0)?,
        client_id: row.get(1)?,
        worker_id: row.get(2)?,
        service_id: row.get(3)?,
        scheduled_date: NaiveDate::parse_from_str(&scheduled_date, DATE_FORMAT)
            .with_context(|| format!("malformed scheduled_date in database: {scheduled_date}"))?,
        scheduled_start_time: NaiveTime::parse_from_str(&start, TIME_FORMAT)
            .with_context(|| format!("malformed scheduled_start_time in database: {start}"))?,
        scheduled_end_time: NaiveTime::parse_from_str(&end, TIME_FORMAT)
            .with_context(|| format!("malformed scheduled_end_time in database: {end}"))?,
        status: status.parse()?,
        location_address: row.get(8)?,
        location_lat: row.get(9)?,
        location_lng: row.get(10)?,
        estimated_cost: row.get(11)?,
        client_notes: row.get(12)?,
        worker_notes: row.get(13)?,
        cancellation_reason: row.get(14)?,
        cancelled_by: row.get(15)?,
        actual_start_time: actual_start.as_deref().map(parse_timestamp).transpose()?,
        actual_end_time: actual_end.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

// ── Notifications ──

pub fn insert_notification(
    conn: &Connection,
    notification: &NewNotification,
) -> anyhow::Result<Notification> {
    let data = serde_json::to_string(&notification.data)?;
    conn.execute(
        "INSERT INTO notifications (user_id, title, body, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            notification.user_id,
            notification.title,
            notification.body,
            notification.kind,
            data,
        ],
    )?;

    let id = conn.last_insert_rowid();
    let created_at: String = conn.query_row(
        "SELECT created_at FROM notifications WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    let created_at = parse_timestamp(&created_at)?;

    Ok(Notification {
        id,
        user_id: notification.user_id.clone(),
        title: notification.title.clone(),
        body: notification.body.clone(),
        kind: notification.kind.clone(),
        data: notification.data.clone(),
        is_read: false,
        created_at,
    })
}

fn parse_notification_row(row: &rusqlite::Row) -> anyhow::Result<Notification> {
    let id: i64 = row.get(0)?;
    let data: String = row.get(5)?;
    let created_at: String = row.get(7)?;

    Ok(Notification {
        id,
        user_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        kind: row.get(4)?,
        data: serde_json::from_str(&data)
            .with_context(|| format!("malformed data on notification {id}"))?,
        is_read: row.get::<_, i32>(6)? != 0,
        created_at: parse_timestamp(&created_at)?,
    })
}

pub fn list_notifications(
    conn: &Connection,
    user_id: &str,
    unread_only: bool,
    limit: i64,
) -> anyhow::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, body, kind, data, is_read, created_at
         FROM notifications WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY id DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![user_id, unread_only as i32, limit], |row| {
        Ok(parse_notification_row(row))
    })?;

    let mut notifications = vec![];
    for row in rows {
        notifications.push(row??);
    }
    Ok(notifications)
}

pub fn get_notifications_since(
    conn: &Connection,
    user_id: &str,
    since_id: i64,
) -> anyhow::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, body, kind, data, is_read, created_at
         FROM notifications WHERE user_id = ?1 AND id > ?2
         ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![user_id, since_id], |row| {
        Ok(parse_notification_row(row))
    })?;

    let mut notifications = vec![];
    for row in rows {
        notifications.push(row??);
    }
    Ok(notifications)
}

pub fn mark_notification_read(conn: &Connection, user_id: &str, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(count > 0)
}
