use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Booking, BookingDetails, BookingStatus, Role, Service, User};

/// Record store the booking lifecycle reads from and writes to.
pub trait BookingStore: Send + Sync {
    fn find_booking(&self, id: &str) -> anyhow::Result<Option<Booking>>;

    fn find_booking_details(&self, id: &str) -> anyhow::Result<Option<BookingDetails>>;

    fn insert_booking(&self, booking: &Booking) -> anyhow::Result<()>;

    /// Compare-and-swap on status. Returns false if the stored status is no
    /// longer `expected`.
    fn update_booking_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> anyhow::Result<bool>;

    fn list_bookings(
        &self,
        party_id: &str,
        role: Role,
        status: Option<BookingStatus>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Booking>, i64)>;

    fn find_user(&self, id: &str) -> anyhow::Result<Option<User>>;

    fn find_service(&self, id: &str) -> anyhow::Result<Option<Service>>;
}

pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }
}

impl BookingStore for SqliteStore {
    fn find_booking(&self, id: &str) -> anyhow::Result<Option<Booking>> {
        queries::get_booking_by_id(&*self.conn()?, id)
    }

    fn find_booking_details(&self, id: &str) -> anyhow::Result<Option<BookingDetails>> {
        queries::get_booking_details(&*self.conn()?, id)
    }

    fn insert_booking(&self, booking: &Booking) -> anyhow::Result<()> {
        queries::create_booking(&*self.conn()?, booking)
    }

    fn update_booking_if_status(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> anyhow::Result<bool> {
        queries::update_booking_if_status(&*self.conn()?, booking, expected)
    }

    fn list_bookings(
        &self,
        party_id: &str,
        role: Role,
        status: Option<BookingStatus>,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<(Vec<Booking>, i64)> {
        queries::list_bookings_for_party(&*self.conn()?, party_id, role, status, limit, offset)
    }

    fn find_user(&self, id: &str) -> anyhow::Result<Option<User>> {
        queries::get_user(&*self.conn()?, id)
    }

    fn find_service(&self, id: &str) -> anyhow::Result<Option<Service>> {
        queries::get_service(&*self.conn()?, id)
    }
}
