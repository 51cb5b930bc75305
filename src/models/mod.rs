pub mod booking;
pub mod notification;
pub mod service;
pub mod user;

pub use booking::{
    Booking, BookingDetails, BookingPage, BookingStatus, CreateBookingRequest, Pagination,
    RequiredActor, TransitionRequest, UnknownStatus,
};
pub use notification::{NewNotification, Notification};
pub use service::Service;
pub use user::{Identity, Role, UnknownRole, User};
