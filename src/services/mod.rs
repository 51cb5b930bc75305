pub mod identity;
pub mod lifecycle;
pub mod messaging;
pub mod notifications;
pub mod store;
