use serde::{Deserialize, Serialize};

/// A catalog entry a booking is made against (cleaning, gardening, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}
