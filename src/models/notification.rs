use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

/// A notification as handed to the sink, before it has a row id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub data: serde_json::Value,
}
