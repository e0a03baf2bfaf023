use chrono::{DateTime, offset::Utc};
use diesel::{Identifiable, Queryable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::video;

/// A video record. Only the owner may change the `thumbnail_url` or `video_url`.
#[derive(Identifiable, Queryable, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[diesel(table_name = video)]
#[diesel(primary_key(id))]
pub struct Video {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub owner_id: Uuid,
}
