//! Startup-idea posts and their viewer-scoped annotations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::row;

/// The structured "startup details" sub-record attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupDetails {
    pub problem: String,
    pub solution: String,
    pub market_size: String,
    pub competition: String,
    pub business_model: Option<String>,
    pub funding_needs: String,
    pub timeline: String,
    pub team: String,
}

impl StartupDetails {
    /// Decode the `startup_details` column.
    ///
    /// The platform stores the sub-record either as a JSON object or as a
    /// JSON-encoded string, depending on which write path produced the row;
    /// both decode here. Anything else maps to `None` rather than failing
    /// the post.
    pub fn from_value(value: &Value) -> Option<StartupDetails> {
        match value {
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            Value::String(raw) => {
                let parsed: Value = serde_json::from_str(raw).ok()?;
                parsed
                    .as_object()
                    .and_then(|_| serde_json::from_value(parsed.clone()).ok())
            }
            _ => None,
        }
    }
}

/// The author profile card embedded in every post.
///
/// Fetched through the posts→profiles join; a missing join row degrades to
/// the "Unknown" placeholder instead of dropping the post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorCard {
    pub full_name: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
    pub industry: Option<String>,
    pub founded_year: Option<i64>,
    pub team_size: Option<i64>,
    pub bio: Option<String>,
}

impl AuthorCard {
    pub fn from_profile_row(row: &Value) -> AuthorCard {
        AuthorCard {
            full_name: row
                .get("full_name")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("Unknown")
                .to_owned(),
            username: row
                .get("username")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("unknown")
                .to_owned(),
            avatar_url: row::opt_str(row, "avatar_url"),
            location: row::opt_str(row, "location"),
            industry: row::opt_str(row, "industry"),
            founded_year: row::opt_i64(row, "founded_year"),
            team_size: row::opt_i64(row, "team_size"),
            bio: row::opt_str(row, "bio"),
        }
    }

    pub fn unknown() -> AuthorCard {
        AuthorCard {
            full_name: "Unknown".to_owned(),
            username: "unknown".to_owned(),
            avatar_url: None,
            location: None,
            industry: None,
            founded_year: None,
            team_size: None,
            bio: None,
        }
    }
}

/// A feed post annotated for the current viewer.
///
/// `likes`, `liked`, and `author_followed` are derived fields. They are
/// always present: anonymous viewers get count-only likes and false flags,
/// never absent fields. The author id is immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub startup_details: Option<StartupDetails>,
    pub created_at: DateTime<Utc>,
    pub author: AuthorCard,
    pub likes: usize,
    pub liked: bool,
    pub author_followed: bool,
}

impl Post {
    /// Map a `posts` row into a `Post` with zeroed annotations.
    ///
    /// Rows missing the id or the owning user id are malformed and map to
    /// `None`; fetch sites drop them silently rather than failing the whole
    /// fetch.
    pub fn from_row(row: &Value) -> Option<Post> {
        let id = row::uuid_field(row, "id")?;
        let author_id = row::uuid_field(row, "user_id")?;
        Some(Post {
            id,
            author_id,
            title: row::str_or_empty(row, "title"),
            content: row::str_or_empty(row, "content"),
            media_urls: row::str_vec(row, "media_urls"),
            tags: row::str_vec(row, "tags"),
            category: row::opt_str(row, "category"),
            startup_details: row
                .get("startup_details")
                .and_then(StartupDetails::from_value),
            created_at: row::timestamp_or_epoch(row, "created_at"),
            author: AuthorCard::unknown(),
            likes: 0,
            liked: false,
            author_followed: false,
        })
    }
}

/// Fields the author supplies when creating or editing a post.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub startup_details: Option<StartupDetails>,
}

impl PostDraft {
    /// Build the insert row. The id and timestamp are assigned remotely.
    pub fn to_insert_row(&self, author_id: Uuid) -> Value {
        json!({
            "user_id": author_id.to_string(),
            "title": self.title,
            "content": self.content,
            "media_urls": self.media_urls,
            "tags": self.tags,
            "category": self.category,
            "startup_details": self.startup_details,
        })
    }

    /// Build the update patch. The owning user id is never part of it.
    pub fn to_update_patch(&self) -> Value {
        json!({
            "title": self.title,
            "content": self.content,
            "media_urls": self.media_urls,
            "tags": self.tags,
            "category": self.category,
            "startup_details": self.startup_details,
        })
    }
}
