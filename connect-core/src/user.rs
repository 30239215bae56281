//! User profiles and the entrepreneur/investor role split.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::row;

/// Which side of the marketplace a profile sits on.
///
/// Unknown remote values default to `Entrepreneur`, mirroring the
/// platform's column default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Entrepreneur,
    Investor,
}

impl UserRole {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "investor" => UserRole::Investor,
            _ => UserRole::Entrepreneur,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Entrepreneur => "entrepreneur",
            UserRole::Investor => "investor",
        }
    }
}

/// A user profile as the client sees it.
///
/// `followed` is viewer-scoped: whether the current viewer follows this
/// user. It is always present (defaulted false), never absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub username: String,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub industry: Option<String>,
    pub founded_year: Option<i64>,
    pub team_size: Option<i64>,
    pub investment_range: Option<String>,
    pub phone: Option<String>,
    pub followed: bool,
}

impl User {
    /// Map a `profiles` row into a `User`.
    ///
    /// Returns `None` when the row has no usable id; such rows are dropped
    /// silently at fetch sites. The email column is only present for the
    /// viewer's own profile and defaults to empty elsewhere.
    pub fn from_row(row: &Value) -> Option<User> {
        let id = row::uuid_field(row, "id")?;
        Some(User {
            id,
            email: row::str_or_empty(row, "email"),
            full_name: row::str_or_empty(row, "full_name"),
            username: row::str_or_empty(row, "username"),
            role: UserRole::parse(&row::str_or_empty(row, "user_type")),
            avatar_url: row::opt_str(row, "avatar_url"),
            bio: row::opt_str(row, "bio"),
            location: row::opt_str(row, "location"),
            industry: row::opt_str(row, "industry"),
            founded_year: row::opt_i64(row, "founded_year"),
            team_size: row::opt_i64(row, "team_size"),
            investment_range: row::opt_str(row, "investment_range"),
            phone: row::opt_str(row, "phone"),
            followed: false,
        })
    }
}

/// Partial profile edit. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub role: Option<UserRole>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub industry: Option<String>,
    pub founded_year: Option<i64>,
    pub team_size: Option<i64>,
    pub investment_range: Option<String>,
    pub phone: Option<String>,
}

impl ProfileUpdate {
    /// Build the snake_case patch sent to the `profiles` table. Only set
    /// fields appear in the patch.
    pub fn to_patch(&self) -> Value {
        let mut patch = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                patch.insert(key.to_owned(), value);
            }
        };
        put("full_name", self.full_name.clone().map(Value::from));
        put("username", self.username.clone().map(Value::from));
        put("user_type", self.role.map(|r| json!(r.as_str())));
        put("avatar_url", self.avatar_url.clone().map(Value::from));
        put("bio", self.bio.clone().map(Value::from));
        put("location", self.location.clone().map(Value::from));
        put("industry", self.industry.clone().map(Value::from));
        put("founded_year", self.founded_year.map(Value::from));
        put("team_size", self.team_size.map(Value::from));
        put(
            "investment_range",
            self.investment_range.clone().map(Value::from),
        );
        put("phone", self.phone.clone().map(Value::from));
        Value::Object(patch)
    }

    /// Apply the same edit to an in-memory `User`, keeping local state in
    /// step with the committed patch.
    pub fn apply_to(&self, user: &mut User) {
        if let Some(v) = &self.full_name {
            user.full_name = v.clone();
        }
        if let Some(v) = &self.username {
            user.username = v.clone();
        }
        if let Some(v) = self.role {
            user.role = v;
        }
        if let Some(v) = &self.avatar_url {
            user.avatar_url = Some(v.clone());
        }
        if let Some(v) = &self.bio {
            user.bio = Some(v.clone());
        }
        if let Some(v) = &self.location {
            user.location = Some(v.clone());
        }
        if let Some(v) = &self.industry {
            user.industry = Some(v.clone());
        }
        if let Some(v) = self.founded_year {
            user.founded_year = Some(v);
        }
        if let Some(v) = self.team_size {
            user.team_size = Some(v);
        }
        if let Some(v) = &self.investment_range {
            user.investment_range = Some(v.clone());
        }
        if let Some(v) = &self.phone {
            user.phone = Some(v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_row_maps_snake_case_columns() {
        let id = Uuid::new_v4();
        let row = json!({
            "id": id.to_string(),
            "full_name": "Ada Lovelace",
            "username": "ada",
            "user_type": "investor",
            "founded_year": 2021,
            "team_size": 4,
        });

        let user = User::from_row(&row).expect("row should map");
        assert_eq!(user.id, id);
        assert_eq!(user.full_name, "Ada Lovelace");
        assert_eq!(user.role, UserRole::Investor);
        assert_eq!(user.founded_year, Some(2021));
        assert!(!user.followed);
        assert!(user.email.is_empty());
    }

    #[test]
    fn test_from_row_drops_rows_without_id() {
        assert!(User::from_row(&json!({ "username": "ghost" })).is_none());
        assert!(User::from_row(&json!({ "id": "not-a-uuid" })).is_none());
    }

    #[test]
    fn test_unknown_role_defaults_to_entrepreneur() {
        assert_eq!(UserRole::parse("founder"), UserRole::Entrepreneur);
        assert_eq!(UserRole::parse(""), UserRole::Entrepreneur);
        assert_eq!(UserRole::parse("investor"), UserRole::Investor);
    }

    #[test]
    fn test_patch_contains_only_set_fields() {
        let update = ProfileUpdate {
            username: Some("grace".to_owned()),
            team_size: Some(7),
            ..ProfileUpdate::default()
        };
        let patch = update.to_patch();
        let obj = patch.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["username"], json!("grace"));
        assert_eq!(obj["team_size"], json!(7));
    }
}
