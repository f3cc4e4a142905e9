use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    HelpCategory, HelpPriority, HelpRequestId, HelpStatus, SuggestionId, UserId, UserRole,
    VillageId,
};

pub const USERS: &str = "users";
pub const VILLAGES: &str = "villages";
pub const HELP_REQUESTS: &str = "help_requests";
pub const SUGGESTIONS: &str = "suggestions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub phone: String,
    pub name: String,
    pub profile_photo_url: String,
    pub role: UserRole,
    /// Empty for super admins.
    pub village_id: VillageId,
    pub is_active: bool,
    #[serde(with = "chrono::serde::ts_microseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_microseconds_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: UserId::default(),
            email: String::new(),
            phone: String::new(),
            name: String::new(),
            profile_photo_url: String::new(),
            role: UserRole::Resident,
            village_id: VillageId::default(),
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VillageLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Village {
    pub id: VillageId,
    pub name: String,
    pub description: String,
    pub location: VillageLocation,
    pub admin_id: UserId,
    pub admin_name: String,
    pub admin_contact: String,
    pub population: i64,
    /// Square kilometres, as entered.
    pub area: String,
    pub image_url: String,
    pub is_active: bool,
    #[serde(with = "chrono::serde::ts_microseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_microseconds_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for Village {
    fn default() -> Self {
        Self {
            id: VillageId::default(),
            name: String::new(),
            description: String::new(),
            location: VillageLocation::default(),
            admin_id: UserId::default(),
            admin_name: String::new(),
            admin_contact: String::new(),
            population: 0,
            area: String::new(),
            image_url: String::new(),
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HelpRequest {
    pub id: HelpRequestId,
    pub village_id: VillageId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_phone: String,
    pub category: HelpCategory,
    pub title: String,
    pub description: String,
    pub status: HelpStatus,
    pub priority: HelpPriority,
    pub image_urls: Vec<String>,
    pub admin_notes: String,
    #[serde(with = "chrono::serde::ts_microseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_microseconds_option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_microseconds_option")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Suggestion {
    pub id: SuggestionId,
    pub village_id: VillageId,
    pub user_id: UserId,
    pub user_name: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub upvotes: i64,
    pub upvoted_by: Vec<UserId>,
    pub is_reviewed: bool,
    pub is_implemented: bool,
    pub admin_response: String,
    #[serde(with = "chrono::serde::ts_microseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_microseconds_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Suggestion {
    pub fn has_upvoted(&self, user_id: &UserId) -> bool {
        self.upvoted_by.contains(user_id)
    }

    /// Adds or withdraws `user_id`'s upvote. Returns whether the user now
    /// upvotes the suggestion. `upvotes` is recomputed from the voter set.
    pub fn toggle_upvote(&mut self, user_id: &UserId) -> bool {
        let mut seen = HashSet::new();
        self.upvoted_by.retain(|id| seen.insert(id.clone()));
        let upvoted = if let Some(pos) = self.upvoted_by.iter().position(|id| id == user_id) {
            self.upvoted_by.remove(pos);
            false
        } else {
            self.upvoted_by.push(user_id.clone());
            true
        };
        self.upvotes = self.upvoted_by.len() as i64;
        upvoted
    }

    pub fn votes_consistent(&self) -> bool {
        let voters: HashSet<&UserId> = self.upvoted_by.iter().collect();
        voters.len() == self.upvoted_by.len() && self.upvotes == voters.len() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_take_defaults() {
        let user: User = serde_json::from_value(json!({ "email": "a@b.io" })).expect("user");
        assert!(user.is_active);
        assert_eq!(user.role, UserRole::Resident);
        assert!(user.created_at.is_none());
    }

    #[test]
    fn unknown_enum_codes_decode_to_defaults() {
        let request: HelpRequest = serde_json::from_value(json!({
            "category": "FLOOD",
            "status": "ESCALATED",
            "priority": 9,
        }))
        .expect("request");
        assert_eq!(request.category, HelpCategory::Other);
        assert_eq!(request.status, HelpStatus::Pending);
        assert_eq!(request.priority, HelpPriority::Low);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let village = Village {
            name: "Green Valley".into(),
            ..Village::default()
        };
        let value = serde_json::to_value(&village).expect("village");
        assert_eq!(value["isActive"], json!(true));
        assert_eq!(value["adminContact"], json!(""));
        assert!(value["createdAt"].is_null());
    }

    #[test]
    fn wrong_field_type_is_a_fault() {
        let result = serde_json::from_value::<Village>(json!({ "population": "many" }));
        assert!(result.is_err());
    }

    #[test]
    fn toggling_upvotes_keeps_count_equal_to_voters() {
        let mut suggestion = Suggestion::default();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        assert!(suggestion.toggle_upvote(&alice));
        assert!(suggestion.toggle_upvote(&bob));
        assert_eq!(suggestion.upvotes, 2);
        assert!(!suggestion.toggle_upvote(&alice));
        assert_eq!(suggestion.upvotes, 1);
        assert!(suggestion.has_upvoted(&bob));
        assert!(suggestion.votes_consistent());
    }
}
