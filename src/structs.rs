use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub pwd_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub pwd_hash: String,
    pub created_at: String,
}

/// What administrators get to see of an account.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicAdmin {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_users: i64,
    pub total_expenses: i64,
    pub total_documents: i64,
    pub total_notes: i64,
    pub total_checklist_items: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, FromRow)]
pub struct Expense {
    pub id: i64,
    pub user_id: i64,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub date: String,
    pub paid: bool,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExpenseInput {
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub date: String,
    #[serde(default, deserialize_with = "flag_or_false")]
    pub paid: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Document {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub category: String,
    pub status: String,
    pub upload_date: Option<String>,
    pub due_date: Option<String>,
    pub required: bool,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DocumentInput {
    pub name: String,
    pub category: String,
    #[serde(default = "default_status", deserialize_with = "status_or_pending")]
    pub status: String,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "flag_or_false")]
    pub required: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    pub priority: String,
    pub date: String,
    pub time: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NoteInput {
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default = "default_priority", deserialize_with = "priority_or_medium")]
    pub priority: String,
    pub date: String,
    pub time: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ChecklistItem {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub completed: bool,
    pub priority: String,
    pub due_date: Option<String>,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItemInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    #[serde(default, deserialize_with = "flag_or_false")]
    pub completed: bool,
    #[serde(default = "default_priority", deserialize_with = "priority_or_medium")]
    pub priority: String,
    #[serde(default)]
    pub due_date: Option<String>,
}

fn default_status() -> String {
    "pending".to_owned()
}

fn default_priority() -> String {
    "medium".to_owned()
}

// Clients send `null` or `""` for fields they leave untouched; both mean
// "use the default", same as omitting the key.

fn flag_or_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

fn text_or<'de, D: Deserializer<'de>>(
    deserializer: D,
    fallback: fn() -> String,
) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(fallback))
}

fn status_or_pending<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    text_or(deserializer, default_status)
}

fn priority_or_medium<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    text_or(deserializer, default_priority)
}
