//! Owner-scoped storage shared by every per-user collection.
//!
//! Each collection describes its table once through [`OwnedResource`]; the
//! queries below are written a single time and always conjoin the record id
//! with the owner id, so a foreign record looks exactly like a missing one.

use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::{
    errors::AppError,
    structs::{
        ChecklistItem, ChecklistItemInput, Document, DocumentInput, Expense, ExpenseInput, Note,
        NoteInput,
    },
};

/// A bindable column value, in the order given by [`OwnedResource::COLUMNS`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    OptText(Option<String>),
    Real(f64),
    Flag(bool),
}

impl FieldValue {
    fn push_to(self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            FieldValue::Text(v) => qb.push_bind(v),
            FieldValue::OptText(v) => qb.push_bind(v),
            FieldValue::Real(v) => qb.push_bind(v),
            FieldValue::Flag(v) => qb.push_bind(v),
        };
    }
}

pub trait OwnedResource:
    for<'r> FromRow<'r, SqliteRow> + Serialize + Send + Unpin + 'static
{
    type Input: DeserializeOwned + Send + 'static;

    const TABLE: &'static str;
    /// Singular name used in error messages.
    const KIND: &'static str;
    const ORDER_BY: &'static str;
    /// Writable columns, excluding `id`, `user_id` and `created_at`.
    const COLUMNS: &'static [&'static str];

    fn validate(input: &Self::Input) -> Result<(), AppError>;

    fn into_values(input: Self::Input) -> Vec<FieldValue>;
}

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(())
}

impl OwnedResource for Expense {
    type Input = ExpenseInput;

    const TABLE: &'static str = "expenses";
    const KIND: &'static str = "expense";
    const ORDER_BY: &'static str = "date DESC";
    const COLUMNS: &'static [&'static str] = &["description", "amount", "category", "date", "paid"];

    fn validate(input: &ExpenseInput) -> Result<(), AppError> {
        require_text("description", &input.description)?;
        require_text("category", &input.category)?;
        require_text("date", &input.date)?;
        if !input.amount.is_finite() {
            return Err(AppError::validation("amount must be a finite number"));
        }
        Ok(())
    }

    fn into_values(input: ExpenseInput) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(input.description),
            FieldValue::Real(input.amount),
            FieldValue::Text(input.category),
            FieldValue::Text(input.date),
            FieldValue::Flag(input.paid),
        ]
    }
}

impl OwnedResource for Document {
    type Input = DocumentInput;

    const TABLE: &'static str = "documents";
    const KIND: &'static str = "document";
    const ORDER_BY: &'static str = "created_at DESC";
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "category",
        "status",
        "upload_date",
        "due_date",
        "required",
    ];

    fn validate(input: &DocumentInput) -> Result<(), AppError> {
        require_text("name", &input.name)?;
        require_text("category", &input.category)
    }

    fn into_values(input: DocumentInput) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(input.name),
            FieldValue::Text(input.category),
            FieldValue::Text(input.status),
            FieldValue::OptText(input.upload_date),
            FieldValue::OptText(input.due_date),
            FieldValue::Flag(input.required),
        ]
    }
}

impl OwnedResource for Note {
    type Input = NoteInput;

    const TABLE: &'static str = "notes";
    const KIND: &'static str = "note";
    const ORDER_BY: &'static str = "date DESC, time DESC";
    const COLUMNS: &'static [&'static str] =
        &["title", "content", "category", "priority", "date", "time"];

    fn validate(input: &NoteInput) -> Result<(), AppError> {
        require_text("title", &input.title)?;
        require_text("content", &input.content)?;
        require_text("category", &input.category)?;
        require_text("date", &input.date)?;
        require_text("time", &input.time)
    }

    fn into_values(input: NoteInput) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(input.title),
            FieldValue::Text(input.content),
            FieldValue::Text(input.category),
            FieldValue::Text(input.priority),
            FieldValue::Text(input.date),
            FieldValue::Text(input.time),
        ]
    }
}

impl OwnedResource for ChecklistItem {
    type Input = ChecklistItemInput;

    const TABLE: &'static str = "checklist";
    const KIND: &'static str = "checklist item";
    const ORDER_BY: &'static str = "created_at DESC";
    const COLUMNS: &'static [&'static str] = &[
        "title",
        "description",
        "category",
        "completed",
        "priority",
        "due_date",
    ];

    fn validate(input: &ChecklistItemInput) -> Result<(), AppError> {
        require_text("title", &input.title)?;
        require_text("category", &input.category)
    }

    fn into_values(input: ChecklistItemInput) -> Vec<FieldValue> {
        vec![
            FieldValue::Text(input.title),
            FieldValue::OptText(input.description),
            FieldValue::Text(input.category),
            FieldValue::Flag(input.completed),
            FieldValue::Text(input.priority),
            FieldValue::OptText(input.due_date),
        ]
    }
}

pub async fn list<R: OwnedResource>(pool: &SqlitePool, owner: i64) -> Result<Vec<R>, AppError> {
    let sql = format!(
        "SELECT * FROM {} WHERE user_id = $1 ORDER BY {}, id DESC",
        R::TABLE,
        R::ORDER_BY
    );
    Ok(sqlx::query_as::<_, R>(&sql).bind(owner).fetch_all(pool).await?)
}

pub async fn create<R: OwnedResource>(
    pool: &SqlitePool,
    owner: i64,
    input: R::Input,
) -> Result<R, AppError> {
    R::validate(&input)?;
    let created_at = crate::db::timestamp();

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "INSERT INTO {} (user_id, {}, created_at) VALUES (",
        R::TABLE,
        R::COLUMNS.join(", ")
    ));
    qb.push_bind(owner);
    for value in R::into_values(input) {
        qb.push(", ");
        value.push_to(&mut qb);
    }
    qb.push(", ").push_bind(created_at).push(") RETURNING *");

    qb.build_query_as::<R>()
        .fetch_one(pool)
        .await
        .map_err(|e| match e.as_database_error() {
            // the owner was erased while still holding a signed token
            Some(db) if db.is_foreign_key_violation() => {
                log::warn!("Rejected {} for missing owner {}", R::KIND, owner);
                AppError::forbidden("invalid token")
            }
            _ => AppError::DatabaseError(e),
        })
}

/// Replaces every writable column. `NotFound` when no row matches both
/// `id` and `owner`.
pub async fn update<R: OwnedResource>(
    pool: &SqlitePool,
    owner: i64,
    id: i64,
    input: R::Input,
) -> Result<(), AppError> {
    R::validate(&input)?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", R::TABLE));
    for (i, (column, value)) in R::COLUMNS.iter().zip(R::into_values(input)).enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(*column).push(" = ");
        value.push_to(&mut qb);
    }
    qb.push(" WHERE id = ")
        .push_bind(id)
        .push(" AND user_id = ")
        .push_bind(owner);

    let affected = qb.build().execute(pool).await?.rows_affected();
    if affected == 0 {
        return Err(AppError::not_found(format!("{} not found", R::KIND)));
    }
    Ok(())
}

pub async fn delete<R: OwnedResource>(
    pool: &SqlitePool,
    owner: i64,
    id: i64,
) -> Result<(), AppError> {
    let sql = format!("DELETE FROM {} WHERE id = $1 AND user_id = $2", R::TABLE);
    let affected = sqlx::query(&sql)
        .bind(id)
        .bind(owner)
        .execute(pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(AppError::not_found(format!("{} not found", R::KIND)));
    }
    Ok(())
}
