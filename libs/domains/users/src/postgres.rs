use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement};
use uuid::Uuid;

use crate::error::{UserError, UserResult};
use crate::models::{Preferences, User};
use crate::repository::UserRepository;

/// PostgreSQL implementation of UserRepository using SeaORM raw SQL.
#[derive(Clone)]
pub struct PostgresUserRepository {
    db: DatabaseConnection,
}

impl PostgresUserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Helper struct for deserializing user rows.
#[derive(Debug, FromQueryResult)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    push_token: Option<String>,
    preferences: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        // A malformed preferences document falls back to the defaults
        let preferences: Preferences =
            serde_json::from_value(row.preferences).unwrap_or_default();

        User {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            push_token: row.push_token,
            preferences,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn preferences_json(preferences: &Preferences) -> serde_json::Value {
    serde_json::to_value(preferences).unwrap_or_else(|_| serde_json::json!({}))
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: User) -> UserResult<User> {
        let sql = r#"
            INSERT INTO users (id, email, name, password_hash, push_token, preferences, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [
                user.id.into(),
                user.email.clone().into(),
                user.name.clone().into(),
                user.password_hash.clone().into(),
                user.push_token.clone().into(),
                preferences_json(&user.preferences).into(),
                user.created_at.into(),
                user.updated_at.into(),
            ],
        );

        let row = self.db.query_one(stmt).await.map_err(|e| {
            if e.to_string().contains("duplicate key") {
                UserError::DuplicateEmail(user.email.clone())
            } else {
                UserError::Database(e)
            }
        })?;

        let row = row.ok_or_else(|| UserError::Internal("INSERT returned no row".to_string()))?;
        let user_row = UserRow::from_query_result(&row, "")?;

        tracing::info!(user_id = %user.id, "Created user");
        Ok(user_row.into())
    }

    async fn get_by_id(&self, id: Uuid) -> UserResult<Option<User>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT * FROM users WHERE id = $1",
            [id.into()],
        );

        let row = self.db.query_one(stmt).await?;
        Ok(row
            .map(|r| UserRow::from_query_result(&r, "").map(User::from))
            .transpose()?)
    }

    async fn get_by_email(&self, email: &str) -> UserResult<Option<User>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1)",
            [email.into()],
        );

        let row = self.db.query_one(stmt).await?;
        Ok(row
            .map(|r| UserRow::from_query_result(&r, "").map(User::from))
            .transpose()?)
    }

    async fn update(&self, user: User) -> UserResult<User> {
        let sql = r#"
            UPDATE users
            SET name = $2,
                password_hash = $3,
                push_token = $4,
                preferences = $5,
                updated_at = $6
            WHERE id = $1
            RETURNING *
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [
                user.id.into(),
                user.name.clone().into(),
                user.password_hash.clone().into(),
                user.push_token.clone().into(),
                preferences_json(&user.preferences).into(),
                user.updated_at.into(),
            ],
        );

        let row = self
            .db
            .query_one(stmt)
            .await?
            .ok_or(UserError::NotFound(user.id))?;

        let user_row = UserRow::from_query_result(&row, "")?;
        Ok(user_row.into())
    }

    async fn delete(&self, id: Uuid) -> UserResult<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "DELETE FROM users WHERE id = $1",
            [id.into()],
        );

        let result = self.db.execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn email_exists(&self, email: &str) -> UserResult<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT 1 AS present FROM users WHERE LOWER(email) = LOWER($1) LIMIT 1",
            [email.into()],
        );

        let row = self.db.query_one(stmt).await?;
        Ok(row.is_some())
    }
}
