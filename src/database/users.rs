//! PostgreSQL user queries.

use async_trait::async_trait;
use uuid::Uuid;

use crate::database::models::{FromRow, NewUser, User, UserChanges};
use crate::database::query::UpdateBuilder;
use crate::database::store::{PgStore, StoreResult, UserStore};

const USER_COLUMNS: &str = "id, email, password_hash, full_name, role, disabled, created_at, updated_at";

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO users (email, password_hash, full_name, role)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, email, password_hash, full_name, role, disabled, created_at, updated_at",
                &[&user.email, &user.password_hash, &user.full_name, &user.role.as_str()],
            )
            .await?;
        User::from_row(&row)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, email, password_hash, full_name, role, disabled, created_at, updated_at
                 FROM users WHERE email = $1",
                &[&email],
            )
            .await?;
        row.as_ref().map(User::from_row).transpose()
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, email, password_hash, full_name, role, disabled, created_at, updated_at
                 FROM users WHERE id = $1",
                &[&id],
            )
            .await?;
        row.as_ref().map(User::from_row).transpose()
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, email, password_hash, full_name, role, disabled, created_at, updated_at
                 FROM users WHERE NOT disabled ORDER BY created_at DESC",
                &[],
            )
            .await?;
        rows.iter().map(User::from_row).collect()
    }

    async fn update_user(&self, id: Uuid, changes: &UserChanges) -> StoreResult<Option<User>> {
        let role = changes.role.map(|role| role.as_str());

        let mut builder = UpdateBuilder::new("users");
        builder
            .set_opt("full_name", &changes.full_name)
            .set_opt("role", &role)
            .set_opt("disabled", &changes.disabled)
            .set_raw("updated_at", "NOW()");

        let Some(stmt) = builder.build("id", &id, USER_COLUMNS) else {
            return self.find_user(id).await;
        };

        let client = self.client().await?;
        let row = client.query_opt(&stmt.sql, &stmt.params).await?;
        row.as_ref().map(User::from_row).transpose()
    }
}
