//! Persistence boundary.
//!
//! Handlers only ever talk to [`Store`]; [`DbStore`] is the SeaORM backed
//! implementation used by the binary and the integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait, sea_query::OnConflict,
};
use time::OffsetDateTime;

use crate::entity::{audit_event, authorization_code, client, refresh_token, user};
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Records written together when a code or refresh token is redeemed.
#[derive(Clone, Debug)]
pub struct Issuance {
    pub refresh_token: refresh_token::Model,
    pub audit: audit_event::Model,
}

/// Rows removed by [`Store::purge_expired`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub authorization_codes: u64,
    pub refresh_tokens: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<user::Model>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<user::Model>>;
    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<user::Model>>;
    /// Fails with [`StoreError::Conflict`] when the username or email is taken.
    async fn create_user(&self, user: user::Model) -> StoreResult<user::Model>;

    async fn find_client_by_id(&self, id: &str) -> StoreResult<Option<client::Model>>;
    async fn list_clients(&self) -> StoreResult<Vec<client::Model>>;
    async fn upsert_client(&self, client: client::Model) -> StoreResult<()>;

    async fn create_authorization_code(&self, code: authorization_code::Model) -> StoreResult<()>;
    /// Insert `code` together with its grant event. Neither row is written if
    /// either insert fails.
    async fn grant_authorization_code(
        &self,
        code: authorization_code::Model,
        audit: audit_event::Model,
    ) -> StoreResult<()>;
    async fn find_authorization_code(
        &self,
        code: &str,
    ) -> StoreResult<Option<authorization_code::Model>>;
    async fn delete_authorization_code(&self, code: &str) -> StoreResult<bool>;
    /// Atomically delete `code` and record the issuance. Returns `false`, with
    /// nothing written, when the code was already gone.
    async fn consume_authorization_code(&self, code: &str, issuance: Issuance)
    -> StoreResult<bool>;

    async fn create_refresh_token(&self, token: refresh_token::Model) -> StoreResult<()>;
    async fn find_refresh_token(&self, id: &str) -> StoreResult<Option<refresh_token::Model>>;
    async fn delete_refresh_token(&self, id: &str) -> StoreResult<bool>;
    /// Same contract as [`Store::consume_authorization_code`] for refresh tokens.
    async fn consume_refresh_token(&self, id: &str, issuance: Issuance) -> StoreResult<bool>;

    async fn append_audit_event(&self, event: audit_event::Model) -> StoreResult<()>;
    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<PurgeReport>;
}

// Plain `Model -> ActiveModel` conversion marks every column `Unchanged`;
// inserts want them `Set`.
fn user_active(m: user::Model) -> user::ActiveModel {
    user::ActiveModel {
        id: Set(m.id),
        username: Set(m.username),
        email: Set(m.email),
        email_verified: Set(m.email_verified),
        password_hash: Set(m.password_hash),
        created_at: Set(m.created_at),
    }
}

fn client_active(m: client::Model) -> client::ActiveModel {
    client::ActiveModel {
        id: Set(m.id),
        secret: Set(m.secret),
        name: Set(m.name),
        redirect_uris: Set(m.redirect_uris),
        allowed_scopes: Set(m.allowed_scopes),
        created_at: Set(m.created_at),
    }
}

fn code_active(m: authorization_code::Model) -> authorization_code::ActiveModel {
    authorization_code::ActiveModel {
        code: Set(m.code),
        client_id: Set(m.client_id),
        user_id: Set(m.user_id),
        redirect_uri: Set(m.redirect_uri),
        scope: Set(m.scope),
        nonce: Set(m.nonce),
        expires_at: Set(m.expires_at),
        created_at: Set(m.created_at),
    }
}

fn token_active(m: refresh_token::Model) -> refresh_token::ActiveModel {
    refresh_token::ActiveModel {
        id: Set(m.id),
        client_id: Set(m.client_id),
        user_id: Set(m.user_id),
        scope: Set(m.scope),
        version: Set(m.version),
        expires_at: Set(m.expires_at),
        created_at: Set(m.created_at),
    }
}

fn audit_active(m: audit_event::Model) -> audit_event::ActiveModel {
    audit_event::ActiveModel {
        id: Set(m.id),
        occurred_at: Set(m.occurred_at),
        action: Set(m.action),
        subject: Set(m.subject),
        details: Set(m.details),
    }
}

#[derive(Clone, Debug)]
pub struct DbStore {
    db: Arc<DatabaseConnection>,
}

impl DbStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Audit events, newest first. Used by tests and operators.
    pub async fn recent_audit_events(&self, limit: u64) -> StoreResult<Vec<audit_event::Model>> {
        use sea_orm::QuerySelect;
        Ok(audit_event::Entity::find()
            .order_by_desc(audit_event::Column::OccurredAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }
}

#[async_trait]
impl Store for DbStore {
    async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<user::Model>> {
        Ok(user::Entity::find_by_id(id).one(self.db.as_ref()).await?)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?)
    }

    async fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<user::Model>> {
        Ok(user::Entity::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(username))
                    .add(user::Column::Email.eq(email)),
            )
            .one(self.db.as_ref())
            .await?)
    }

    async fn create_user(&self, model: user::Model) -> StoreResult<user::Model> {
        if self
            .find_user_by_username_or_email(&model.username, &model.email)
            .await?
            .is_some()
        {
            return Err(StoreError::Conflict("user"));
        }
        Ok(user_active(model).insert(self.db.as_ref()).await?)
    }

    async fn find_client_by_id(&self, id: &str) -> StoreResult<Option<client::Model>> {
        Ok(client::Entity::find_by_id(id).one(self.db.as_ref()).await?)
    }

    async fn list_clients(&self) -> StoreResult<Vec<client::Model>> {
        Ok(client::Entity::find()
            .order_by_asc(client::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    async fn upsert_client(&self, model: client::Model) -> StoreResult<()> {
        client::Entity::insert(client_active(model))
            .on_conflict(
                OnConflict::column(client::Column::Id)
                    .update_columns([
                        client::Column::Secret,
                        client::Column::Name,
                        client::Column::RedirectUris,
                        client::Column::AllowedScopes,
                    ])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn create_authorization_code(&self, code: authorization_code::Model) -> StoreResult<()> {
        code_active(code).insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn grant_authorization_code(
        &self,
        code: authorization_code::Model,
        audit: audit_event::Model,
    ) -> StoreResult<()> {
        let txn = self.db.begin().await?;
        code_active(code).insert(&txn).await?;
        if let Err(e) = audit_active(audit).insert(&txn).await {
            txn.rollback().await?;
            return Err(e.into());
        }
        txn.commit().await?;
        Ok(())
    }

    async fn find_authorization_code(
        &self,
        code: &str,
    ) -> StoreResult<Option<authorization_code::Model>> {
        Ok(authorization_code::Entity::find_by_id(code)
            .one(self.db.as_ref())
            .await?)
    }

    async fn delete_authorization_code(&self, code: &str) -> StoreResult<bool> {
        let res = authorization_code::Entity::delete_by_id(code)
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn consume_authorization_code(
        &self,
        code: &str,
        issuance: Issuance,
    ) -> StoreResult<bool> {
        let txn = self.db.begin().await?;
        let deleted = authorization_code::Entity::delete_by_id(code)
            .exec(&txn)
            .await?;
        if deleted.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }
        token_active(issuance.refresh_token).insert(&txn).await?;
        audit_active(issuance.audit).insert(&txn).await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn create_refresh_token(&self, token: refresh_token::Model) -> StoreResult<()> {
        token_active(token).insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn find_refresh_token(&self, id: &str) -> StoreResult<Option<refresh_token::Model>> {
        Ok(refresh_token::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?)
    }

    async fn delete_refresh_token(&self, id: &str) -> StoreResult<bool> {
        let res = refresh_token::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn consume_refresh_token(&self, id: &str, issuance: Issuance) -> StoreResult<bool> {
        let txn = self.db.begin().await?;
        let deleted = refresh_token::Entity::delete_by_id(id).exec(&txn).await?;
        if deleted.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }
        token_active(issuance.refresh_token).insert(&txn).await?;
        audit_active(issuance.audit).insert(&txn).await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn append_audit_event(&self, event: audit_event::Model) -> StoreResult<()> {
        audit_active(event).insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<PurgeReport> {
        let codes = authorization_code::Entity::delete_many()
            .filter(authorization_code::Column::ExpiresAt.lt(now))
            .exec(self.db.as_ref())
            .await?;
        let tokens = refresh_token::Entity::delete_many()
            .filter(refresh_token::Column::ExpiresAt.lt(now))
            .exec(self.db.as_ref())
            .await?;
        Ok(PurgeReport {
            authorization_codes: codes.rows_affected,
            refresh_tokens: tokens.rows_affected,
        })
    }
}
