use super::{DbExecutor, Renamed};
use crate::async_message_handler_with_span;
use actix::prelude::*;
use actix_interop::with_ctx;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_string(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InternalUser {
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<InternalUser>, Report>")]
pub struct AllUsers;

async_message_handler_with_span! {
    impl AsyncSpanHandler<AllUsers> for DbExecutor {
        async fn handle(_msg: AllUsers) -> Result<Vec<InternalUser>, Report> {
            debug!("Retrieving all users");
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.all_users().await
        }
    }
}

// Find user

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalUser>, Report>")]
pub struct UserById(pub UserId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<UserById> for DbExecutor {
        async fn handle(msg: UserById) -> Result<Option<InternalUser>, Report> {
            let UserById(user_id) = msg;
            debug!(user_id = user_id.as_string().as_str(), "Get user by id");
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.user_by_id(&user_id).await
        }
    }
}

// Register user

/// Resolves to `None` when the username is already taken.
#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalUser>, Report>")]
pub struct SaveUser(pub String);

async_message_handler_with_span! {
    impl AsyncSpanHandler<SaveUser> for DbExecutor {
        async fn handle(msg: SaveUser) -> Result<Option<InternalUser>, Report> {
            let username = msg.0.trim().to_owned();
            debug!(username = username.as_str(), "Save new user");
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.create_user(&username).await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Renamed<InternalUser>, Report>")]
pub struct RenameUser(pub UserId, pub String);

async_message_handler_with_span! {
    impl AsyncSpanHandler<RenameUser> for DbExecutor {
        async fn handle(msg: RenameUser) -> Result<Renamed<InternalUser>, Report> {
            let RenameUser(user_id, username) = msg;
            let username = username.trim().to_owned();
            debug!(
                user_id = user_id.as_string().as_str(),
                username = username.as_str(),
                "Renaming user"
            );
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.rename_user(&user_id, &username).await
        }
    }
}

/// Also removes the user's ideas and withdraws their votes.
#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalUser>, Report>")]
pub struct DeleteUser(pub UserId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<DeleteUser> for DbExecutor {
        async fn handle(msg: DeleteUser) -> Result<Option<InternalUser>, Report> {
            let DeleteUser(user_id) = msg;
            debug!(user_id = user_id.as_string().as_str(), "Deleting user");
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.delete_user(&user_id).await
        }
    }
}
