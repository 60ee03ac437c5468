use super::{
    auth::AuthenticatedUser,
    response::{created, ok, ApiError, ApiResult, AtPath},
};
use crate::{
    db::{
        user::{AllUsers, DeleteUser, RenameUser, SaveUser, UserById, UserId},
        DbExecutor, Renamed,
    },
    span::SpanMessage,
};
use actix::SystemService;
use actix_web::{web, HttpRequest};
use serde::Deserialize;
use sqlx::types::Uuid;
use tracing::info;

const USERNAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=30;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub username: String,
}

fn checked_username(username: &str) -> Result<String, ApiError> {
    let username = username.trim();
    if !USERNAME_LENGTH.contains(&username.chars().count()) {
        return Err(ApiError::BadRequest(format!(
            "username must be {} to {} characters",
            USERNAME_LENGTH.start(),
            USERNAME_LENGTH.end()
        )));
    }
    Ok(username.to_owned())
}

fn user_not_found(user_id: &UserId) -> ApiError {
    ApiError::NotFound(format!("user {} not found", user_id.as_string()))
}

/// Users may only change their own account.
fn own_account(user_id: Uuid, caller: &AuthenticatedUser) -> Result<UserId, ApiError> {
    let user_id = UserId(user_id);
    if user_id != caller.0 {
        return Err(ApiError::Forbidden(
            "only the account owner may change this user".to_owned(),
        ));
    }
    Ok(user_id)
}

pub async fn list(req: HttpRequest) -> ApiResult {
    let users = DbExecutor::from_registry()
        .send(SpanMessage::new(AllUsers))
        .await
        .at(&req)?
        .at(&req)?;
    Ok(ok(&req, None, users))
}

pub async fn register(req: HttpRequest, body: web::Json<RegisterBody>) -> ApiResult {
    let username = checked_username(&body.username).at(&req)?;
    let user = DbExecutor::from_registry()
        .send(SpanMessage::new(SaveUser(username.clone())))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| ApiError::Conflict(format!("username {} is taken", username)))
        .at(&req)?;
    info!(user_id = user.id.as_string().as_str(), "User registered");
    Ok(created(&req, "user successfully registered", user))
}

pub async fn get(req: HttpRequest, user_id: web::Path<Uuid>) -> ApiResult {
    let user_id = UserId(user_id.into_inner());
    let user = DbExecutor::from_registry()
        .send(SpanMessage::new(UserById(user_id.clone())))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| user_not_found(&user_id))
        .at(&req)?;
    Ok(ok(&req, None, user))
}

pub async fn update(
    req: HttpRequest,
    user_id: web::Path<Uuid>,
    body: web::Json<RegisterBody>,
    caller: AuthenticatedUser,
) -> ApiResult {
    let user_id = own_account(user_id.into_inner(), &caller).at(&req)?;
    let username = checked_username(&body.username).at(&req)?;
    let renamed = DbExecutor::from_registry()
        .send(SpanMessage::new(RenameUser(user_id.clone(), username.clone())))
        .await
        .at(&req)?
        .at(&req)?;
    let user = match renamed {
        Renamed::Done(user) => Ok(user),
        Renamed::NotFound => Err(user_not_found(&user_id)),
        Renamed::Taken => Err(ApiError::Conflict(format!("username {} is taken", username))),
    }
    .at(&req)?;
    Ok(ok(&req, Some("user successfully updated"), user))
}

pub async fn delete(
    req: HttpRequest,
    user_id: web::Path<Uuid>,
    caller: AuthenticatedUser,
) -> ApiResult {
    let user_id = own_account(user_id.into_inner(), &caller).at(&req)?;
    let user = DbExecutor::from_registry()
        .send(SpanMessage::new(DeleteUser(user_id.clone())))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| user_not_found(&user_id))
        .at(&req)?;
    info!(user_id = user_id.as_string().as_str(), "User deleted");
    Ok(ok(&req, Some("user successfully deleted"), user))
}
