use super::{
    auth::AuthenticatedUser,
    response::{ok, ApiError, ApiResult, AtPath},
};
use crate::{
    db::{
        self,
        idea::IdeaId,
        user::UserId,
        vote::{InternalVote, VoteDirection},
        DbExecutor,
    },
    services::vote::{CastVote, RetractVote, VoteActor, VoteOutcome},
    span::SpanMessage,
};
use actix::SystemService;
use actix_web::{web, HttpRequest};
use serde::Deserialize;
use sqlx::types::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractBody {
    pub idea_id: IdeaId,
}

async fn cast(
    idea_id: IdeaId,
    user_id: UserId,
    direction: VoteDirection,
) -> Result<VoteOutcome, ApiError> {
    Ok(VoteActor::from_registry()
        .send(SpanMessage::new(CastVote {
            idea_id,
            user_id,
            direction,
        }))
        .await??)
}

async fn retract(
    idea_id: IdeaId,
    user_id: UserId,
    direction: VoteDirection,
) -> Result<VoteOutcome, ApiError> {
    Ok(VoteActor::from_registry()
        .send(SpanMessage::new(RetractVote {
            idea_id,
            user_id,
            direction,
        }))
        .await??)
}

async fn cast_reply(
    req: HttpRequest,
    idea_id: Uuid,
    user: AuthenticatedUser,
    direction: VoteDirection,
) -> ApiResult {
    let outcome = cast(IdeaId(idea_id), user.0, direction).await.at(&req)?;
    let message = format!("successfully {}d", direction);
    Ok(ok(&req, Some(&message), outcome))
}

async fn retract_reply(
    req: HttpRequest,
    body: RetractBody,
    user: AuthenticatedUser,
    direction: VoteDirection,
) -> ApiResult {
    let outcome = retract(body.idea_id, user.0, direction).await.at(&req)?;
    let message = format!("{} successfully removed", direction);
    Ok(ok(&req, Some(&message), outcome))
}

pub async fn upvote(
    req: HttpRequest,
    idea_id: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> ApiResult {
    cast_reply(req, idea_id.into_inner(), user, VoteDirection::Up).await
}

pub async fn downvote(
    req: HttpRequest,
    idea_id: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> ApiResult {
    cast_reply(req, idea_id.into_inner(), user, VoteDirection::Down).await
}

pub async fn remove_upvote(
    req: HttpRequest,
    body: web::Json<RetractBody>,
    user: AuthenticatedUser,
) -> ApiResult {
    retract_reply(req, body.into_inner(), user, VoteDirection::Up).await
}

pub async fn remove_downvote(
    req: HttpRequest,
    body: web::Json<RetractBody>,
    user: AuthenticatedUser,
) -> ApiResult {
    retract_reply(req, body.into_inner(), user, VoteDirection::Down).await
}

// Listings

async fn votes_for_idea(
    idea_id: IdeaId,
    direction: VoteDirection,
) -> Result<Vec<InternalVote>, ApiError> {
    let idea = DbExecutor::from_registry()
        .send(SpanMessage::new(db::idea::IdeaById(idea_id.clone())))
        .await??;
    if idea.is_none() {
        return Err(ApiError::NotFound(format!(
            "idea {} not found",
            idea_id.as_string()
        )));
    }
    Ok(DbExecutor::from_registry()
        .send(SpanMessage::new(db::vote::VotesForIdea(idea_id, direction)))
        .await??)
}

async fn votes_by_user(
    user_id: UserId,
    direction: VoteDirection,
) -> Result<Vec<InternalVote>, ApiError> {
    let user = DbExecutor::from_registry()
        .send(SpanMessage::new(db::user::UserById(user_id.clone())))
        .await??;
    if user.is_none() {
        return Err(ApiError::NotFound(format!(
            "user {} not found",
            user_id.as_string()
        )));
    }
    Ok(DbExecutor::from_registry()
        .send(SpanMessage::new(db::vote::VotesByUser(user_id, direction)))
        .await??)
}

pub async fn idea_upvotes(req: HttpRequest, idea_id: web::Path<Uuid>) -> ApiResult {
    let votes = votes_for_idea(IdeaId(idea_id.into_inner()), VoteDirection::Up)
        .await
        .at(&req)?;
    Ok(ok(&req, None, votes))
}

pub async fn idea_downvotes(req: HttpRequest, idea_id: web::Path<Uuid>) -> ApiResult {
    let votes = votes_for_idea(IdeaId(idea_id.into_inner()), VoteDirection::Down)
        .await
        .at(&req)?;
    Ok(ok(&req, None, votes))
}

pub async fn user_upvotes(req: HttpRequest, user_id: web::Path<Uuid>) -> ApiResult {
    let votes = votes_by_user(UserId(user_id.into_inner()), VoteDirection::Up)
        .await
        .at(&req)?;
    Ok(ok(&req, None, votes))
}

pub async fn user_downvotes(req: HttpRequest, user_id: web::Path<Uuid>) -> ApiResult {
    let votes = votes_by_user(UserId(user_id.into_inner()), VoteDirection::Down)
        .await
        .at(&req)?;
    Ok(ok(&req, None, votes))
}
