use super::{
    auth::{AuthenticatedUser, Caller},
    response::{created, ok, ApiError, ApiResult, AtPath},
};
use crate::{
    db::{
        self,
        idea::{IdeaId, IdeaUpdate, InternalIdea, NewIdea, Pagination},
        tag::TagId,
        target::TargetId,
        user::UserId,
        DbExecutor,
    },
    services::idea::{IdeaForUser, IdeaService, IdeaView, IdeasForUser},
    span::SpanMessage,
};
use actix::SystemService;
use actix_web::{web, HttpRequest};
use serde::Deserialize;
use sqlx::types::Uuid;
use std::collections::HashSet;
use tracing::{info, instrument};

const TITLE_LENGTH: std::ops::RangeInclusive<usize> = 3..=100;
const MAX_DESCRIPTION_LENGTH: usize = 1000;
const DEFAULT_PAGE_LIMIT: u32 = 10;
const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    /// No pagination unless `page` or `limit` is given.
    pub fn pagination(&self) -> Result<Option<Pagination>, ApiError> {
        if self.page.is_none() && self.limit.is_none() {
            return Ok(None);
        }
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page == 0 {
            return Err(ApiError::BadRequest("page starts at 1".to_owned()));
        }
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        Ok(Some(Pagination { page, limit }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdeaBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<TagId>,
    #[serde(default)]
    pub targets: Vec<TargetId>,
}

/// Counters are not accepted here; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIdeaBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<TagId>>,
    pub targets: Option<Vec<TargetId>>,
}

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if !TITLE_LENGTH.contains(&title.chars().count()) {
        return Err(ApiError::BadRequest(format!(
            "title must be {} to {} characters",
            TITLE_LENGTH.start(),
            TITLE_LENGTH.end()
        )));
    }
    Ok(title.to_owned())
}

fn validate_description(description: &str) -> Result<String, ApiError> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }
    Ok(description.to_owned())
}

/// Rejects tag and target ids that do not exist.
async fn check_references(
    tags: Option<&[TagId]>,
    targets: Option<&[TargetId]>,
) -> Result<(), ApiError> {
    if let Some(tags) = tags.filter(|tags| !tags.is_empty()) {
        let known: HashSet<TagId> = DbExecutor::from_registry()
            .send(SpanMessage::new(db::tag::AllTags))
            .await??
            .into_iter()
            .map(|tag| tag.id)
            .collect();
        if let Some(unknown) = tags.iter().find(|tag| !known.contains(*tag)) {
            return Err(ApiError::BadRequest(format!("unknown tag {}", unknown.0)));
        }
    }
    if let Some(targets) = targets.filter(|targets| !targets.is_empty()) {
        let known: HashSet<TargetId> = DbExecutor::from_registry()
            .send(SpanMessage::new(db::target::AllTargets))
            .await??
            .into_iter()
            .map(|target| target.id)
            .collect();
        if let Some(unknown) = targets.iter().find(|target| !known.contains(*target)) {
            return Err(ApiError::BadRequest(format!("unknown target {}", unknown.0)));
        }
    }
    Ok(())
}

/// Existing idea that the caller authored.
async fn authored_idea(idea_id: &IdeaId, user_id: &UserId) -> Result<InternalIdea, ApiError> {
    let idea = DbExecutor::from_registry()
        .send(SpanMessage::new(db::idea::IdeaById(idea_id.clone())))
        .await??
        .ok_or_else(|| idea_not_found(idea_id))?;
    if &idea.author_id != user_id {
        return Err(ApiError::Forbidden(
            "only the author may change this idea".to_owned(),
        ));
    }
    Ok(idea)
}

fn idea_not_found(idea_id: &IdeaId) -> ApiError {
    ApiError::NotFound(format!("idea {} not found", idea_id.as_string()))
}

async fn view(idea_id: IdeaId, user_id: Option<UserId>) -> Result<IdeaView, ApiError> {
    IdeaService::from_registry()
        .send(SpanMessage::new(IdeaForUser {
            idea_id: idea_id.clone(),
            user_id,
        }))
        .await??
        .ok_or_else(|| idea_not_found(&idea_id))
}

pub async fn count(req: HttpRequest) -> ApiResult {
    let count = DbExecutor::from_registry()
        .send(SpanMessage::new(db::idea::IdeaCount))
        .await
        .at(&req)?
        .at(&req)?;
    Ok(ok(&req, None, count))
}

#[instrument(skip_all)]
pub async fn list(req: HttpRequest, query: web::Query<PageQuery>, caller: Caller) -> ApiResult {
    let page = query.pagination().at(&req)?;
    let ideas = IdeaService::from_registry()
        .send(SpanMessage::new(IdeasForUser {
            page,
            user_id: caller.0,
        }))
        .await
        .at(&req)?
        .at(&req)?;
    Ok(ok(&req, None, ideas))
}

pub async fn get(req: HttpRequest, idea_id: web::Path<Uuid>, caller: Caller) -> ApiResult {
    let idea = view(IdeaId(idea_id.into_inner()), caller.0).await.at(&req)?;
    Ok(ok(&req, None, idea))
}

#[instrument(skip_all)]
pub async fn create(
    req: HttpRequest,
    body: web::Json<CreateIdeaBody>,
    user: AuthenticatedUser,
) -> ApiResult {
    let body = body.into_inner();
    let new_idea = async {
        check_references(Some(&body.tags), Some(&body.targets)).await?;
        Ok::<_, ApiError>(NewIdea {
            title: validate_title(&body.title)?,
            description: validate_description(&body.description)?,
            author_id: user.0.clone(),
            tags: body.tags,
            targets: body.targets,
        })
    }
    .await
    .at(&req)?;
    let idea = DbExecutor::from_registry()
        .send(SpanMessage::new(db::idea::SaveIdea(new_idea)))
        .await
        .at(&req)?
        .at(&req)?;
    info!(idea_id = idea.id.as_string().as_str(), "Idea created");
    let idea = view(idea.id, Some(user.0)).await.at(&req)?;
    Ok(created(&req, "idea successfully created", idea))
}

pub async fn update(
    req: HttpRequest,
    idea_id: web::Path<Uuid>,
    body: web::Json<UpdateIdeaBody>,
    user: AuthenticatedUser,
) -> ApiResult {
    let idea_id = IdeaId(idea_id.into_inner());
    let body = body.into_inner();
    let update = async {
        let update = IdeaUpdate {
            title: body.title.as_deref().map(validate_title).transpose()?,
            description: body
                .description
                .as_deref()
                .map(validate_description)
                .transpose()?,
            tags: body.tags,
            targets: body.targets,
        };
        if update.is_empty() {
            return Err(ApiError::BadRequest("nothing to update".to_owned()));
        }
        authored_idea(&idea_id, &user.0).await?;
        check_references(update.tags.as_deref(), update.targets.as_deref()).await?;
        Ok::<_, ApiError>(update)
    }
    .await
    .at(&req)?;
    DbExecutor::from_registry()
        .send(SpanMessage::new(db::idea::UpdateIdea(idea_id.clone(), update)))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| idea_not_found(&idea_id))
        .at(&req)?;
    let idea = view(idea_id, Some(user.0)).await.at(&req)?;
    Ok(ok(&req, Some("idea successfully updated"), idea))
}

pub async fn delete(
    req: HttpRequest,
    idea_id: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> ApiResult {
    let idea_id = IdeaId(idea_id.into_inner());
    let idea = view(idea_id.clone(), Some(user.0.clone())).await.at(&req)?;
    authored_idea(&idea_id, &user.0).await.at(&req)?;
    DbExecutor::from_registry()
        .send(SpanMessage::new(db::idea::DeleteIdea(idea_id.clone())))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| idea_not_found(&idea_id))
        .at(&req)?;
    info!(idea_id = idea_id.as_string().as_str(), "Idea deleted");
    Ok(ok(&req, Some("idea successfully deleted"), idea))
}
