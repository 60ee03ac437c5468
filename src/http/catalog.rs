//! Tags and targets that ideas can be filed under.

use super::response::{created, ok, ApiError, ApiResult, AtPath};
use crate::{
    db::{
        self,
        tag::{normalize_name, TagId},
        Renamed,
        target::TargetId,
        DbExecutor,
    },
    span::SpanMessage,
};
use actix::SystemService;
use actix_web::{web, HttpRequest};
use serde::Deserialize;
use sqlx::types::Uuid;

#[derive(Debug, Deserialize)]
pub struct NameBody {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagQuery {
    pub name: Option<String>,
}

fn checked_name(name: &str) -> Result<String, ApiError> {
    let name = normalize_name(name);
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_owned()));
    }
    Ok(name)
}

pub async fn list_tags(req: HttpRequest, query: web::Query<TagQuery>) -> ApiResult {
    let executor = DbExecutor::from_registry();
    let tags = match query.into_inner().name {
        Some(fragment) => {
            executor
                .send(SpanMessage::new(db::tag::TagsMatching(fragment)))
                .await
        }
        None => executor.send(SpanMessage::new(db::tag::AllTags)).await,
    }
    .at(&req)?
    .at(&req)?;
    Ok(ok(&req, None, tags))
}

pub async fn count_tags(req: HttpRequest) -> ApiResult {
    let count = DbExecutor::from_registry()
        .send(SpanMessage::new(db::tag::TagCount))
        .await
        .at(&req)?
        .at(&req)?;
    Ok(ok(&req, None, count))
}

fn tag_not_found(tag_id: &TagId) -> ApiError {
    ApiError::NotFound(format!("tag {} not found", tag_id.0))
}

fn target_not_found(target_id: &TargetId) -> ApiError {
    ApiError::NotFound(format!("target {} not found", target_id.0))
}

pub async fn get_tag(req: HttpRequest, tag_id: web::Path<Uuid>) -> ApiResult {
    let tag_id = TagId(tag_id.into_inner());
    let tag = DbExecutor::from_registry()
        .send(SpanMessage::new(db::tag::TagById(tag_id.clone())))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| tag_not_found(&tag_id))
        .at(&req)?;
    Ok(ok(&req, None, tag))
}

pub async fn create_tag(req: HttpRequest, body: web::Json<NameBody>) -> ApiResult {
    let name = checked_name(&body.name).at(&req)?;
    let tag = DbExecutor::from_registry()
        .send(SpanMessage::new(db::tag::SaveTag(name.clone())))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| ApiError::Conflict(format!("tag {} already exists", name)))
        .at(&req)?;
    Ok(created(&req, "tag successfully created", tag))
}

pub async fn rename_tag(
    req: HttpRequest,
    tag_id: web::Path<Uuid>,
    body: web::Json<NameBody>,
) -> ApiResult {
    let tag_id = TagId(tag_id.into_inner());
    let name = checked_name(&body.name).at(&req)?;
    let renamed = DbExecutor::from_registry()
        .send(SpanMessage::new(db::tag::RenameTag(tag_id.clone(), name.clone())))
        .await
        .at(&req)?
        .at(&req)?;
    let tag = match renamed {
        Renamed::Done(tag) => Ok(tag),
        Renamed::NotFound => Err(tag_not_found(&tag_id)),
        Renamed::Taken => Err(ApiError::Conflict(format!("tag {} already exists", name))),
    }
    .at(&req)?;
    Ok(ok(&req, Some("tag successfully updated"), tag))
}

pub async fn delete_tag(req: HttpRequest, tag_id: web::Path<Uuid>) -> ApiResult {
    let tag_id = TagId(tag_id.into_inner());
    let tag = DbExecutor::from_registry()
        .send(SpanMessage::new(db::tag::DeleteTag(tag_id.clone())))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| tag_not_found(&tag_id))
        .at(&req)?;
    Ok(ok(&req, Some("tag successfully deleted"), tag))
}

pub async fn list_targets(req: HttpRequest) -> ApiResult {
    let targets = DbExecutor::from_registry()
        .send(SpanMessage::new(db::target::AllTargets))
        .await
        .at(&req)?
        .at(&req)?;
    Ok(ok(&req, None, targets))
}

pub async fn count_targets(req: HttpRequest) -> ApiResult {
    let count = DbExecutor::from_registry()
        .send(SpanMessage::new(db::target::TargetCount))
        .await
        .at(&req)?
        .at(&req)?;
    Ok(ok(&req, None, count))
}

pub async fn get_target(req: HttpRequest, target_id: web::Path<Uuid>) -> ApiResult {
    let target_id = TargetId(target_id.into_inner());
    let target = DbExecutor::from_registry()
        .send(SpanMessage::new(db::target::TargetById(target_id.clone())))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| target_not_found(&target_id))
        .at(&req)?;
    Ok(ok(&req, None, target))
}

pub async fn create_target(req: HttpRequest, body: web::Json<NameBody>) -> ApiResult {
    let name = checked_name(&body.name).at(&req)?;
    let target = DbExecutor::from_registry()
        .send(SpanMessage::new(db::target::SaveTarget(name)))
        .await
        .at(&req)?
        .at(&req)?;
    Ok(created(&req, "target successfully created", target))
}

pub async fn rename_target(
    req: HttpRequest,
    target_id: web::Path<Uuid>,
    body: web::Json<NameBody>,
) -> ApiResult {
    let target_id = TargetId(target_id.into_inner());
    let name = checked_name(&body.name).at(&req)?;
    let target = DbExecutor::from_registry()
        .send(SpanMessage::new(db::target::RenameTarget(target_id.clone(), name)))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| target_not_found(&target_id))
        .at(&req)?;
    Ok(ok(&req, Some("target successfully updated"), target))
}

pub async fn delete_target(req: HttpRequest, target_id: web::Path<Uuid>) -> ApiResult {
    let target_id = TargetId(target_id.into_inner());
    let target = DbExecutor::from_registry()
        .send(SpanMessage::new(db::target::DeleteTarget(target_id.clone())))
        .await
        .at(&req)?
        .at(&req)?
        .ok_or_else(|| target_not_found(&target_id))
        .at(&req)?;
    Ok(ok(&req, Some("target successfully deleted"), target))
}
