use super::{DbExecutor, Renamed};
use crate::async_message_handler_with_span;
use actix::prelude::*;
use actix_interop::with_ctx;
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TagId(pub Uuid);

impl TagId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct InternalTag {
    pub id: TagId,
    pub name: String,
}

/// Tag and target names are stored trimmed and lowercased.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<InternalTag>, Report>")]
pub struct AllTags;

async_message_handler_with_span! {
    impl AsyncSpanHandler<AllTags> for DbExecutor {
        async fn handle(_msg: AllTags) -> Result<Vec<InternalTag>, Report> {
            debug!("Retrieving all tags");
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.all_tags().await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<i64, Report>")]
pub struct TagCount;

async_message_handler_with_span! {
    impl AsyncSpanHandler<TagCount> for DbExecutor {
        async fn handle(_msg: TagCount) -> Result<i64, Report> {
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            Ok(store.all_tags().await?.len() as i64)
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalTag>, Report>")]
pub struct TagById(pub TagId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<TagById> for DbExecutor {
        async fn handle(msg: TagById) -> Result<Option<InternalTag>, Report> {
            let TagById(tag_id) = msg;
            debug!("Get tag {id}", id = tag_id.0);
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            let tags = store.all_tags().await?;
            Ok(tags.into_iter().find(|tag| tag.id == tag_id))
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<InternalTag>, Report>")]
pub struct TagsMatching(pub String);

async_message_handler_with_span! {
    impl AsyncSpanHandler<TagsMatching> for DbExecutor {
        async fn handle(msg: TagsMatching) -> Result<Vec<InternalTag>, Report> {
            let fragment = normalize_name(&msg.0);
            debug!(fragment = fragment.as_str(), "Filtering tags");
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            let tags = store.all_tags().await?;
            Ok(tags
                .into_iter()
                .filter(|tag| tag.name.contains(&fragment))
                .collect())
        }
    }
}

/// Resolves to `None` when a tag with the same name exists.
#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalTag>, Report>")]
pub struct SaveTag(pub String);

async_message_handler_with_span! {
    impl AsyncSpanHandler<SaveTag> for DbExecutor {
        async fn handle(msg: SaveTag) -> Result<Option<InternalTag>, Report> {
            let name = normalize_name(&msg.0);
            debug!(name = name.as_str(), "Save new tag");
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.create_tag(&name).await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Renamed<InternalTag>, Report>")]
pub struct RenameTag(pub TagId, pub String);

async_message_handler_with_span! {
    impl AsyncSpanHandler<RenameTag> for DbExecutor {
        async fn handle(msg: RenameTag) -> Result<Renamed<InternalTag>, Report> {
            let RenameTag(tag_id, name) = msg;
            let name = normalize_name(&name);
            debug!(name = name.as_str(), "Renaming tag {id}", id = tag_id.0);
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.rename_tag(&tag_id, &name).await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalTag>, Report>")]
pub struct DeleteTag(pub TagId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<DeleteTag> for DbExecutor {
        async fn handle(msg: DeleteTag) -> Result<Option<InternalTag>, Report> {
            let DeleteTag(tag_id) = msg;
            debug!("Deleting tag {id}", id = tag_id.0);
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.delete_tag(&tag_id).await
        }
    }
}
