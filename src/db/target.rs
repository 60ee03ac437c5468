use super::{tag::normalize_name, DbExecutor};
use crate::async_message_handler_with_span;
use actix::prelude::*;
use actix_interop::with_ctx;
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use tracing::debug;

/// Audience an idea is aimed at, e.g. "students".
#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TargetId(pub Uuid);

impl TargetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct InternalTarget {
    pub id: TargetId,
    pub name: String,
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<InternalTarget>, Report>")]
pub struct AllTargets;

async_message_handler_with_span! {
    impl AsyncSpanHandler<AllTargets> for DbExecutor {
        async fn handle(_msg: AllTargets) -> Result<Vec<InternalTarget>, Report> {
            debug!("Retrieving all targets");
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.all_targets().await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<i64, Report>")]
pub struct TargetCount;

async_message_handler_with_span! {
    impl AsyncSpanHandler<TargetCount> for DbExecutor {
        async fn handle(_msg: TargetCount) -> Result<i64, Report> {
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            Ok(store.all_targets().await?.len() as i64)
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalTarget>, Report>")]
pub struct TargetById(pub TargetId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<TargetById> for DbExecutor {
        async fn handle(msg: TargetById) -> Result<Option<InternalTarget>, Report> {
            let TargetById(target_id) = msg;
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            let targets = store.all_targets().await?;
            Ok(targets.into_iter().find(|target| target.id == target_id))
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<InternalTarget, Report>")]
pub struct SaveTarget(pub String);

async_message_handler_with_span! {
    impl AsyncSpanHandler<SaveTarget> for DbExecutor {
        async fn handle(msg: SaveTarget) -> Result<InternalTarget, Report> {
            let name = normalize_name(&msg.0);
            debug!(name = name.as_str(), "Save new target");
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.create_target(&name).await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalTarget>, Report>")]
pub struct RenameTarget(pub TargetId, pub String);

async_message_handler_with_span! {
    impl AsyncSpanHandler<RenameTarget> for DbExecutor {
        async fn handle(msg: RenameTarget) -> Result<Option<InternalTarget>, Report> {
            let RenameTarget(target_id, name) = msg;
            let name = normalize_name(&name);
            debug!(name = name.as_str(), "Renaming target {id}", id = target_id.0);
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.rename_target(&target_id, &name).await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalTarget>, Report>")]
pub struct DeleteTarget(pub TargetId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<DeleteTarget> for DbExecutor {
        async fn handle(msg: DeleteTarget) -> Result<Option<InternalTarget>, Report> {
            let DeleteTarget(target_id) = msg;
            debug!("Deleting target {id}", id = target_id.0);
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.delete_target(&target_id).await
        }
    }
}
