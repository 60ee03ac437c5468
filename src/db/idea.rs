use super::{tag::TagId, target::TargetId, user::UserId, vote::VoteTally, DbExecutor};
use crate::async_message_handler_with_span;
use actix::prelude::*;
use actix_interop::with_ctx;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use std::collections::HashSet;
use std::hash::Hash;
use tracing::{debug, instrument};

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct IdeaId(pub Uuid);

impl IdeaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_string(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

/// Idea as persisted. `upvotes` and `downvotes` cache the number of live vote
/// records and are only written by a vote transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct InternalIdea {
    pub id: IdeaId,
    pub title: String,
    pub description: String,
    pub author_id: UserId,
    pub tags: Vec<TagId>,
    pub targets: Vec<TargetId>,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InternalIdea {
    pub fn tally(&self) -> VoteTally {
        VoteTally {
            upvotes: self.upvotes,
            downvotes: self.downvotes,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewIdea {
    pub title: String,
    pub description: String,
    pub author_id: UserId,
    pub tags: Vec<TagId>,
    pub targets: Vec<TargetId>,
}

/// Fields a generic idea update may touch. Vote counters are not among them.
#[derive(Clone, Debug, Default)]
pub struct IdeaUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<TagId>>,
    pub targets: Option<Vec<TargetId>>,
}

impl IdeaUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.targets.is_none()
    }

    pub fn apply(self, idea: &mut InternalIdea) {
        if let Some(title) = self.title {
            idea.title = title;
        }
        if let Some(description) = self.description {
            idea.description = description;
        }
        if let Some(tags) = self.tags {
            idea.tags = tags;
        }
        if let Some(targets) = self.targets {
            idea.targets = targets;
        }
    }
}

/// Removes repeated ids while keeping first-seen order.
pub(crate) fn unique_ids<T: Clone + Eq + Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<i64, Report>")]
pub struct IdeaCount;

async_message_handler_with_span! {
    impl AsyncSpanHandler<IdeaCount> for DbExecutor {
        async fn handle(_msg: IdeaCount) -> Result<i64, Report> {
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.idea_count().await
        }
    }
}

/// Ideas ordered by creation time, newest first.
#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Vec<InternalIdea>, Report>")]
pub struct AllIdeas(pub Option<Pagination>);

async_message_handler_with_span! {
    impl AsyncSpanHandler<AllIdeas> for DbExecutor {
        #[instrument]
        async fn handle(msg: AllIdeas) -> Result<Vec<InternalIdea>, Report> {
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            let ideas = store.all_ideas(msg.0).await?;
            debug!("Ideas found {}", ideas.len());
            Ok(ideas)
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Option<InternalIdea>, Report>")]
pub struct IdeaById(pub IdeaId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<IdeaById> for DbExecutor {
        async fn handle(msg: IdeaById) -> Result<Option<InternalIdea>, Report> {
            let IdeaById(idea_id) = msg;
            debug!("Retrieving idea by id {id}", id = idea_id.0);
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.idea_by_id(&idea_id).await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<InternalIdea, Report>")]
pub struct SaveIdea(pub NewIdea);

async_message_handler_with_span! {
    impl AsyncSpanHandler<SaveIdea> for DbExecutor {
        async fn handle(msg: SaveIdea) -> Result<InternalIdea, Report> {
            let SaveIdea(idea) = msg;
            debug!(
                author_id = idea.author_id.as_string().as_str(),
                "Save new idea"
            );
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.create_idea(idea).await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalIdea>, Report>")]
pub struct UpdateIdea(pub IdeaId, pub IdeaUpdate);

async_message_handler_with_span! {
    impl AsyncSpanHandler<UpdateIdea> for DbExecutor {
        async fn handle(msg: UpdateIdea) -> Result<Option<InternalIdea>, Report> {
            let UpdateIdea(idea_id, update) = msg;
            debug!("Updating idea {id}", id = idea_id.0);
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.update_idea(&idea_id, update).await
        }
    }
}

/// Deletes the idea together with its vote records.
#[derive(Message, Clone)]
#[rtype(result = "Result<Option<InternalIdea>, Report>")]
pub struct DeleteIdea(pub IdeaId);

async_message_handler_with_span! {
    impl AsyncSpanHandler<DeleteIdea> for DbExecutor {
        async fn handle(msg: DeleteIdea) -> Result<Option<InternalIdea>, Report> {
            let DeleteIdea(idea_id) = msg;
            debug!("Deleting idea {id}", id = idea_id.0);
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.delete_idea(&idea_id).await
        }
    }
}
