use super::{idea::IdeaId, user::UserId, DbExecutor};
use crate::async_message_handler_with_span;
use actix::prelude::*;
use actix_interop::with_ctx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct VoteId(pub Uuid);

impl VoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    /// Table holding the vote records of this direction
    pub(crate) fn table(self) -> &'static str {
        match self {
            VoteDirection::Up => "upvotes",
            VoteDirection::Down => "downvotes",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteDirection::Up => f.write_str("upvote"),
            VoteDirection::Down => f.write_str("downvote"),
        }
    }
}

/// A single upvote or downvote record.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InternalVote {
    pub id: VoteId,
    pub idea_id: IdeaId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct VoteTally {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl VoteTally {
    pub fn count(&self, direction: VoteDirection) -> i64 {
        match direction {
            VoteDirection::Up => self.upvotes,
            VoteDirection::Down => self.downvotes,
        }
    }
}

/// Vote records one user holds on one idea.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteRecords {
    pub upvote: Option<InternalVote>,
    pub downvote: Option<InternalVote>,
}

/// A storage transaction scoped to one idea. The idea is locked for the
/// lifetime of the transaction. Dropping it without `commit` rolls back every
/// change made through it.
#[async_trait]
pub trait VoteTransaction: Send {
    fn idea_id(&self) -> &IdeaId;

    /// Counters of the locked idea as last read or written in this transaction.
    fn tally(&self) -> VoteTally;

    async fn vote_records(&mut self, user_id: &UserId) -> Result<VoteRecords, Report>;

    async fn insert_vote(
        &mut self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<InternalVote, Report>;

    /// Returns the deleted record, `None` if there was nothing to delete.
    async fn delete_vote(
        &mut self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<Option<InternalVote>, Report>;

    /// Adds `delta` to the counter of `direction`. Returns `None` when the
    /// idea row no longer exists.
    async fn adjust_tally(
        &mut self,
        direction: VoteDirection,
        delta: i64,
    ) -> Result<Option<VoteTally>, Report>;

    async fn commit(self: Box<Self>) -> Result<(), Report>;
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<InternalVote>, Report>")]
pub struct VotesForIdea(pub IdeaId, pub VoteDirection);

async_message_handler_with_span! {
    impl AsyncSpanHandler<VotesForIdea> for DbExecutor {
        async fn handle(msg: VotesForIdea) -> Result<Vec<InternalVote>, Report> {
            let VotesForIdea(idea_id, direction) = msg;
            debug!("Retrieving {direction}s for idea {id}", direction = direction, id = idea_id.0);
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.votes_for_idea(&idea_id, direction).await
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<InternalVote>, Report>")]
pub struct VotesByUser(pub UserId, pub VoteDirection);

async_message_handler_with_span! {
    impl AsyncSpanHandler<VotesByUser> for DbExecutor {
        async fn handle(msg: VotesByUser) -> Result<Vec<InternalVote>, Report> {
            let VotesByUser(user_id, direction) = msg;
            debug!(
                user_id = user_id.as_string().as_str(),
                "Retrieving {direction}s cast by user",
                direction = direction
            );
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.votes_by_user(&user_id, direction).await
        }
    }
}

/// Ids of the ideas among `ideas` that the user voted on in one direction.
#[derive(Message, Clone)]
#[rtype(result = "Result<HashSet<IdeaId>, Report>")]
pub struct VotedIdeaIds {
    pub user_id: UserId,
    pub direction: VoteDirection,
    pub ideas: Vec<IdeaId>,
}

async_message_handler_with_span! {
    impl AsyncSpanHandler<VotedIdeaIds> for DbExecutor {
        async fn handle(msg: VotedIdeaIds) -> Result<HashSet<IdeaId>, Report> {
            let VotedIdeaIds { user_id, direction, ideas } = msg;
            if ideas.is_empty() {
                return Ok(HashSet::new());
            }
            let store = with_ctx(|a: &mut DbExecutor, _| a.store());
            store.voted_idea_ids(&user_id, direction, &ideas).await
        }
    }
}
