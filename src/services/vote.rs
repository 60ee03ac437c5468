//! Vote coordination: the per-(idea, user) state machine and the transaction
//! that applies its effects to vote records and idea counters.

use crate::async_message_handler_with_span;
use crate::db::{
    idea::IdeaId,
    user::UserId,
    vote::{VoteDirection, VoteRecords, VoteTally, VoteTransaction},
    Store,
};
use actix::prelude::*;
use actix_interop::with_ctx;
use color_eyre::eyre::Report;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteState {
    None,
    Upvoted,
    Downvoted,
}

impl VoteState {
    fn from_records(records: &VoteRecords) -> Result<Self, VoteError> {
        match (&records.upvote, &records.downvote) {
            (None, None) => Ok(VoteState::None),
            (Some(_), None) => Ok(VoteState::Upvoted),
            (None, Some(_)) => Ok(VoteState::Downvoted),
            (Some(up), Some(_)) => Err(VoteError::ConsistencyViolation(format!(
                "user {} holds both an upvote and a downvote on idea {}",
                up.user_id.as_string(),
                up.idea_id.as_string()
            ))),
        }
    }

    fn held(self) -> Option<VoteDirection> {
        match self {
            VoteState::None => None,
            VoteState::Upvoted => Some(VoteDirection::Up),
            VoteState::Downvoted => Some(VoteDirection::Down),
        }
    }

    fn holding(direction: VoteDirection) -> Self {
        match direction {
            VoteDirection::Up => VoteState::Upvoted,
            VoteDirection::Down => VoteState::Downvoted,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteRequest {
    Cast(VoteDirection),
    Retract(VoteDirection),
}

impl fmt::Display for VoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteRequest::Cast(direction) => write!(f, "cast {}", direction),
            VoteRequest::Retract(direction) => write!(f, "retract {}", direction),
        }
    }
}

/// Effects of one accepted request. `retract` is applied before `cast`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub retract: Option<VoteDirection>,
    pub cast: Option<VoteDirection>,
    pub next: VoteState,
}

/// Decides what a request does from the current state. Rejections leave the
/// state untouched.
pub fn transition(current: VoteState, request: VoteRequest) -> Result<Transition, VoteError> {
    match request {
        VoteRequest::Cast(direction) => {
            if current.held() == Some(direction) {
                return Err(VoteError::DuplicateVote(direction));
            }
            Ok(Transition {
                retract: current.held(),
                cast: Some(direction),
                next: VoteState::holding(direction),
            })
        }
        VoteRequest::Retract(direction) => {
            if current.held() != Some(direction) {
                return Err(VoteError::NoSuchVote(direction));
            }
            Ok(Transition {
                retract: Some(direction),
                cast: None,
                next: VoteState::None,
            })
        }
    }
}

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("idea {} not found", .0.as_string())]
    NotFound(IdeaId),
    #[error("you have already {0}d this idea")]
    DuplicateVote(VoteDirection),
    #[error("you haven't {0}d this idea yet")]
    NoSuchVote(VoteDirection),
    #[error("vote consistency violated: {0}")]
    ConsistencyViolation(String),
    #[error("storage failure: {0}")]
    Storage(Report),
}

impl From<Report> for VoteError {
    fn from(report: Report) -> Self {
        VoteError::Storage(report)
    }
}

/// Committed result of a vote request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub idea_id: IdeaId,
    pub user_id: UserId,
    pub state: VoteState,
    pub upvotes: i64,
    pub downvotes: i64,
}

/// Runs vote requests as one storage transaction each. Holds no locks of its
/// own; concurrent requests on an idea are serialized by the store.
#[derive(Clone)]
pub struct VoteCoordinator {
    store: Arc<dyn Store>,
}

impl fmt::Debug for VoteCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoteCoordinator").finish()
    }
}

impl VoteCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn cast_vote(
        &self,
        idea_id: IdeaId,
        user_id: UserId,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, VoteError> {
        self.apply(idea_id, user_id, VoteRequest::Cast(direction))
            .await
    }

    pub async fn retract_vote(
        &self,
        idea_id: IdeaId,
        user_id: UserId,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, VoteError> {
        self.apply(idea_id, user_id, VoteRequest::Retract(direction))
            .await
    }

    #[instrument(skip_all, fields(idea_id = %idea_id.0, user_id = %user_id.0, %request))]
    async fn apply(
        &self,
        idea_id: IdeaId,
        user_id: UserId,
        request: VoteRequest,
    ) -> Result<VoteOutcome, VoteError> {
        let mut tx = self
            .store
            .begin_vote(&idea_id)
            .await?
            .ok_or_else(|| VoteError::NotFound(idea_id.clone()))?;

        let records = tx.vote_records(&user_id).await?;
        let current = VoteState::from_records(&records).map_err(log_violation)?;
        let step = transition(current, request)?;
        debug!(?current, next = ?step.next, "Applying vote transition");

        let mut tally = tx.tally();
        if let Some(direction) = step.retract {
            tally = retract(&mut *tx, &user_id, direction)
                .await
                .map_err(log_violation)?;
        }
        if let Some(direction) = step.cast {
            tally = cast(&mut *tx, &user_id, direction)
                .await
                .map_err(log_violation)?;
        }
        tx.commit().await?;

        info!(
            upvotes = tally.upvotes,
            downvotes = tally.downvotes,
            "Vote committed"
        );
        Ok(VoteOutcome {
            idea_id,
            user_id,
            state: step.next,
            upvotes: tally.upvotes,
            downvotes: tally.downvotes,
        })
    }
}

fn log_violation(err: VoteError) -> VoteError {
    if let VoteError::ConsistencyViolation(reason) = &err {
        error!(reason = reason.as_str(), "Vote consistency violated");
    }
    err
}

async fn retract(
    tx: &mut dyn VoteTransaction,
    user_id: &UserId,
    direction: VoteDirection,
) -> Result<VoteTally, VoteError> {
    if tx.tally().count(direction) < 1 {
        return Err(VoteError::ConsistencyViolation(format!(
            "{} counter of idea {} would drop below zero",
            direction,
            tx.idea_id().as_string()
        )));
    }
    if tx.delete_vote(user_id, direction).await?.is_none() {
        return Err(VoteError::ConsistencyViolation(format!(
            "{} record of user {} on idea {} vanished during the transaction",
            direction,
            user_id.as_string(),
            tx.idea_id().as_string()
        )));
    }
    adjust(tx, direction, -1).await
}

async fn cast(
    tx: &mut dyn VoteTransaction,
    user_id: &UserId,
    direction: VoteDirection,
) -> Result<VoteTally, VoteError> {
    tx.insert_vote(user_id, direction).await?;
    adjust(tx, direction, 1).await
}

async fn adjust(
    tx: &mut dyn VoteTransaction,
    direction: VoteDirection,
    delta: i64,
) -> Result<VoteTally, VoteError> {
    let tally = tx.adjust_tally(direction, delta).await?.ok_or_else(|| {
        VoteError::ConsistencyViolation(format!(
            "idea {} vanished during the transaction",
            tx.idea_id().as_string()
        ))
    })?;
    if tally.upvotes < 0 || tally.downvotes < 0 {
        return Err(VoteError::ConsistencyViolation(format!(
            "idea {} counters went negative ({}, {})",
            tx.idea_id().as_string(),
            tally.upvotes,
            tally.downvotes
        )));
    }
    Ok(tally)
}

// Actor

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<VoteOutcome, VoteError>")]
pub struct CastVote {
    pub idea_id: IdeaId,
    pub user_id: UserId,
    pub direction: VoteDirection,
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<VoteOutcome, VoteError>")]
pub struct RetractVote {
    pub idea_id: IdeaId,
    pub user_id: UserId,
    pub direction: VoteDirection,
}

#[derive(Debug)]
pub struct VoteActor {
    coordinator: VoteCoordinator,
}

impl VoteActor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            coordinator: VoteCoordinator::new(store),
        }
    }

    fn coordinator(&mut self) -> VoteCoordinator {
        self.coordinator.clone()
    }
}

impl Default for VoteActor {
    fn default() -> Self {
        unimplemented!("Vote actor can't be unitialized using default because it needs a store")
    }
}

impl Actor for VoteActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Vote actor started");
    }
}

async_message_handler_with_span! {
    impl AsyncSpanHandler<CastVote> for VoteActor {
        async fn handle(msg: CastVote) -> Result<VoteOutcome, VoteError> {
            debug!("VoteActor handling CastVote");
            let coordinator = with_ctx(|a: &mut VoteActor, _| a.coordinator());
            coordinator
                .cast_vote(msg.idea_id, msg.user_id, msg.direction)
                .await
        }
    }
}

async_message_handler_with_span! {
    impl AsyncSpanHandler<RetractVote> for VoteActor {
        async fn handle(msg: RetractVote) -> Result<VoteOutcome, VoteError> {
            debug!("VoteActor handling RetractVote");
            let coordinator = with_ctx(|a: &mut VoteActor, _| a.coordinator());
            coordinator
                .retract_vote(msg.idea_id, msg.user_id, msg.direction)
                .await
        }
    }
}

impl SystemService for VoteActor {}
impl Supervised for VoteActor {}
