use crate::async_message_handler_with_span;
use crate::{
    db::{
        self,
        idea::{IdeaId, InternalIdea, Pagination},
        tag::TagId,
        target::TargetId,
        user::UserId,
        vote::VoteDirection,
        DbExecutor,
    },
    span::SpanMessage,
};
use actix::prelude::*;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Idea as seen by one caller.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaView {
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
    pub if_i_upvoted: bool,
    pub if_i_downvoted: bool,
}

impl IdeaView {
    fn from_db(idea: InternalIdea, if_i_upvoted: bool, if_i_downvoted: bool) -> Self {
        Self {
            id: idea.id,
            title: idea.title,
            description: idea.description,
            author_id: idea.author_id,
            tags: idea.tags,
            targets: idea.targets,
            upvotes: idea.upvotes,
            downvotes: idea.downvotes,
            created_at: idea.created_at,
            updated_at: idea.updated_at,
            if_i_upvoted,
            if_i_downvoted,
        }
    }
}

/// Flags every idea by membership in the caller's upvoted and downvoted sets.
pub fn annotate_vote_state(
    ideas: Vec<InternalIdea>,
    upvoted: &HashSet<IdeaId>,
    downvoted: &HashSet<IdeaId>,
) -> Vec<IdeaView> {
    ideas
        .into_iter()
        .map(|idea| {
            let if_i_upvoted = upvoted.contains(&idea.id);
            let if_i_downvoted = downvoted.contains(&idea.id);
            IdeaView::from_db(idea, if_i_upvoted, if_i_downvoted)
        })
        .collect()
}

/// Two bulk lookups for the caller, one per direction, regardless of how many
/// ideas are annotated. Anonymous callers get every flag unset.
async fn annotate(
    ideas: Vec<InternalIdea>,
    user_id: Option<UserId>,
) -> Result<Vec<IdeaView>, Report> {
    let user_id = match user_id {
        Some(user_id) if !ideas.is_empty() => user_id,
        _ => return Ok(annotate_vote_state(ideas, &HashSet::new(), &HashSet::new())),
    };
    let idea_ids: Vec<IdeaId> = ideas.iter().map(|idea| idea.id.clone()).collect();
    let voted = |direction| {
        DbExecutor::from_registry().send(SpanMessage::new(db::vote::VotedIdeaIds {
            user_id: user_id.clone(),
            direction,
            ideas: idea_ids.clone(),
        }))
    };
    let (upvoted, downvoted) =
        futures::try_join!(voted(VoteDirection::Up), voted(VoteDirection::Down))?;
    Ok(annotate_vote_state(ideas, &upvoted?, &downvoted?))
}

pub struct IdeaService {}

impl IdeaService {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for IdeaService {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for IdeaService {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Idea service started");
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Vec<IdeaView>, Report>")]
pub struct IdeasForUser {
    pub page: Option<Pagination>,
    pub user_id: Option<UserId>,
}

async_message_handler_with_span! {
    impl AsyncSpanHandler<IdeasForUser> for IdeaService {
        async fn handle(msg: IdeasForUser) -> Result<Vec<IdeaView>, Report> {
            let ideas = DbExecutor::from_registry()
                .send(SpanMessage::new(db::idea::AllIdeas(msg.page)))
                .await??;
            debug!("Annotating {} ideas", ideas.len());
            annotate(ideas, msg.user_id).await
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Option<IdeaView>, Report>")]
pub struct IdeaForUser {
    pub idea_id: IdeaId,
    pub user_id: Option<UserId>,
}

async_message_handler_with_span! {
    impl AsyncSpanHandler<IdeaForUser> for IdeaService {
        async fn handle(msg: IdeaForUser) -> Result<Option<IdeaView>, Report> {
            let idea = DbExecutor::from_registry()
                .send(SpanMessage::new(db::idea::IdeaById(msg.idea_id)))
                .await??;
            match idea {
                Some(idea) => Ok(annotate(vec![idea], msg.user_id).await?.pop()),
                None => Ok(None),
            }
        }
    }
}

impl SystemService for IdeaService {}
impl Supervised for IdeaService {}
