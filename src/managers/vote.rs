use super::Tables;
use crate::db::{
    idea::IdeaId,
    user::UserId,
    vote::{InternalVote, VoteDirection, VoteId, VoteRecords, VoteTally, VoteTransaction},
};
use async_trait::async_trait;
use chrono::Utc;
use color_eyre::eyre::{eyre, Report};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Inverse of one change made inside a transaction
enum Undo {
    Inserted(VoteDirection, UserId),
    Deleted(VoteDirection, InternalVote),
    Adjusted(VoteDirection, i64),
}

/// Writes go straight to the tables while the guard is held. Each write pushes
/// its inverse so that dropping an uncommitted transaction can replay them.
pub struct MemoryVoteTransaction {
    tables: OwnedMutexGuard<Tables>,
    idea_id: IdeaId,
    tally: VoteTally,
    undo: Vec<Undo>,
}

impl MemoryVoteTransaction {
    pub(super) fn begin(tables: OwnedMutexGuard<Tables>, idea_id: IdeaId) -> Option<Self> {
        let tally = tables.ideas.get(&idea_id)?.tally();
        Some(Self {
            tables,
            idea_id,
            tally,
            undo: Vec::new(),
        })
    }

    fn key(&self, user_id: &UserId) -> (IdeaId, UserId) {
        (self.idea_id.clone(), user_id.clone())
    }

    fn counter(&mut self, direction: VoteDirection) -> Option<&mut i64> {
        let idea = self.tables.ideas.get_mut(&self.idea_id)?;
        Some(match direction {
            VoteDirection::Up => &mut idea.upvotes,
            VoteDirection::Down => &mut idea.downvotes,
        })
    }
}

impl Drop for MemoryVoteTransaction {
    fn drop(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        debug!(
            idea_id = self.idea_id.as_string().as_str(),
            "Rolling back {} uncommitted change(s)",
            self.undo.len()
        );
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Inserted(direction, user_id) => {
                    let key = self.key(&user_id);
                    self.tables.votes_mut(direction).remove(&key);
                }
                Undo::Deleted(direction, vote) => {
                    let key = self.key(&vote.user_id);
                    self.tables.votes_mut(direction).insert(key, vote);
                }
                Undo::Adjusted(direction, delta) => {
                    if let Some(counter) = self.counter(direction) {
                        *counter -= delta;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl VoteTransaction for MemoryVoteTransaction {
    fn idea_id(&self) -> &IdeaId {
        &self.idea_id
    }

    fn tally(&self) -> VoteTally {
        self.tally
    }

    async fn vote_records(&mut self, user_id: &UserId) -> Result<VoteRecords, Report> {
        let key = self.key(user_id);
        Ok(VoteRecords {
            upvote: self.tables.upvotes.get(&key).cloned(),
            downvote: self.tables.downvotes.get(&key).cloned(),
        })
    }

    async fn insert_vote(
        &mut self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<InternalVote, Report> {
        if !self.tables.users.contains_key(user_id) {
            return Err(eyre!("unknown voter {}", user_id.as_string()));
        }
        let key = self.key(user_id);
        let votes = self.tables.votes_mut(direction);
        if votes.contains_key(&key) {
            return Err(eyre!(
                "duplicate {} record for user {} on idea {}",
                direction,
                user_id.as_string(),
                self.idea_id.as_string()
            ));
        }
        let vote = InternalVote {
            id: VoteId::new(),
            idea_id: self.idea_id.clone(),
            user_id: user_id.clone(),
            created_at: Utc::now(),
        };
        votes.insert(key, vote.clone());
        self.undo.push(Undo::Inserted(direction, user_id.clone()));
        Ok(vote)
    }

    async fn delete_vote(
        &mut self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<Option<InternalVote>, Report> {
        let key = self.key(user_id);
        let vote = self.tables.votes_mut(direction).remove(&key);
        if let Some(vote) = &vote {
            self.undo.push(Undo::Deleted(direction, vote.clone()));
        }
        Ok(vote)
    }

    async fn adjust_tally(
        &mut self,
        direction: VoteDirection,
        delta: i64,
    ) -> Result<Option<VoteTally>, Report> {
        let counter = match self.counter(direction) {
            Some(counter) => counter,
            None => return Ok(None),
        };
        *counter += delta;
        self.undo.push(Undo::Adjusted(direction, delta));
        self.tally = match self.tables.ideas.get(&self.idea_id) {
            Some(idea) => idea.tally(),
            None => return Ok(None),
        };
        Ok(Some(self.tally))
    }

    async fn commit(self: Box<Self>) -> Result<(), Report> {
        let mut this = self;
        this.undo.clear();
        Ok(())
    }
}
