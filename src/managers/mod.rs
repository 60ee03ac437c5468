//! In-memory [`Store`] used when no database is configured, and by tests.

pub mod vote;

use crate::db::{
    idea::{unique_ids, IdeaId, IdeaUpdate, InternalIdea, NewIdea, Pagination},
    tag::{InternalTag, TagId},
    target::{InternalTarget, TargetId},
    user::{InternalUser, UserId},
    vote::{InternalVote, VoteDirection, VoteTransaction},
    Renamed, Store,
};
use async_trait::async_trait;
use chrono::Utc;
use color_eyre::eyre::{eyre, Report};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use vote::MemoryVoteTransaction;

type VoteKey = (IdeaId, UserId);

#[derive(Default)]
pub struct Tables {
    users: HashMap<UserId, InternalUser>,
    tags: HashMap<TagId, InternalTag>,
    targets: HashMap<TargetId, InternalTarget>,
    ideas: HashMap<IdeaId, InternalIdea>,
    upvotes: HashMap<VoteKey, InternalVote>,
    downvotes: HashMap<VoteKey, InternalVote>,
}

impl Tables {
    fn votes(&self, direction: VoteDirection) -> &HashMap<VoteKey, InternalVote> {
        match direction {
            VoteDirection::Up => &self.upvotes,
            VoteDirection::Down => &self.downvotes,
        }
    }

    fn votes_mut(&mut self, direction: VoteDirection) -> &mut HashMap<VoteKey, InternalVote> {
        match direction {
            VoteDirection::Up => &mut self.upvotes,
            VoteDirection::Down => &mut self.downvotes,
        }
    }

    fn sorted_votes<F>(&self, direction: VoteDirection, filter: F) -> Vec<InternalVote>
    where
        F: Fn(&InternalVote) -> bool,
    {
        let mut votes: Vec<InternalVote> = self
            .votes(direction)
            .values()
            .filter(|vote| filter(vote))
            .cloned()
            .collect();
        votes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        votes
    }

    fn check_references(
        &self,
        author_id: &UserId,
        tags: &[TagId],
        targets: &[TargetId],
    ) -> Result<(), Report> {
        if !self.users.contains_key(author_id) {
            return Err(eyre!("unknown author {}", author_id.as_string()));
        }
        if let Some(tag) = tags.iter().find(|tag| !self.tags.contains_key(*tag)) {
            return Err(eyre!("unknown tag {}", tag.0));
        }
        if let Some(target) = targets.iter().find(|target| !self.targets.contains_key(*target)) {
            return Err(eyre!("unknown target {}", target.0));
        }
        Ok(())
    }
}

/// All tables live behind one mutex. A vote transaction holds the guard until
/// it commits or is dropped.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_by_id(&self, user_id: &UserId) -> Result<Option<InternalUser>, Report> {
        Ok(self.tables.lock().await.users.get(user_id).cloned())
    }

    async fn all_users(&self) -> Result<Vec<InternalUser>, Report> {
        let mut users: Vec<InternalUser> =
            self.tables.lock().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn create_user(&self, username: &str) -> Result<Option<InternalUser>, Report> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|user| user.username == username) {
            return Ok(None);
        }
        let user = InternalUser {
            id: UserId::new(),
            username: username.to_owned(),
            created_at: Utc::now(),
        };
        tables.users.insert(user.id.clone(), user.clone());
        Ok(Some(user))
    }

    async fn rename_user(
        &self,
        user_id: &UserId,
        username: &str,
    ) -> Result<Renamed<InternalUser>, Report> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(user_id) {
            return Ok(Renamed::NotFound);
        }
        if tables
            .users
            .values()
            .any(|user| user.username == username && &user.id != user_id)
        {
            return Ok(Renamed::Taken);
        }
        Ok(match tables.users.get_mut(user_id) {
            Some(user) => {
                user.username = username.to_owned();
                Renamed::Done(user.clone())
            }
            None => Renamed::NotFound,
        })
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<Option<InternalUser>, Report> {
        let mut tables = self.tables.lock().await;
        let user = match tables.users.remove(user_id) {
            Some(user) => user,
            None => return Ok(None),
        };
        for direction in [VoteDirection::Up, VoteDirection::Down] {
            let withdrawn: Vec<VoteKey> = tables
                .votes(direction)
                .keys()
                .filter(|(_, voter)| voter == user_id)
                .cloned()
                .collect();
            for key in withdrawn {
                tables.votes_mut(direction).remove(&key);
                if let Some(idea) = tables.ideas.get_mut(&key.0) {
                    match direction {
                        VoteDirection::Up => idea.upvotes -= 1,
                        VoteDirection::Down => idea.downvotes -= 1,
                    }
                }
            }
        }
        let authored: HashSet<IdeaId> = tables
            .ideas
            .values()
            .filter(|idea| &idea.author_id == user_id)
            .map(|idea| idea.id.clone())
            .collect();
        tables.ideas.retain(|id, _| !authored.contains(id));
        tables.upvotes.retain(|(id, _), _| !authored.contains(id));
        tables.downvotes.retain(|(id, _), _| !authored.contains(id));
        debug!(
            user_id = user_id.as_string().as_str(),
            "Deleted user with {} idea(s)",
            authored.len()
        );
        Ok(Some(user))
    }

    async fn all_tags(&self) -> Result<Vec<InternalTag>, Report> {
        let mut tags: Vec<InternalTag> = self.tables.lock().await.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn create_tag(&self, name: &str) -> Result<Option<InternalTag>, Report> {
        let mut tables = self.tables.lock().await;
        if tables.tags.values().any(|tag| tag.name == name) {
            return Ok(None);
        }
        let tag = InternalTag {
            id: TagId::new(),
            name: name.to_owned(),
        };
        tables.tags.insert(tag.id.clone(), tag.clone());
        Ok(Some(tag))
    }

    async fn rename_tag(&self, tag_id: &TagId, name: &str) -> Result<Renamed<InternalTag>, Report> {
        let mut tables = self.tables.lock().await;
        if !tables.tags.contains_key(tag_id) {
            return Ok(Renamed::NotFound);
        }
        if tables
            .tags
            .values()
            .any(|tag| tag.name == name && &tag.id != tag_id)
        {
            return Ok(Renamed::Taken);
        }
        Ok(match tables.tags.get_mut(tag_id) {
            Some(tag) => {
                tag.name = name.to_owned();
                Renamed::Done(tag.clone())
            }
            None => Renamed::NotFound,
        })
    }

    async fn delete_tag(&self, tag_id: &TagId) -> Result<Option<InternalTag>, Report> {
        let mut tables = self.tables.lock().await;
        let tag = tables.tags.remove(tag_id);
        if tag.is_some() {
            for idea in tables.ideas.values_mut() {
                idea.tags.retain(|id| id != tag_id);
            }
        }
        Ok(tag)
    }

    async fn all_targets(&self) -> Result<Vec<InternalTarget>, Report> {
        let mut targets: Vec<InternalTarget> =
            self.tables.lock().await.targets.values().cloned().collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(targets)
    }

    async fn create_target(&self, name: &str) -> Result<InternalTarget, Report> {
        let target = InternalTarget {
            id: TargetId::new(),
            name: name.to_owned(),
        };
        self.tables
            .lock()
            .await
            .targets
            .insert(target.id.clone(), target.clone());
        Ok(target)
    }

    async fn rename_target(
        &self,
        target_id: &TargetId,
        name: &str,
    ) -> Result<Option<InternalTarget>, Report> {
        let mut tables = self.tables.lock().await;
        Ok(tables.targets.get_mut(target_id).map(|target| {
            target.name = name.to_owned();
            target.clone()
        }))
    }

    async fn delete_target(&self, target_id: &TargetId) -> Result<Option<InternalTarget>, Report> {
        let mut tables = self.tables.lock().await;
        let target = tables.targets.remove(target_id);
        if target.is_some() {
            for idea in tables.ideas.values_mut() {
                idea.targets.retain(|id| id != target_id);
            }
        }
        Ok(target)
    }

    async fn idea_count(&self) -> Result<i64, Report> {
        Ok(self.tables.lock().await.ideas.len() as i64)
    }

    async fn all_ideas(&self, page: Option<Pagination>) -> Result<Vec<InternalIdea>, Report> {
        let tables = self.tables.lock().await;
        let mut ideas: Vec<&InternalIdea> = tables.ideas.values().collect();
        ideas.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        let ideas = ideas.into_iter().cloned();
        Ok(match page {
            Some(page) => ideas
                .skip(page.offset() as usize)
                .take(page.limit as usize)
                .collect(),
            None => ideas.collect(),
        })
    }

    async fn idea_by_id(&self, idea_id: &IdeaId) -> Result<Option<InternalIdea>, Report> {
        Ok(self.tables.lock().await.ideas.get(idea_id).cloned())
    }

    async fn create_idea(&self, idea: NewIdea) -> Result<InternalIdea, Report> {
        let mut tables = self.tables.lock().await;
        tables.check_references(&idea.author_id, &idea.tags, &idea.targets)?;
        let now = Utc::now();
        let created = InternalIdea {
            id: IdeaId::new(),
            title: idea.title,
            description: idea.description,
            author_id: idea.author_id,
            tags: unique_ids(&idea.tags),
            targets: unique_ids(&idea.targets),
            upvotes: 0,
            downvotes: 0,
            created_at: now,
            updated_at: now,
        };
        tables.ideas.insert(created.id.clone(), created.clone());
        debug!(idea_id = created.id.as_string().as_str(), "Idea created");
        Ok(created)
    }

    async fn update_idea(
        &self,
        idea_id: &IdeaId,
        update: IdeaUpdate,
    ) -> Result<Option<InternalIdea>, Report> {
        let mut tables = self.tables.lock().await;
        let author_id = match tables.ideas.get(idea_id) {
            Some(idea) => idea.author_id.clone(),
            None => return Ok(None),
        };
        tables.check_references(
            &author_id,
            update.tags.as_deref().unwrap_or(&[]),
            update.targets.as_deref().unwrap_or(&[]),
        )?;
        let update = IdeaUpdate {
            tags: update.tags.as_deref().map(unique_ids),
            targets: update.targets.as_deref().map(unique_ids),
            ..update
        };
        Ok(tables.ideas.get_mut(idea_id).map(|idea| {
            update.apply(idea);
            idea.updated_at = Utc::now();
            idea.clone()
        }))
    }

    async fn delete_idea(&self, idea_id: &IdeaId) -> Result<Option<InternalIdea>, Report> {
        let mut tables = self.tables.lock().await;
        let idea = tables.ideas.remove(idea_id);
        if idea.is_some() {
            tables.upvotes.retain(|(id, _), _| id != idea_id);
            tables.downvotes.retain(|(id, _), _| id != idea_id);
        }
        Ok(idea)
    }

    async fn votes_for_idea(
        &self,
        idea_id: &IdeaId,
        direction: VoteDirection,
    ) -> Result<Vec<InternalVote>, Report> {
        let tables = self.tables.lock().await;
        Ok(tables.sorted_votes(direction, |vote| &vote.idea_id == idea_id))
    }

    async fn votes_by_user(
        &self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<Vec<InternalVote>, Report> {
        let tables = self.tables.lock().await;
        Ok(tables.sorted_votes(direction, |vote| &vote.user_id == user_id))
    }

    async fn voted_idea_ids(
        &self,
        user_id: &UserId,
        direction: VoteDirection,
        among: &[IdeaId],
    ) -> Result<HashSet<IdeaId>, Report> {
        let tables = self.tables.lock().await;
        let votes = tables.votes(direction);
        Ok(among
            .iter()
            .filter(|idea_id| votes.contains_key(&((*idea_id).clone(), user_id.clone())))
            .cloned()
            .collect())
    }

    async fn begin_vote(
        &self,
        idea_id: &IdeaId,
    ) -> Result<Option<Box<dyn VoteTransaction>>, Report> {
        let tables = self.tables.clone().lock_owned().await;
        Ok(MemoryVoteTransaction::begin(tables, idea_id.clone())
            .map(|tx| Box::new(tx) as Box<dyn VoteTransaction>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::vote::{VoteId, VoteTally};
    use crate::services::vote::{VoteCoordinator, VoteError};

    async fn idea_with_voter(store: &MemoryStore) -> (IdeaId, UserId) {
        let user = store.create_user("alice").await.unwrap().unwrap();
        let idea = store
            .create_idea(NewIdea {
                title: "Covered bike parking".to_owned(),
                description: String::new(),
                author_id: user.id.clone(),
                tags: vec![],
                targets: vec![],
            })
            .await
            .unwrap();
        (idea.id, user.id)
    }

    #[actix_rt::test]
    async fn test_switch_without_counted_upvote_changes_nothing() {
        let store = MemoryStore::new();
        let (idea_id, user_id) = idea_with_voter(&store).await;
        // Upvote record whose counter was never incremented
        store.tables.lock().await.upvotes.insert(
            (idea_id.clone(), user_id.clone()),
            InternalVote {
                id: VoteId::new(),
                idea_id: idea_id.clone(),
                user_id: user_id.clone(),
                created_at: Utc::now(),
            },
        );

        let err = VoteCoordinator::new(Arc::new(store.clone()))
            .cast_vote(idea_id.clone(), user_id.clone(), VoteDirection::Down)
            .await
            .unwrap_err();
        assert!(matches!(err, VoteError::ConsistencyViolation(_)));

        let upvotes = store.votes_for_idea(&idea_id, VoteDirection::Up).await.unwrap();
        assert_eq!(upvotes.len(), 1);
        assert_eq!(upvotes[0].user_id, user_id);
        assert!(store
            .votes_for_idea(&idea_id, VoteDirection::Down)
            .await
            .unwrap()
            .is_empty());
        let tally = store.idea_by_id(&idea_id).await.unwrap().unwrap().tally();
        assert_eq!(
            tally,
            VoteTally {
                upvotes: 0,
                downvotes: 0
            }
        );
    }
}
