pub mod idea;
pub mod postgres;
pub mod tag;
pub mod target;
pub mod user;
pub mod vote;

use actix::prelude::*;
use async_trait::async_trait;
use color_eyre::eyre::Report;
use idea::{IdeaId, IdeaUpdate, InternalIdea, NewIdea, Pagination};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tag::{InternalTag, TagId};
use target::{InternalTarget, TargetId};
use user::{InternalUser, UserId};
use vote::{InternalVote, VoteDirection, VoteTransaction};

/// Outcome of renaming a row whose name is unique.
#[derive(Debug)]
pub enum Renamed<T> {
    Done(T),
    NotFound,
    Taken,
}

/// Persistence backend. Implemented for PostgreSQL in [`postgres::PgStore`]
/// and in memory in [`crate::managers::MemoryStore`].
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn user_by_id(&self, user_id: &UserId) -> Result<Option<InternalUser>, Report>;

    async fn all_users(&self) -> Result<Vec<InternalUser>, Report>;

    /// `None` when the username is taken.
    async fn create_user(&self, username: &str) -> Result<Option<InternalUser>, Report>;

    async fn rename_user(
        &self,
        user_id: &UserId,
        username: &str,
    ) -> Result<Renamed<InternalUser>, Report>;

    /// Removes the user with their ideas and votes. Counters of the ideas they
    /// voted on are decremented.
    async fn delete_user(&self, user_id: &UserId) -> Result<Option<InternalUser>, Report>;

    async fn all_tags(&self) -> Result<Vec<InternalTag>, Report>;

    /// `None` when a tag with this name exists.
    async fn create_tag(&self, name: &str) -> Result<Option<InternalTag>, Report>;

    async fn rename_tag(&self, tag_id: &TagId, name: &str) -> Result<Renamed<InternalTag>, Report>;

    async fn delete_tag(&self, tag_id: &TagId) -> Result<Option<InternalTag>, Report>;

    async fn all_targets(&self) -> Result<Vec<InternalTarget>, Report>;

    async fn create_target(&self, name: &str) -> Result<InternalTarget, Report>;

    async fn rename_target(
        &self,
        target_id: &TargetId,
        name: &str,
    ) -> Result<Option<InternalTarget>, Report>;

    async fn delete_target(&self, target_id: &TargetId) -> Result<Option<InternalTarget>, Report>;

    async fn idea_count(&self) -> Result<i64, Report>;

    async fn all_ideas(&self, page: Option<Pagination>) -> Result<Vec<InternalIdea>, Report>;

    async fn idea_by_id(&self, idea_id: &IdeaId) -> Result<Option<InternalIdea>, Report>;

    async fn create_idea(&self, idea: NewIdea) -> Result<InternalIdea, Report>;

    async fn update_idea(
        &self,
        idea_id: &IdeaId,
        update: IdeaUpdate,
    ) -> Result<Option<InternalIdea>, Report>;

    async fn delete_idea(&self, idea_id: &IdeaId) -> Result<Option<InternalIdea>, Report>;

    async fn votes_for_idea(
        &self,
        idea_id: &IdeaId,
        direction: VoteDirection,
    ) -> Result<Vec<InternalVote>, Report>;

    async fn votes_by_user(
        &self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<Vec<InternalVote>, Report>;

    async fn voted_idea_ids(
        &self,
        user_id: &UserId,
        direction: VoteDirection,
        among: &[IdeaId],
    ) -> Result<HashSet<IdeaId>, Report>;

    /// Opens a transaction holding a lock on the idea. `None` if the idea does
    /// not exist.
    async fn begin_vote(
        &self,
        idea_id: &IdeaId,
    ) -> Result<Option<Box<dyn VoteTransaction>>, Report>;
}

pub struct DbExecutor(pub Arc<dyn Store>);

impl DbExecutor {
    pub fn store(&mut self) -> Arc<dyn Store> {
        self.0.clone()
    }
}

impl fmt::Debug for DbExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbExecutor").finish()
    }
}

impl Actor for DbExecutor {
    type Context = Context<Self>;
}

impl Default for DbExecutor {
    fn default() -> Self {
        unimplemented!("DbExecutor cannot automatically be started");
    }
}

impl SystemService for DbExecutor {}
impl Supervised for DbExecutor {}

pub async fn new_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    new_pool_with(database_url.parse()?, max_connections).await
}

pub async fn new_pool_with(
    connect_options: PgConnectOptions,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connect_options)
        .await
}

pub async fn migrate(pool: &PgPool) -> Result<(), Report> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
