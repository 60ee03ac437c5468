use super::{
    idea::{unique_ids, IdeaId, IdeaUpdate, InternalIdea, NewIdea, Pagination},
    tag::{InternalTag, TagId},
    target::{InternalTarget, TargetId},
    user::{InternalUser, UserId},
    vote::{InternalVote, VoteDirection, VoteRecords, VoteTally, VoteTransaction},
    Renamed, Store,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use sqlx::{types::Uuid, PgExecutor, PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::{debug, instrument};

const IDEA_COLUMNS: &str = r#"
    i.id, i.title, i.description, i.author_id, i.upvotes, i.downvotes, i.created_at, i.updated_at,
    COALESCE(
        (SELECT array_agg(it.tag_id ORDER BY it.position) FROM idea_tags it WHERE it.idea_id = i.id),
        '{}'
    ) AS tags,
    COALESCE(
        (SELECT array_agg(it.target_id ORDER BY it.position) FROM idea_targets it WHERE it.idea_id = i.id),
        '{}'
    ) AS targets
"#;

const VOTE_COLUMNS: &str = "id, idea_id, user_id, created_at";

#[derive(sqlx::FromRow)]
struct IdeaRow {
    id: Uuid,
    title: String,
    description: String,
    author_id: Uuid,
    upvotes: i64,
    downvotes: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    tags: Vec<Uuid>,
    targets: Vec<Uuid>,
}

impl From<IdeaRow> for InternalIdea {
    fn from(row: IdeaRow) -> Self {
        Self {
            id: IdeaId(row.id),
            title: row.title,
            description: row.description,
            author_id: UserId(row.author_id),
            tags: row.tags.into_iter().map(TagId).collect(),
            targets: row.targets.into_iter().map(TargetId).collect(),
            upvotes: row.upvotes,
            downvotes: row.downvotes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

async fn fetch_idea<'e, E: PgExecutor<'e>>(
    executor: E,
    idea_id: Uuid,
) -> Result<Option<InternalIdea>, sqlx::Error> {
    let row = sqlx::query_as::<_, IdeaRow>(&format!(
        "SELECT {} FROM ideas i WHERE i.id = $1",
        IDEA_COLUMNS
    ))
    .bind(idea_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(InternalIdea::from))
}

async fn replace_tags(
    tx: &mut Transaction<'static, Postgres>,
    idea_id: Uuid,
    tags: &[TagId],
) -> Result<(), sqlx::Error> {
    let tags: Vec<Uuid> = unique_ids(tags).into_iter().map(|tag| tag.0).collect();
    sqlx::query("DELETE FROM idea_tags WHERE idea_id = $1")
        .bind(idea_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        r#"
        INSERT INTO idea_tags (idea_id, tag_id, position)
        SELECT $1, tag_id, ord::int FROM UNNEST($2::uuid[]) WITH ORDINALITY AS t(tag_id, ord)
        "#,
    )
    .bind(idea_id)
    .bind(tags)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn replace_targets(
    tx: &mut Transaction<'static, Postgres>,
    idea_id: Uuid,
    targets: &[TargetId],
) -> Result<(), sqlx::Error> {
    let targets: Vec<Uuid> = unique_ids(targets).into_iter().map(|target| target.0).collect();
    sqlx::query("DELETE FROM idea_targets WHERE idea_id = $1")
        .bind(idea_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        r#"
        INSERT INTO idea_targets (idea_id, target_id, position)
        SELECT $1, target_id, ord::int FROM UNNEST($2::uuid[]) WITH ORDINALITY AS t(target_id, ord)
        "#,
    )
    .bind(idea_id)
    .bind(targets)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// A unique-constraint failure means the new name is taken.
fn renamed<T>(result: Result<Option<T>, sqlx::Error>) -> Result<Renamed<T>, Report> {
    match result {
        Ok(Some(row)) => Ok(Renamed::Done(row)),
        Ok(None) => Ok(Renamed::NotFound),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Ok(Renamed::Taken),
        Err(err) => Err(err.into()),
    }
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn user_by_id(&self, user_id: &UserId) -> Result<Option<InternalUser>, Report> {
        let user = sqlx::query_as::<_, InternalUser>(
            "SELECT id, username, created_at FROM users WHERE id = $1",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn all_users(&self) -> Result<Vec<InternalUser>, Report> {
        let users = sqlx::query_as::<_, InternalUser>(
            "SELECT id, username, created_at FROM users ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create_user(&self, username: &str) -> Result<Option<InternalUser>, Report> {
        let user = sqlx::query_as::<_, InternalUser>(
            r#"
            INSERT INTO users (id, username) VALUES ($1, $2)
            ON CONFLICT (username) DO NOTHING
            RETURNING id, username, created_at
            "#,
        )
        .bind(UserId::new().0)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn rename_user(
        &self,
        user_id: &UserId,
        username: &str,
    ) -> Result<Renamed<InternalUser>, Report> {
        renamed(
            sqlx::query_as::<_, InternalUser>(
                "UPDATE users SET username = $2 WHERE id = $1 RETURNING id, username, created_at",
            )
            .bind(user_id.0)
            .bind(username)
            .fetch_optional(&self.pool)
            .await,
        )
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, user_id: &UserId) -> Result<Option<InternalUser>, Report> {
        let mut tx = self.pool.begin().await?;
        // Blocks votes by this user from being inserted until we commit
        let user = sqlx::query_as::<_, InternalUser>(
            "SELECT id, username, created_at FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(user_id.0)
        .fetch_optional(&mut *tx)
        .await?;
        if user.is_none() {
            return Ok(None);
        }
        for direction in [VoteDirection::Up, VoteDirection::Down] {
            let withdrawn = sqlx::query(&format!(
                r#"
                WITH gone AS (DELETE FROM {table} WHERE user_id = $1 RETURNING idea_id)
                UPDATE ideas SET {table} = {table} - 1 WHERE id IN (SELECT idea_id FROM gone)
                "#,
                table = direction.table()
            ))
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;
            debug!(
                "Withdrew {} {} vote(s)",
                withdrawn.rows_affected(),
                direction
            );
        }
        // Authored ideas and their votes go with the user
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn all_tags(&self) -> Result<Vec<InternalTag>, Report> {
        let tags = sqlx::query_as::<_, InternalTag>("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(tags)
    }

    async fn create_tag(&self, name: &str) -> Result<Option<InternalTag>, Report> {
        let tag = sqlx::query_as::<_, InternalTag>(
            r#"
            INSERT INTO tags (id, name) VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name
            "#,
        )
        .bind(TagId::new().0)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tag)
    }

    async fn rename_tag(&self, tag_id: &TagId, name: &str) -> Result<Renamed<InternalTag>, Report> {
        renamed(
            sqlx::query_as::<_, InternalTag>(
                "UPDATE tags SET name = $2 WHERE id = $1 RETURNING id, name",
            )
            .bind(tag_id.0)
            .bind(name)
            .fetch_optional(&self.pool)
            .await,
        )
    }

    async fn delete_tag(&self, tag_id: &TagId) -> Result<Option<InternalTag>, Report> {
        let tag =
            sqlx::query_as::<_, InternalTag>("DELETE FROM tags WHERE id = $1 RETURNING id, name")
                .bind(tag_id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(tag)
    }

    async fn all_targets(&self) -> Result<Vec<InternalTarget>, Report> {
        let targets =
            sqlx::query_as::<_, InternalTarget>("SELECT id, name FROM targets ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(targets)
    }

    async fn create_target(&self, name: &str) -> Result<InternalTarget, Report> {
        let target = sqlx::query_as::<_, InternalTarget>(
            "INSERT INTO targets (id, name) VALUES ($1, $2) RETURNING id, name",
        )
        .bind(TargetId::new().0)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(target)
    }

    async fn rename_target(
        &self,
        target_id: &TargetId,
        name: &str,
    ) -> Result<Option<InternalTarget>, Report> {
        let target = sqlx::query_as::<_, InternalTarget>(
            "UPDATE targets SET name = $2 WHERE id = $1 RETURNING id, name",
        )
        .bind(target_id.0)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(target)
    }

    async fn delete_target(&self, target_id: &TargetId) -> Result<Option<InternalTarget>, Report> {
        let target = sqlx::query_as::<_, InternalTarget>(
            "DELETE FROM targets WHERE id = $1 RETURNING id, name",
        )
        .bind(target_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(target)
    }

    async fn idea_count(&self) -> Result<i64, Report> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM ideas")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn all_ideas(&self, page: Option<Pagination>) -> Result<Vec<InternalIdea>, Report> {
        let (limit, offset) = match page {
            Some(page) => (Some(i64::from(page.limit)), page.offset() as i64),
            None => (None, 0),
        };
        let rows = sqlx::query_as::<_, IdeaRow>(&format!(
            "SELECT {} FROM ideas i ORDER BY i.created_at DESC, i.id LIMIT $1 OFFSET $2",
            IDEA_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(InternalIdea::from).collect())
    }

    async fn idea_by_id(&self, idea_id: &IdeaId) -> Result<Option<InternalIdea>, Report> {
        Ok(fetch_idea(&self.pool, idea_id.0).await?)
    }

    #[instrument(skip_all)]
    async fn create_idea(&self, idea: NewIdea) -> Result<InternalIdea, Report> {
        let idea_id = IdeaId::new();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO ideas (id, title, description, author_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(idea_id.0)
        .bind(&idea.title)
        .bind(&idea.description)
        .bind(idea.author_id.0)
        .execute(&mut *tx)
        .await?;
        replace_tags(&mut tx, idea_id.0, &idea.tags).await?;
        replace_targets(&mut tx, idea_id.0, &idea.targets).await?;
        let created = fetch_idea(&mut *tx, idea_id.0)
            .await?
            .ok_or_else(|| Report::msg("idea disappeared while being created"))?;
        tx.commit().await?;
        debug!(idea_id = idea_id.as_string().as_str(), "Idea created");
        Ok(created)
    }

    async fn update_idea(
        &self,
        idea_id: &IdeaId,
        update: IdeaUpdate,
    ) -> Result<Option<InternalIdea>, Report> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE ideas
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(idea_id.0)
        .bind(update.title)
        .bind(update.description)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        if let Some(tags) = update.tags {
            replace_tags(&mut tx, idea_id.0, &tags).await?;
        }
        if let Some(targets) = update.targets {
            replace_targets(&mut tx, idea_id.0, &targets).await?;
        }
        let idea = fetch_idea(&mut *tx, idea_id.0).await?;
        tx.commit().await?;
        Ok(idea)
    }

    async fn delete_idea(&self, idea_id: &IdeaId) -> Result<Option<InternalIdea>, Report> {
        let mut tx = self.pool.begin().await?;
        let idea = fetch_idea(&mut *tx, idea_id.0).await?;
        if idea.is_some() {
            sqlx::query("DELETE FROM ideas WHERE id = $1")
                .bind(idea_id.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(idea)
    }

    async fn votes_for_idea(
        &self,
        idea_id: &IdeaId,
        direction: VoteDirection,
    ) -> Result<Vec<InternalVote>, Report> {
        let votes = sqlx::query_as::<_, InternalVote>(&format!(
            "SELECT {} FROM {} WHERE idea_id = $1 ORDER BY created_at",
            VOTE_COLUMNS,
            direction.table()
        ))
        .bind(idea_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(votes)
    }

    async fn votes_by_user(
        &self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<Vec<InternalVote>, Report> {
        let votes = sqlx::query_as::<_, InternalVote>(&format!(
            "SELECT {} FROM {} WHERE user_id = $1 ORDER BY created_at",
            VOTE_COLUMNS,
            direction.table()
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(votes)
    }

    async fn voted_idea_ids(
        &self,
        user_id: &UserId,
        direction: VoteDirection,
        among: &[IdeaId],
    ) -> Result<HashSet<IdeaId>, Report> {
        let among: Vec<Uuid> = among.iter().map(|idea_id| idea_id.0).collect();
        let ids = sqlx::query_scalar::<_, Uuid>(&format!(
            "SELECT idea_id FROM {} WHERE user_id = $1 AND idea_id = ANY($2)",
            direction.table()
        ))
        .bind(user_id.0)
        .bind(among)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(IdeaId).collect())
    }

    async fn begin_vote(
        &self,
        idea_id: &IdeaId,
    ) -> Result<Option<Box<dyn VoteTransaction>>, Report> {
        let mut tx = self.pool.begin().await?;
        // Row lock serializes vote transactions on the same idea
        let tally = sqlx::query_as::<_, VoteTally>(
            "SELECT upvotes, downvotes FROM ideas WHERE id = $1 FOR UPDATE",
        )
        .bind(idea_id.0)
        .fetch_optional(&mut *tx)
        .await?;
        Ok(tally.map(|tally| {
            Box::new(PgVoteTransaction {
                tx,
                idea_id: idea_id.clone(),
                tally,
            }) as Box<dyn VoteTransaction>
        }))
    }
}

pub struct PgVoteTransaction {
    tx: Transaction<'static, Postgres>,
    idea_id: IdeaId,
    tally: VoteTally,
}

impl PgVoteTransaction {
    async fn vote_record(
        &mut self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<Option<InternalVote>, sqlx::Error> {
        sqlx::query_as::<_, InternalVote>(&format!(
            "SELECT {} FROM {} WHERE idea_id = $1 AND user_id = $2",
            VOTE_COLUMNS,
            direction.table()
        ))
        .bind(self.idea_id.0)
        .bind(user_id.0)
        .fetch_optional(&mut *self.tx)
        .await
    }
}

#[async_trait]
impl VoteTransaction for PgVoteTransaction {
    fn idea_id(&self) -> &IdeaId {
        &self.idea_id
    }

    fn tally(&self) -> VoteTally {
        self.tally
    }

    async fn vote_records(&mut self, user_id: &UserId) -> Result<VoteRecords, Report> {
        Ok(VoteRecords {
            upvote: self.vote_record(user_id, VoteDirection::Up).await?,
            downvote: self.vote_record(user_id, VoteDirection::Down).await?,
        })
    }

    async fn insert_vote(
        &mut self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<InternalVote, Report> {
        let vote = sqlx::query_as::<_, InternalVote>(&format!(
            "INSERT INTO {} (id, idea_id, user_id) VALUES ($1, $2, $3) RETURNING {}",
            direction.table(),
            VOTE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(self.idea_id.0)
        .bind(user_id.0)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(vote)
    }

    async fn delete_vote(
        &mut self,
        user_id: &UserId,
        direction: VoteDirection,
    ) -> Result<Option<InternalVote>, Report> {
        let vote = sqlx::query_as::<_, InternalVote>(&format!(
            "DELETE FROM {} WHERE idea_id = $1 AND user_id = $2 RETURNING {}",
            direction.table(),
            VOTE_COLUMNS
        ))
        .bind(self.idea_id.0)
        .bind(user_id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(vote)
    }

    async fn adjust_tally(
        &mut self,
        direction: VoteDirection,
        delta: i64,
    ) -> Result<Option<VoteTally>, Report> {
        // Counter columns are named after their vote tables
        let column = direction.table();
        let tally = sqlx::query_as::<_, VoteTally>(&format!(
            "UPDATE ideas SET {column} = {column} + $2 WHERE id = $1 RETURNING upvotes, downvotes",
            column = column
        ))
        .bind(self.idea_id.0)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;
        if let Some(tally) = tally {
            self.tally = tally;
        }
        Ok(tally)
    }

    async fn commit(self: Box<Self>) -> Result<(), Report> {
        self.tx.commit().await?;
        Ok(())
    }
}
