//! Change-aware persistence.
//!
//! The loader owns the diff policy: insert unseen external references,
//! update only when an incoming non-null value actually differs from what is
//! stored, and never let a null incoming value erase a stored fact. The
//! store trait underneath it is the seam the integration tests replace with
//! an in-memory fake.

use crate::error::IngestError;
use crate::model::{CanonicalPlayer, CanonicalTeam, ExternalRef, UpsertOutcome};
use crate::profile::SportId;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Persisted team row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TeamRow {
    pub id: Uuid,
    pub sport: String,
    pub external_id: i64,
    pub league: String,
    pub name: String,
    pub code: String,
    pub city: Option<String>,
    pub founded: Option<i32>,
    pub logo: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

/// Persisted player row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PlayerRow {
    pub id: Uuid,
    pub sport: String,
    pub external_id: i64,
    pub name: String,
    pub team_id: Option<Uuid>,
    pub position: Option<String>,
    pub jersey: Option<i32>,
    pub height: Option<String>,
    pub weight: Option<String>,
    pub age: Option<i32>,
    pub college: Option<String>,
    pub experience: Option<i32>,
    pub photo: Option<String>,
    pub group_label: Option<String>,
}

#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn find_team(&self, external: &ExternalRef) -> Result<Option<TeamRow>, IngestError>;
    /// Insert a team row. Returns the id actually persisted, which is the
    /// winner's id when a concurrent process inserted the same external
    /// reference first.
    async fn insert_team(&self, row: &TeamRow) -> Result<Uuid, IngestError>;
    async fn update_team(&self, row: &TeamRow) -> Result<(), IngestError>;
    async fn upsert_team_attrs(
        &self,
        team_id: Uuid,
        attrs: &BTreeMap<String, String>,
    ) -> Result<(), IngestError>;
    /// Codes already assigned in a league; seeds the run's code registry.
    async fn league_codes(&self, sport: SportId, league: &str) -> Result<Vec<String>, IngestError>;
    /// External ids of teams that already have any persisted player row.
    /// Incremental mode skips these.
    async fn synced_team_ids(&self, sport: SportId) -> Result<HashSet<i64>, IngestError>;

    async fn find_player(&self, external: &ExternalRef) -> Result<Option<PlayerRow>, IngestError>;
    /// Insert a player row; same persisted-id contract as `insert_team`.
    async fn insert_player(&self, row: &PlayerRow) -> Result<Uuid, IngestError>;
    async fn update_player(&self, row: &PlayerRow) -> Result<(), IngestError>;
}

// ---------------------------------------------------------------------------
// Diff policy (pure)
// ---------------------------------------------------------------------------

/// Apply an incoming optional field: a differing `Some` wins, a `None` never
/// erases. Returns whether the stored value changed.
fn merge_opt<T: PartialEq + Clone>(stored: &mut Option<T>, incoming: Option<&T>) -> bool {
    match incoming {
        Some(value) if stored.as_ref() != Some(value) => {
            *stored = Some(value.clone());
            true
        }
        _ => false,
    }
}

/// Merge an incoming canonical team into a stored row. `None` means nothing
/// differed and no write is needed. The short code and league are stable
/// once assigned and never rewritten from the feed.
pub fn merge_team(stored: &TeamRow, incoming: &CanonicalTeam) -> Option<TeamRow> {
    let mut next = stored.clone();
    let mut changed = false;

    if !incoming.name.is_empty() && next.name != incoming.name {
        next.name = incoming.name.clone();
        changed = true;
    }
    changed |= merge_opt(&mut next.city, incoming.city.as_ref());
    changed |= merge_opt(&mut next.founded, incoming.founded.as_ref());
    changed |= merge_opt(&mut next.logo, incoming.logo.as_ref());
    changed |= merge_opt(&mut next.country, incoming.country.as_ref());
    changed |= merge_opt(&mut next.country_code, incoming.country_code.as_ref());

    changed.then_some(next)
}

/// Merge an incoming canonical player into a stored row.
pub fn merge_player(stored: &PlayerRow, incoming: &CanonicalPlayer) -> Option<PlayerRow> {
    let mut next = stored.clone();
    let mut changed = false;

    if !incoming.name.is_empty() && next.name != incoming.name {
        next.name = incoming.name.clone();
        changed = true;
    }
    changed |= merge_opt(&mut next.team_id, incoming.team_id.as_ref());
    changed |= merge_opt(&mut next.position, incoming.position.as_ref());
    changed |= merge_opt(&mut next.jersey, incoming.jersey.as_ref());
    changed |= merge_opt(&mut next.height, incoming.height.as_ref());
    changed |= merge_opt(&mut next.weight, incoming.weight.as_ref());
    changed |= merge_opt(&mut next.age, incoming.age.as_ref());
    changed |= merge_opt(&mut next.college, incoming.college.as_ref());
    changed |= merge_opt(&mut next.experience, incoming.experience.as_ref());
    changed |= merge_opt(&mut next.photo, incoming.photo.as_ref());
    changed |= merge_opt(&mut next.group_label, incoming.group_label.as_ref());

    changed.then_some(next)
}

fn team_row(team: &CanonicalTeam, id: Uuid, code: &str) -> TeamRow {
    TeamRow {
        id,
        sport: team.external.sport.tag().to_string(),
        external_id: team.external.id,
        league: team.league.clone(),
        name: team.name.clone(),
        code: code.to_string(),
        city: team.city.clone(),
        founded: team.founded,
        logo: team.logo.clone(),
        country: team.country.clone(),
        country_code: team.country_code.clone(),
    }
}

fn player_row(player: &CanonicalPlayer, id: Uuid) -> PlayerRow {
    PlayerRow {
        id,
        sport: player.external.sport.tag().to_string(),
        external_id: player.external.id,
        name: player.name.clone(),
        team_id: player.team_id,
        position: player.position.clone(),
        jersey: player.jersey,
        height: player.height.clone(),
        weight: player.weight.clone(),
        age: player.age,
        college: player.college.clone(),
        experience: player.experience,
        photo: player.photo.clone(),
        group_label: player.group_label.clone(),
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

pub struct Loader<S> {
    store: S,
}

impl<S: RosterStore> Loader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Upsert one canonical team. Returns the outcome and the internal
    /// identifier (minted here on first sighting). `assign_code` is invoked
    /// only for first sightings, so the code registry mints nothing for
    /// teams whose code is already persisted.
    pub async fn upsert_team<F>(
        &self,
        team: &CanonicalTeam,
        assign_code: F,
    ) -> Result<(UpsertOutcome, Uuid), IngestError>
    where
        F: FnOnce() -> String + Send,
    {
        let (outcome, id) = match self.store.find_team(&team.external).await? {
            None => {
                let row = team_row(team, Uuid::new_v4(), &assign_code());
                // A concurrent run can insert the same external reference
                // between the lookup and the insert. The id the store hands
                // back is the persisted one; the minted UUID must not leak
                // into attrs or player rows if the insert lost that race.
                let id = self.store.insert_team(&row).await?;
                let outcome = if id == row.id {
                    UpsertOutcome::Inserted
                } else {
                    UpsertOutcome::Unchanged
                };
                (outcome, id)
            }
            Some(stored) => match merge_team(&stored, team) {
                Some(next) => {
                    self.store.update_team(&next).await?;
                    (UpsertOutcome::Updated, next.id)
                }
                None => (UpsertOutcome::Unchanged, stored.id),
            },
        };

        // Extension attributes only after the core row is in place.
        if !team.extras.is_empty() {
            self.store.upsert_team_attrs(id, &team.extras).await?;
        }

        Ok((outcome, id))
    }

    pub async fn upsert_player(
        &self,
        player: &CanonicalPlayer,
    ) -> Result<UpsertOutcome, IngestError> {
        match self.store.find_player(&player.external).await? {
            None => {
                let row = player_row(player, Uuid::new_v4());
                let id = self.store.insert_player(&row).await?;
                if id == row.id {
                    Ok(UpsertOutcome::Inserted)
                } else {
                    Ok(UpsertOutcome::Unchanged)
                }
            }
            Some(stored) => match merge_player(&stored, player) {
                Some(next) => {
                    self.store.update_player(&next).await?;
                    Ok(UpsertOutcome::Updated)
                }
                None => Ok(UpsertOutcome::Unchanged),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Postgres store
// ---------------------------------------------------------------------------

/// Connect with bounded retry and exponential sleep between attempts.
pub async fn connect_with_retry(url: &str, max_retries: u32) -> Result<PgPool> {
    let mut attempt = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
        {
            Ok(pool) => {
                info!("Connected to PostgreSQL");
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;
                if attempt >= max_retries {
                    return Err(anyhow!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries,
                        e
                    ));
                }
                warn!("Database connection attempt {} failed: {}. Retrying...", attempt, e);
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
        }
    }
}

fn is_connection_loss(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolClosed)
        || err.to_string().contains("connection closed")
}

/// Run a query, and on a dropped connection re-ping the pool and retry the
/// query exactly once. A second loss escalates to `ConnectionLost`, which is
/// run-fatal.
macro_rules! with_reconnect {
    ($self:ident, $op:expr) => {{
        match $op {
            Err(e) if is_connection_loss(&e) => {
                warn!("database connection lost ({}); reconnecting once", e);
                $self
                    .ping()
                    .await
                    .map_err(|e| IngestError::ConnectionLost(e.to_string()))?;
                $op.map_err(|e| {
                    if is_connection_loss(&e) {
                        IngestError::ConnectionLost(e.to_string())
                    } else {
                        IngestError::Database(e)
                    }
                })
            }
            other => other.map_err(IngestError::Database),
        }
    }};
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    async fn find_team_query(&self, external: &ExternalRef) -> Result<Option<TeamRow>, sqlx::Error> {
        sqlx::query_as::<_, TeamRow>(
            r#"
            SELECT id, sport, external_id, league, name, code, city, founded,
                   logo, country, country_code
            FROM teams
            WHERE sport = $1 AND external_id = $2
            "#,
        )
        .bind(external.sport.tag())
        .bind(external.id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn insert_team_query(&self, row: &TeamRow) -> Result<Uuid, sqlx::Error> {
        // If the insert conflicts, the generated UUID does not exist in
        // `teams`; returning it would cause FK violations downstream.
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO teams (id, sport, external_id, league, name, code, city,
                               founded, logo, country, country_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (sport, external_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(row.id)
        .bind(&row.sport)
        .bind(row.external_id)
        .bind(&row.league)
        .bind(&row.name)
        .bind(&row.code)
        .bind(&row.city)
        .bind(row.founded)
        .bind(&row.logo)
        .bind(&row.country)
        .bind(&row.country_code)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some((id,)) => Ok(id),
            None => {
                let (id,): (Uuid,) = sqlx::query_as(
                    "SELECT id FROM teams WHERE sport = $1 AND external_id = $2",
                )
                .bind(&row.sport)
                .bind(row.external_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(id)
            }
        }
    }

    async fn update_team_query(&self, row: &TeamRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE teams
            SET name = $2, city = $3, founded = $4, logo = $5, country = $6,
                country_code = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.city)
        .bind(row.founded)
        .bind(&row.logo)
        .bind(&row.country)
        .bind(&row.country_code)
        .execute(&self.pool)
        .await
        .map(|_| ())
    }

    async fn upsert_attrs_query(
        &self,
        team_id: Uuid,
        attrs: &BTreeMap<String, String>,
    ) -> Result<(), sqlx::Error> {
        for (name, value) in attrs {
            sqlx::query(
                r#"
                INSERT INTO team_attrs (team_id, name, value)
                VALUES ($1, $2, $3)
                ON CONFLICT (team_id, name) DO UPDATE SET value = EXCLUDED.value
                "#,
            )
            .bind(team_id)
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn league_codes_query(
        &self,
        sport: SportId,
        league: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT code FROM teams WHERE sport = $1 AND league = $2")
                .bind(sport.tag())
                .bind(league)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(code,)| code).collect())
    }

    async fn synced_team_ids_query(&self, sport: SportId) -> Result<HashSet<i64>, sqlx::Error> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT t.external_id
            FROM teams t
            JOIN players p ON p.team_id = t.id
            WHERE t.sport = $1
            "#,
        )
        .bind(sport.tag())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn find_player_query(
        &self,
        external: &ExternalRef,
    ) -> Result<Option<PlayerRow>, sqlx::Error> {
        sqlx::query_as::<_, PlayerRow>(
            r#"
            SELECT id, sport, external_id, name, team_id, position, jersey,
                   height, weight, age, college, experience, photo, group_label
            FROM players
            WHERE sport = $1 AND external_id = $2
            "#,
        )
        .bind(external.sport.tag())
        .bind(external.id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn insert_player_query(&self, row: &PlayerRow) -> Result<Uuid, sqlx::Error> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO players (id, sport, external_id, name, team_id, position,
                                 jersey, height, weight, age, college, experience,
                                 photo, group_label)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (sport, external_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(row.id)
        .bind(&row.sport)
        .bind(row.external_id)
        .bind(&row.name)
        .bind(row.team_id)
        .bind(&row.position)
        .bind(row.jersey)
        .bind(&row.height)
        .bind(&row.weight)
        .bind(row.age)
        .bind(&row.college)
        .bind(row.experience)
        .bind(&row.photo)
        .bind(&row.group_label)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some((id,)) => Ok(id),
            None => {
                let (id,): (Uuid,) = sqlx::query_as(
                    "SELECT id FROM players WHERE sport = $1 AND external_id = $2",
                )
                .bind(&row.sport)
                .bind(row.external_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(id)
            }
        }
    }

    async fn update_player_query(&self, row: &PlayerRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE players
            SET name = $2, team_id = $3, position = $4, jersey = $5, height = $6,
                weight = $7, age = $8, college = $9, experience = $10, photo = $11,
                group_label = $12, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(row.team_id)
        .bind(&row.position)
        .bind(row.jersey)
        .bind(&row.height)
        .bind(&row.weight)
        .bind(row.age)
        .bind(&row.college)
        .bind(row.experience)
        .bind(&row.photo)
        .bind(&row.group_label)
        .execute(&self.pool)
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl RosterStore for PgStore {
    async fn find_team(&self, external: &ExternalRef) -> Result<Option<TeamRow>, IngestError> {
        with_reconnect!(self, self.find_team_query(external).await)
    }

    async fn insert_team(&self, row: &TeamRow) -> Result<Uuid, IngestError> {
        with_reconnect!(self, self.insert_team_query(row).await)
    }

    async fn update_team(&self, row: &TeamRow) -> Result<(), IngestError> {
        with_reconnect!(self, self.update_team_query(row).await)
    }

    async fn upsert_team_attrs(
        &self,
        team_id: Uuid,
        attrs: &BTreeMap<String, String>,
    ) -> Result<(), IngestError> {
        with_reconnect!(self, self.upsert_attrs_query(team_id, attrs).await)
    }

    async fn league_codes(&self, sport: SportId, league: &str) -> Result<Vec<String>, IngestError> {
        with_reconnect!(self, self.league_codes_query(sport, league).await)
    }

    async fn synced_team_ids(&self, sport: SportId) -> Result<HashSet<i64>, IngestError> {
        with_reconnect!(self, self.synced_team_ids_query(sport).await)
    }

    async fn find_player(&self, external: &ExternalRef) -> Result<Option<PlayerRow>, IngestError> {
        with_reconnect!(self, self.find_player_query(external).await)
    }

    async fn insert_player(&self, row: &PlayerRow) -> Result<Uuid, IngestError> {
        with_reconnect!(self, self.insert_player_query(row).await)
    }

    async fn update_player(&self, row: &PlayerRow) -> Result<(), IngestError> {
        with_reconnect!(self, self.update_player_query(row).await)
    }
}
