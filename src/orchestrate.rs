//! Run orchestration: fetch plan selection, per-team sequencing, failure
//! containment, and the run summary.
//!
//! A run is strictly sequential: one outstanding request at a time (the
//! fetch client throttles), one team at a time, so code assignment order is
//! stable within a league. Per-team and per-record failures are folded into
//! the summary; only configuration errors, an empty team list, and
//! unrecovered connection loss abort the run.

use crate::error::IngestError;
use crate::fetch::{response_items, PayloadFetcher};
use crate::model::{CanonicalTeam, RunSummary};
use crate::normalize::{normalizer_for, NormalizeOutcome};
use crate::profile::{self, SportId, SportProfile};
use crate::resolve::CodeRegistry;
use crate::store::{Loader, RosterStore};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Fetch plan for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// All teams for a sport, rosters included where the sport has them.
    FullSync { sport: SportId },
    /// One team and its roster.
    Team { sport: SportId, team: i64 },
    /// One specific player.
    Player { sport: SportId, player: i64 },
}

impl Mode {
    pub fn sport(&self) -> SportId {
        match *self {
            Mode::FullSync { sport } | Mode::Team { sport, .. } | Mode::Player { sport, .. } => {
                sport
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: Mode,
    /// Full refresh re-processes every team; incremental skips teams whose
    /// roster already has persisted players.
    pub refresh: bool,
    pub season: Option<String>,
}

/// Run lifecycle. League metadata and the team list resolve during the
/// connected phase, so `Failed` is reachable only from `Connected`: a run
/// that cannot proceed at all fails there, and once the per-team
/// fetch/normalize/persist cycle has started, failures are contained, not
/// fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Connected,
    Fetching,
    Normalizing,
    Persisting,
    Summarizing,
    Done,
    Failed,
}

impl RunState {
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Connected)
                | (Connected, Fetching)
                | (Connected, Failed)
                | (Connected, Summarizing)
                | (Fetching, Normalizing)
                | (Normalizing, Persisting)
                | (Persisting, Fetching)
                | (Persisting, Summarizing)
                | (Summarizing, Done)
        )
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(self.can_advance_to(next), "invalid transition {self:?} -> {next:?}");
        debug!("run state {:?} -> {:?}", self, next);
        *self = next;
    }
}

pub struct Orchestrator<F, S> {
    fetcher: F,
    loader: Loader<S>,
    shutdown: Arc<AtomicBool>,
}

impl<F: PayloadFetcher, S: RosterStore> Orchestrator<F, S> {
    pub fn new(fetcher: F, store: S, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            fetcher,
            loader: Loader::new(store),
            shutdown,
        }
    }

    pub async fn run(&self, opts: &RunOptions) -> Result<RunSummary, IngestError> {
        let started = Instant::now();
        let mut state = RunState::Idle;
        let mut summary = RunSummary::default();

        let sport = opts.mode.sport();
        state.advance(RunState::Connected);

        let result = match opts.mode {
            Mode::Player { player, .. } => {
                self.run_single_player(sport, player, opts, &mut state, &mut summary).await
            }
            _ => self.run_teams(sport, opts, &mut state, &mut summary).await,
        };

        if let Err(e) = result {
            if state == RunState::Connected {
                state.advance(RunState::Failed);
            }
            error!("run aborted: {e}");
            return Err(e);
        }

        state.advance(RunState::Summarizing);
        summary.requests = self.fetcher.requests_made();
        summary.elapsed = started.elapsed();
        state.advance(RunState::Done);
        info!("run complete: {summary}");
        Ok(summary)
    }

    async fn run_teams(
        &self,
        sport: SportId,
        opts: &RunOptions,
        state: &mut RunState,
        summary: &mut RunSummary,
    ) -> Result<(), IngestError> {
        let profile = profile::resolve(sport);
        let normalizer = normalizer_for(sport);

        // League metadata and the persisted code set; a database failure
        // here means the run cannot proceed at all.
        let seeded = self
            .loader
            .store()
            .league_codes(sport, profile.default_league)
            .await?;
        let mut registry = CodeRegistry::seeded(seeded);
        debug!("seeded code registry with {} codes", registry.len());

        let teams = self.fetch_team_list(profile, opts).await?;
        let mut candidates = Vec::new();
        for raw in &teams {
            match normalizer.team(sport, profile.default_league, raw) {
                NormalizeOutcome::Record(team) => candidates.push(team),
                NormalizeOutcome::Filtered => summary.filtered += 1,
                NormalizeOutcome::Skipped(reason) => {
                    warn!("skipping team entry: {reason}");
                    summary.skipped += 1;
                }
            }
        }
        if candidates.is_empty() {
            return Err(IngestError::NoProcessableTeams(sport));
        }

        // Incremental mode: only teams with no persisted roster yet. An
        // explicitly requested team is always processed.
        let single_team = matches!(opts.mode, Mode::Team { .. });
        if !opts.refresh && !single_team && profile.players_endpoint.is_some() {
            let synced = self.loader.store().synced_team_ids(sport).await?;
            let before = candidates.len();
            candidates.retain(|t| !synced.contains(&t.external.id));
            if before != candidates.len() {
                info!(
                    "incremental mode: skipping {} already-synced team(s)",
                    before - candidates.len()
                );
            }
        }

        info!("processing {} team(s) for {}", candidates.len(), sport);

        for team in &candidates {
            // Abort is honored only between team iterations.
            if self.shutdown.load(Ordering::Relaxed) {
                warn!("shutdown requested; stopping before next team");
                break;
            }
            summary.teams_seen += 1;

            state.advance(RunState::Fetching);
            let roster = match profile.players_endpoint {
                Some(endpoint) => match self.fetch_roster(profile, team, endpoint, opts).await {
                    Ok(items) => items,
                    Err(e) => {
                        // One team's roster fetch failing never aborts the
                        // run; the team row itself still persists below.
                        error!(
                            "roster fetch failed for {} ({}): {e}",
                            team.name, team.external
                        );
                        summary.failed += 1;
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };

            state.advance(RunState::Normalizing);
            let mut players = Vec::new();
            for raw in &roster {
                summary.players_seen += 1;
                match normalizer.player(sport, raw) {
                    NormalizeOutcome::Record(player) => players.push(player),
                    NormalizeOutcome::Filtered => summary.filtered += 1,
                    NormalizeOutcome::Skipped(reason) => {
                        warn!("skipping player entry for {}: {reason}", team.name);
                        summary.skipped += 1;
                    }
                }
            }

            state.advance(RunState::Persisting);
            let team_id = match self
                .loader
                .upsert_team(team, || registry.assign(team.code.as_deref(), &team.name))
                .await
            {
                Ok((outcome, id)) => {
                    summary.record(outcome);
                    Some(id)
                }
                Err(e) if e.is_run_fatal() => return Err(e),
                Err(e) => {
                    error!("failed to persist team {} ({}): {e}", team.name, team.external);
                    summary.failed += 1;
                    None
                }
            };

            let Some(team_id) = team_id else { continue };
            for mut player in players {
                player.team_id = Some(team_id);
                match self.loader.upsert_player(&player).await {
                    Ok(outcome) => summary.record(outcome),
                    Err(e) if e.is_run_fatal() => return Err(e),
                    Err(e) => {
                        error!(
                            "failed to persist player {} ({}): {e}",
                            player.name, player.external
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        Ok(())
    }

    async fn fetch_roster(
        &self,
        profile: &SportProfile,
        team: &CanonicalTeam,
        endpoint: &str,
        opts: &RunOptions,
    ) -> Result<Vec<Value>, IngestError> {
        let url = format!("{}/{}", profile.base_url, endpoint);
        let mut params = vec![("team".to_string(), team.external.id.to_string())];
        if profile.supports_season {
            params.push(("season".to_string(), self.season_param(profile, opts)));
        }
        let payload = self.fetch_with_retry(&url, &params).await?;
        Ok(response_items(&payload))
    }

    async fn run_single_player(
        &self,
        sport: SportId,
        player: i64,
        opts: &RunOptions,
        state: &mut RunState,
        summary: &mut RunSummary,
    ) -> Result<(), IngestError> {
        // Checked before any network call.
        let profile = profile::resolve_for_players(sport)?;
        let endpoint = profile
            .players_endpoint
            .unwrap_or_else(|| unreachable!("resolve_for_players guarantees an endpoint"));
        let normalizer = normalizer_for(sport);

        state.advance(RunState::Fetching);
        let url = format!("{}/{}", profile.base_url, endpoint);
        let mut params = vec![("id".to_string(), player.to_string())];
        if profile.supports_season {
            params.push(("season".to_string(), self.season_param(profile, opts)));
        }
        let payload = self.fetch_with_retry(&url, &params).await?;

        state.advance(RunState::Normalizing);
        let mut records = Vec::new();
        for raw in response_items(&payload) {
            summary.players_seen += 1;
            match normalizer.player(sport, &raw) {
                NormalizeOutcome::Record(record) => records.push(record),
                NormalizeOutcome::Filtered => summary.filtered += 1,
                NormalizeOutcome::Skipped(reason) => {
                    warn!("skipping player entry: {reason}");
                    summary.skipped += 1;
                }
            }
        }

        state.advance(RunState::Persisting);
        for record in &records {
            match self.loader.upsert_player(record).await {
                Ok(outcome) => summary.record(outcome),
                Err(e) if e.is_run_fatal() => return Err(e),
                Err(e) => {
                    error!("failed to persist player {player}: {e}");
                    summary.failed += 1;
                }
            }
        }

        Ok(())
    }

    async fn fetch_team_list(
        &self,
        profile: &SportProfile,
        opts: &RunOptions,
    ) -> Result<Vec<Value>, IngestError> {
        let url = format!("{}/{}", profile.base_url, profile.teams_endpoint);
        let mut params = Vec::new();
        match opts.mode {
            Mode::Team { team, .. } if profile.supports_team_filter => {
                params.push(("id".to_string(), team.to_string()));
            }
            _ => {
                params.push(("league".to_string(), profile.default_league.to_string()));
                if profile.supports_season {
                    params.push(("season".to_string(), self.season_param(profile, opts)));
                }
            }
        }
        let payload = self.fetch_with_retry(&url, &params).await?;
        Ok(response_items(&payload))
    }

    fn season_param(&self, profile: &SportProfile, opts: &RunOptions) -> String {
        opts.season
            .clone()
            .unwrap_or_else(|| profile.default_season.to_string())
    }

    /// Transport failures get one bounded retry; semantic API errors never
    /// do, since identical parameters reproduce the identical error.
    async fn fetch_with_retry(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<Arc<Value>, IngestError> {
        match self.fetcher.get(url, params).await {
            Err(e) if e.is_retryable() => {
                warn!("transport failure for {url}, retrying once: {e}");
                self.fetcher.get(url, params).await
            }
            other => other,
        }
    }
}
