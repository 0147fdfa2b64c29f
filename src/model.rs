//! Canonical internal records and the run summary.
//!
//! Everything downstream of the normalizer speaks these shapes; sport
//! quirks stop at the normalizer boundary. The `extras` bag carries the
//! sport-specific attributes (conference/division, coach/owner, nationality)
//! that land in the dependent key-value table.

use crate::profile::SportId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// (sport, external identifier) — how the third-party API knows an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalRef {
    pub sport: SportId,
    pub id: i64,
}

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sport, self.id)
    }
}

/// Normalized team record. `code` is the short code the external source
/// supplied, not the final league-unique code (the resolver assigns that);
/// the internal identifier is the loader's to mint on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTeam {
    pub external: ExternalRef,
    pub league: String,
    pub name: String,
    pub code: Option<String>,
    pub city: Option<String>,
    pub founded: Option<i32>,
    pub logo: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub extras: BTreeMap<String, String>,
}

/// Normalized player record. Height and weight, when present, always carry a
/// unit suffix even if the source omitted one. `team_id` stays `None` until
/// the orchestrator attaches the persisted team's identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalPlayer {
    pub external: ExternalRef,
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

/// Outcome of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Counters accumulated over one ingestion run and logged at the end.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub requests: u64,
    pub teams_seen: usize,
    pub players_seen: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub filtered: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// True when the run completed but contained at least one per-entity or
    /// per-team failure. Drives the completed-with-failures exit status.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests={} teams={} players={} inserted={} updated={} unchanged={} filtered={} skipped={} failed={} elapsed={:.1}s",
            self.requests,
            self.teams_seen,
            self.players_seen,
            self.inserted,
            self.updated,
            self.unchanged,
            self.filtered,
            self.skipped,
            self.failed,
            self.elapsed.as_secs_f64()
        )
    }
}
