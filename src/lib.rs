//! Multi-sport roster ingestion and identity-resolution pipeline.
//!
//! Fetches team and player payloads from a third-party sports data API,
//! normalizes the per-sport shapes into canonical records, resolves external
//! identifiers to internal ones (minting deterministic short codes where the
//! source has none), and upserts only real changes into Postgres.
//!
//! Pipeline order: profile registry → rate-limited fetch → per-sport
//! normalization → identity/code resolution → change-aware persistence,
//! driven by the orchestrator one team at a time.

pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod orchestrate;
pub mod profile;
pub mod resolve;
pub mod store;

pub use config::Config;
pub use error::IngestError;
pub use model::{CanonicalPlayer, CanonicalTeam, ExternalRef, RunSummary, UpsertOutcome};
pub use orchestrate::{Mode, Orchestrator, RunOptions};
pub use profile::SportId;
