//! Static sport profiles: one entry per upstream API variant.
//!
//! Pure data. Everything the orchestrator needs to know about a sport before
//! touching the network lives here: base address, default league, which
//! request parameters the variant supports, and whether rosters must be
//! fetched one team at a time.

use crate::error::IngestError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SportId {
    Nba,
    Wnba,
    Ncaab,
    Nfl,
    Ncaaf,
    Afl,
    Mlb,
    Nhl,
    Soccer,
    Rugby,
    Volleyball,
    Handball,
}

impl SportId {
    pub fn tag(&self) -> &'static str {
        match self {
            SportId::Nba => "nba",
            SportId::Wnba => "wnba",
            SportId::Ncaab => "ncaab",
            SportId::Nfl => "nfl",
            SportId::Ncaaf => "ncaaf",
            SportId::Afl => "afl",
            SportId::Mlb => "mlb",
            SportId::Nhl => "nhl",
            SportId::Soccer => "soccer",
            SportId::Rugby => "rugby",
            SportId::Volleyball => "volleyball",
            SportId::Handball => "handball",
        }
    }
}

impl fmt::Display for SportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SportId {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nba" => Ok(SportId::Nba),
            "wnba" => Ok(SportId::Wnba),
            "ncaab" | "college-basketball" => Ok(SportId::Ncaab),
            "nfl" | "american-football" => Ok(SportId::Nfl),
            "ncaaf" | "college-football" => Ok(SportId::Ncaaf),
            "afl" => Ok(SportId::Afl),
            "mlb" | "baseball" => Ok(SportId::Mlb),
            "nhl" | "hockey" => Ok(SportId::Nhl),
            "soccer" | "football" => Ok(SportId::Soccer),
            "rugby" => Ok(SportId::Rugby),
            "volleyball" => Ok(SportId::Volleyball),
            "handball" => Ok(SportId::Handball),
            other => Err(IngestError::UnsupportedSport(other.to_string())),
        }
    }
}

/// Immutable per-sport configuration, constructed once at startup.
#[derive(Debug, Clone, Copy)]
pub struct SportProfile {
    pub sport: SportId,
    pub base_url: &'static str,
    /// League identifier the provider expects when none is given explicitly.
    pub default_league: &'static str,
    pub default_season: &'static str,
    pub supports_season: bool,
    pub supports_team_filter: bool,
    /// Rosters must be requested one team at a time.
    pub per_team_batching: bool,
    pub teams_endpoint: &'static str,
    pub players_endpoint: Option<&'static str>,
}

const PROFILES: &[SportProfile] = &[
    SportProfile {
        sport: SportId::Nba,
        base_url: "https://v2.nba.api-sports.io",
        default_league: "standard",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    SportProfile {
        sport: SportId::Wnba,
        base_url: "https://v1.basketball.api-sports.io",
        default_league: "13",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    SportProfile {
        sport: SportId::Ncaab,
        base_url: "https://v1.basketball.api-sports.io",
        default_league: "116",
        default_season: "2025-2026",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    SportProfile {
        sport: SportId::Nfl,
        base_url: "https://v1.american-football.api-sports.io",
        default_league: "1",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    SportProfile {
        sport: SportId::Ncaaf,
        base_url: "https://v1.american-football.api-sports.io",
        default_league: "2",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    SportProfile {
        sport: SportId::Afl,
        base_url: "https://v1.afl.api-sports.io",
        default_league: "1",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    SportProfile {
        sport: SportId::Mlb,
        base_url: "https://v1.baseball.api-sports.io",
        default_league: "1",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    SportProfile {
        sport: SportId::Nhl,
        base_url: "https://v1.hockey.api-sports.io",
        default_league: "57",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    SportProfile {
        sport: SportId::Soccer,
        base_url: "https://v3.football.api-sports.io",
        default_league: "39",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    SportProfile {
        sport: SportId::Rugby,
        base_url: "https://v1.rugby.api-sports.io",
        default_league: "16",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: true,
        teams_endpoint: "teams",
        players_endpoint: Some("players"),
    },
    // Team-only variants: the provider exposes no roster endpoint for these.
    SportProfile {
        sport: SportId::Volleyball,
        base_url: "https://v1.volleyball.api-sports.io",
        default_league: "113",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: false,
        teams_endpoint: "teams",
        players_endpoint: None,
    },
    SportProfile {
        sport: SportId::Handball,
        base_url: "https://v1.handball.api-sports.io",
        default_league: "78",
        default_season: "2025",
        supports_season: true,
        supports_team_filter: true,
        per_team_batching: false,
        teams_endpoint: "teams",
        players_endpoint: None,
    },
];

/// Look up the profile for a sport.
pub fn resolve(sport: SportId) -> &'static SportProfile {
    PROFILES
        .iter()
        .find(|p| p.sport == sport)
        .unwrap_or_else(|| unreachable!("profile table covers every SportId variant"))
}

/// Look up a profile for roster (player) ingestion. Fails fast, before any
/// network call, for sports with no configured player endpoint.
pub fn resolve_for_players(sport: SportId) -> Result<&'static SportProfile, IngestError> {
    let profile = resolve(sport);
    if profile.players_endpoint.is_none() {
        return Err(IngestError::NoPlayerEndpoint(sport));
    }
    Ok(profile)
}
