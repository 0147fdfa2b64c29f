//! Per-sport payload normalization.
//!
//! Each upstream API variant ships its own JSON shape: the NBA feed nests
//! league metadata and buries a player's position three levels deep, the
//! gridiron feed is flat but leaves weight strings unit-less, the soccer feed
//! wraps everything in `team`/`player` objects and only exposes position
//! inside the first statistics entry. All of that stops here; downstream
//! code only ever sees `CanonicalTeam` / `CanonicalPlayer`.
//!
//! Normalizers are pure: raw JSON in, tagged outcome out, no I/O.

use crate::model::{CanonicalPlayer, CanonicalTeam, ExternalRef};
use crate::profile::SportId;
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Tagged result of normalizing one raw entity.
///
/// `Filtered` is an intentional exclusion (exhibition/all-star placeholder,
/// national squad in a club league); `Skipped` is a malformed entity the
/// pipeline logs and counts but does not abort on. Keeping them distinct
/// keeps the run summary's skip and filter counts meaningful.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizeOutcome<T> {
    Record(T),
    Filtered,
    Skipped(String),
}

impl<T> NormalizeOutcome<T> {
    pub fn is_record(&self) -> bool {
        matches!(self, NormalizeOutcome::Record(_))
    }
}

pub trait SportNormalizer: Send + Sync {
    fn team(&self, sport: SportId, league: &str, raw: &Value) -> NormalizeOutcome<CanonicalTeam>;

    /// Team membership is a persistence concern; the loader attaches the
    /// internal team id when the record is written.
    fn player(&self, sport: SportId, raw: &Value) -> NormalizeOutcome<CanonicalPlayer>;
}

/// Capability-keyed dispatch: adding a sport means adding an arm here (and a
/// profile), not editing a shared conditional.
pub fn normalizer_for(sport: SportId) -> &'static dyn SportNormalizer {
    match sport {
        SportId::Nba | SportId::Wnba | SportId::Ncaab => &NbaNormalizer,
        SportId::Nfl | SportId::Ncaaf | SportId::Afl => &GridironNormalizer,
        SportId::Soccer => &SoccerNormalizer,
        SportId::Mlb | SportId::Nhl | SportId::Rugby | SportId::Volleyball | SportId::Handball => {
            &FlatRosterNormalizer
        }
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn str_at(raw: &Value, pointer: &str) -> Option<String> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn int_at(raw: &Value, pointer: &str) -> Option<i64> {
    match raw.pointer(pointer) {
        Some(Value::Number(n)) => n.as_i64(),
        // Some variants ship numeric fields as strings.
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_at(raw: &Value, pointer: &str) -> Option<bool> {
    raw.pointer(pointer).and_then(Value::as_bool)
}

/// Guarantee a unit suffix on a physical-attribute string. A value that is
/// bare digits gets the given unit appended; anything already annotated is
/// kept as-is.
fn with_unit(value: &str, unit: &str) -> String {
    let trimmed = value.trim();
    let bare = !trimmed.is_empty()
        && trimmed.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',');
    if bare {
        format!("{trimmed} {unit}")
    } else {
        trimmed.to_string()
    }
}

fn measured_at(raw: &Value, pointer: &str, unit: &str) -> Option<String> {
    match raw.pointer(pointer) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(with_unit(s, unit)),
        Some(Value::Number(n)) => Some(format!("{n} {unit}")),
        _ => None,
    }
}

/// Derive a whole-year age from an ISO birth date, for variants with no
/// direct age field.
fn age_from_birthdate(date: &str) -> Option<i32> {
    let born = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let today = Utc::now().date_naive();
    let mut age = today.year() - born.year();
    if (today.month(), today.day()) < (born.month(), born.day()) {
        age -= 1;
    }
    (age >= 0).then_some(age)
}

/// Required identifying fields; absence of either skips the entity.
fn ident(raw: &Value, id_ptr: &str, name_ptr: &str) -> Result<(i64, String), String> {
    let id = int_at(raw, id_ptr).ok_or_else(|| format!("missing external id at {id_ptr}"))?;
    let name = str_at(raw, name_ptr).ok_or_else(|| format!("missing name at {name_ptr}"))?;
    Ok((id, name))
}

// ---------------------------------------------------------------------------
// NBA / basketball family
// ---------------------------------------------------------------------------

/// Handles both the NBA feed (nested per-league metadata) and the generic
/// basketball feed (flat team objects).
pub struct NbaNormalizer;

impl NbaNormalizer {
    /// Exhibition/all-star placeholder: no short code plus a short
    /// conference-style all-caps name, or an explicit allStar flag. These
    /// entries carry no real league affiliation.
    fn is_placeholder(raw: &Value, name: &str) -> bool {
        if bool_at(raw, "/allStar") == Some(true) {
            return true;
        }
        let has_code = str_at(raw, "/code").is_some();
        let conference_style =
            name.len() <= 4 && name.chars().all(|c| c.is_ascii_uppercase());
        !has_code && conference_style
    }
}

impl SportNormalizer for NbaNormalizer {
    fn team(&self, sport: SportId, league: &str, raw: &Value) -> NormalizeOutcome<CanonicalTeam> {
        let (id, name) = match ident(raw, "/id", "/name") {
            Ok(pair) => pair,
            Err(reason) => return NormalizeOutcome::Skipped(reason),
        };
        if Self::is_placeholder(raw, &name) {
            return NormalizeOutcome::Filtered;
        }

        let mut extras = BTreeMap::new();
        let conference_ptr = format!("/leagues/{league}/conference");
        let division_ptr = format!("/leagues/{league}/division");
        if let Some(conference) = str_at(raw, &conference_ptr) {
            extras.insert("conference".to_string(), conference);
        }
        if let Some(division) = str_at(raw, &division_ptr) {
            extras.insert("division".to_string(), division);
        }

        NormalizeOutcome::Record(CanonicalTeam {
            external: ExternalRef { sport, id },
            league: league.to_string(),
            name,
            code: str_at(raw, "/code"),
            city: str_at(raw, "/city"),
            founded: int_at(raw, "/founded").map(|y| y as i32),
            logo: str_at(raw, "/logo"),
            country: str_at(raw, "/country/name").or_else(|| str_at(raw, "/country")),
            country_code: str_at(raw, "/country/code"),
            extras,
        })
    }

    fn player(&self, sport: SportId, raw: &Value) -> NormalizeOutcome<CanonicalPlayer> {
        let id = match int_at(raw, "/id") {
            Some(id) => id,
            None => return NormalizeOutcome::Skipped("missing external id at /id".into()),
        };
        // NBA feed splits the name; generic basketball ships it whole.
        let name = match (str_at(raw, "/firstname"), str_at(raw, "/lastname")) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            _ => match str_at(raw, "/name") {
                Some(name) => name,
                None => return NormalizeOutcome::Skipped("missing name at /name".into()),
            },
        };

        // Feet-and-inches arrive as separate fields.
        let height = match (int_at(raw, "/height/feets"), int_at(raw, "/height/inches")) {
            (Some(ft), Some(inches)) => Some(format!("{ft}'{inches}\"")),
            _ => measured_at(raw, "/height", "cm"),
        };
        let weight = measured_at(raw, "/weight/pounds", "lbs")
            .or_else(|| measured_at(raw, "/weight", "kg"));

        let age = int_at(raw, "/age")
            .map(|a| a as i32)
            .or_else(|| str_at(raw, "/birth/date").as_deref().and_then(age_from_birthdate));

        // Position lives three levels down in the NBA feed.
        let position = str_at(raw, "/leagues/standard/pos").or_else(|| str_at(raw, "/position"));
        let jersey = int_at(raw, "/leagues/standard/jersey")
            .or_else(|| int_at(raw, "/number"))
            .map(|n| n as i32);

        NormalizeOutcome::Record(CanonicalPlayer {
            external: ExternalRef { sport, id },
            name,
            team_id: None,
            position,
            jersey,
            height,
            weight,
            age,
            college: str_at(raw, "/college"),
            experience: int_at(raw, "/nba/start").map(|start| {
                (Utc::now().year() as i64 - start).max(0) as i32
            }),
            photo: str_at(raw, "/photo"),
            group_label: str_at(raw, "/leagues/standard/pos"),
        })
    }
}

// ---------------------------------------------------------------------------
// Gridiron family (NFL, AFL)
// ---------------------------------------------------------------------------

/// Flat team objects with franchise metadata (coach, owner, stadium) and
/// unit-less physical attributes on players.
pub struct GridironNormalizer;

impl SportNormalizer for GridironNormalizer {
    fn team(&self, sport: SportId, league: &str, raw: &Value) -> NormalizeOutcome<CanonicalTeam> {
        let (id, name) = match ident(raw, "/id", "/name") {
            Ok(pair) => pair,
            Err(reason) => return NormalizeOutcome::Skipped(reason),
        };
        // Conference squads (AFC/NFC entries) show up alongside franchises.
        if str_at(raw, "/code").is_none()
            && name.len() <= 4
            && name.chars().all(|c| c.is_ascii_uppercase())
        {
            return NormalizeOutcome::Filtered;
        }

        let mut extras = BTreeMap::new();
        for (key, ptr) in [("coach", "/coach"), ("owner", "/owner"), ("stadium", "/stadium")] {
            if let Some(value) = str_at(raw, ptr) {
                extras.insert(key.to_string(), value);
            }
        }

        NormalizeOutcome::Record(CanonicalTeam {
            external: ExternalRef { sport, id },
            league: league.to_string(),
            name,
            code: str_at(raw, "/code"),
            city: str_at(raw, "/city"),
            founded: int_at(raw, "/established").map(|y| y as i32),
            logo: str_at(raw, "/logo"),
            country: str_at(raw, "/country/name"),
            country_code: str_at(raw, "/country/code"),
            extras,
        })
    }

    fn player(&self, sport: SportId, raw: &Value) -> NormalizeOutcome<CanonicalPlayer> {
        let (id, name) = match ident(raw, "/id", "/name") {
            Ok(pair) => pair,
            Err(reason) => return NormalizeOutcome::Skipped(reason),
        };

        NormalizeOutcome::Record(CanonicalPlayer {
            external: ExternalRef { sport, id },
            name,
            team_id: None,
            position: str_at(raw, "/position"),
            jersey: int_at(raw, "/number").map(|n| n as i32),
            height: measured_at(raw, "/height", "in"),
            weight: measured_at(raw, "/weight", "lbs"),
            age: int_at(raw, "/age").map(|a| a as i32),
            college: str_at(raw, "/college"),
            experience: int_at(raw, "/experience").map(|e| e as i32),
            photo: str_at(raw, "/image"),
            group_label: str_at(raw, "/group"),
        })
    }
}

// ---------------------------------------------------------------------------
// Soccer
// ---------------------------------------------------------------------------

/// Everything is wrapped: teams under `team`/`venue`, players under `player`
/// with position only inside the first statistics entry.
pub struct SoccerNormalizer;

impl SportNormalizer for SoccerNormalizer {
    fn team(&self, sport: SportId, league: &str, raw: &Value) -> NormalizeOutcome<CanonicalTeam> {
        let (id, name) = match ident(raw, "/team/id", "/team/name") {
            Ok(pair) => pair,
            Err(reason) => return NormalizeOutcome::Skipped(reason),
        };
        // National squads leak into club-league listings around tournament
        // windows; they are not league members.
        if bool_at(raw, "/team/national") == Some(true) {
            return NormalizeOutcome::Filtered;
        }

        let mut extras = BTreeMap::new();
        if let Some(venue) = str_at(raw, "/venue/name") {
            extras.insert("venue".to_string(), venue);
        }

        NormalizeOutcome::Record(CanonicalTeam {
            external: ExternalRef { sport, id },
            league: league.to_string(),
            name,
            code: str_at(raw, "/team/code"),
            city: str_at(raw, "/venue/city"),
            founded: int_at(raw, "/team/founded").map(|y| y as i32),
            logo: str_at(raw, "/team/logo"),
            country: str_at(raw, "/team/country"),
            country_code: None,
            extras,
        })
    }

    fn player(&self, sport: SportId, raw: &Value) -> NormalizeOutcome<CanonicalPlayer> {
        let (id, name) = match ident(raw, "/player/id", "/player/name") {
            Ok(pair) => pair,
            Err(reason) => return NormalizeOutcome::Skipped(reason),
        };

        let age = int_at(raw, "/player/age")
            .map(|a| a as i32)
            .or_else(|| {
                str_at(raw, "/player/birth/date").as_deref().and_then(age_from_birthdate)
            });

        NormalizeOutcome::Record(CanonicalPlayer {
            external: ExternalRef { sport, id },
            name,
            team_id: None,
            position: str_at(raw, "/statistics/0/games/position"),
            jersey: int_at(raw, "/statistics/0/games/number").map(|n| n as i32),
            height: measured_at(raw, "/player/height", "cm"),
            weight: measured_at(raw, "/player/weight", "kg"),
            age,
            college: None,
            experience: None,
            photo: str_at(raw, "/player/photo"),
            group_label: str_at(raw, "/player/nationality"),
        })
    }
}

// ---------------------------------------------------------------------------
// Flat-roster family (MLB, NHL, rugby, team-only variants)
// ---------------------------------------------------------------------------

/// Flat top-level fields; position sometimes only present inside the first
/// statistics entry.
pub struct FlatRosterNormalizer;

impl SportNormalizer for FlatRosterNormalizer {
    fn team(&self, sport: SportId, league: &str, raw: &Value) -> NormalizeOutcome<CanonicalTeam> {
        let (id, name) = match ident(raw, "/id", "/name") {
            Ok(pair) => pair,
            Err(reason) => return NormalizeOutcome::Skipped(reason),
        };
        if bool_at(raw, "/national") == Some(true) {
            return NormalizeOutcome::Filtered;
        }

        NormalizeOutcome::Record(CanonicalTeam {
            external: ExternalRef { sport, id },
            league: league.to_string(),
            name,
            code: str_at(raw, "/code"),
            city: str_at(raw, "/city"),
            founded: int_at(raw, "/founded").map(|y| y as i32),
            logo: str_at(raw, "/logo"),
            country: str_at(raw, "/country/name"),
            country_code: str_at(raw, "/country/code"),
            extras: BTreeMap::new(),
        })
    }

    fn player(&self, sport: SportId, raw: &Value) -> NormalizeOutcome<CanonicalPlayer> {
        let (id, name) = match ident(raw, "/id", "/name") {
            Ok(pair) => pair,
            Err(reason) => return NormalizeOutcome::Skipped(reason),
        };

        NormalizeOutcome::Record(CanonicalPlayer {
            external: ExternalRef { sport, id },
            name,
            team_id: None,
            position: str_at(raw, "/position")
                .or_else(|| str_at(raw, "/statistics/0/position"))
                .or_else(|| str_at(raw, "/statistics/0/games/position")),
            jersey: int_at(raw, "/number").map(|n| n as i32),
            height: measured_at(raw, "/height", "cm"),
            weight: measured_at(raw, "/weight", "kg"),
            age: int_at(raw, "/age")
                .map(|a| a as i32)
                .or_else(|| str_at(raw, "/birth/date").as_deref().and_then(age_from_birthdate)),
            college: str_at(raw, "/college"),
            experience: int_at(raw, "/experience").map(|e| e as i32),
            photo: str_at(raw, "/photo"),
            group_label: str_at(raw, "/group"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn team_of<T>(outcome: NormalizeOutcome<T>) -> T {
        match outcome {
            NormalizeOutcome::Record(t) => t,
            _ => panic!("expected a record outcome"),
        }
    }

    #[test]
    fn nba_team_extracts_nested_league_metadata() {
        let raw = json!({
            "id": 1,
            "name": "Atlanta Hawks",
            "code": "ATL",
            "city": "Atlanta",
            "logo": "https://cdn/hawks.png",
            "allStar": false,
            "leagues": {"standard": {"conference": "East", "division": "Southeast"}}
        });
        let team = team_of(NbaNormalizer.team(SportId::Nba, "standard", &raw));
        assert_eq!(team.external.id, 1);
        assert_eq!(team.code.as_deref(), Some("ATL"));
        assert_eq!(team.extras.get("conference").map(String::as_str), Some("East"));
        assert_eq!(team.extras.get("division").map(String::as_str), Some("Southeast"));
    }

    #[test]
    fn all_star_placeholder_is_filtered_not_skipped() {
        // Null short code + two-letter conference-style name.
        let raw = json!({"id": 37, "name": "LBN", "code": null, "city": null});
        assert_eq!(
            NbaNormalizer.team(SportId::Nba, "standard", &raw),
            NormalizeOutcome::Filtered
        );

        let flagged = json!({"id": 38, "name": "Team Giannis", "code": "GIA", "allStar": true});
        assert_eq!(
            NbaNormalizer.team(SportId::Nba, "standard", &flagged),
            NormalizeOutcome::Filtered
        );
    }

    #[test]
    fn missing_identity_is_skipped_with_reason() {
        let no_id = json!({"name": "Mystery Team"});
        match NbaNormalizer.team(SportId::Nba, "standard", &no_id) {
            NormalizeOutcome::Skipped(reason) => assert!(reason.contains("external id")),
            other => panic!("expected Skipped, got {other:?}"),
        }

        let no_name = json!({"id": 9});
        match GridironNormalizer.player(SportId::Nfl, &no_name) {
            NormalizeOutcome::Skipped(reason) => assert!(reason.contains("name")),
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[test]
    fn nba_player_age_derived_and_position_unburied() {
        let raw = json!({
            "id": 265,
            "firstname": "LeBron",
            "lastname": "James",
            "birth": {"date": "1984-12-30"},
            "height": {"feets": 6, "inches": 9},
            "weight": {"pounds": 250},
            "college": "St. Vincent-St. Mary",
            "leagues": {"standard": {"jersey": 23, "pos": "F"}}
        });
        let player = team_of(NbaNormalizer.player(SportId::Nba, &raw));
        assert_eq!(player.name, "LeBron James");
        assert_eq!(player.position.as_deref(), Some("F"));
        assert_eq!(player.jersey, Some(23));
        assert_eq!(player.height.as_deref(), Some("6'9\""));
        assert_eq!(player.weight.as_deref(), Some("250 lbs"));
        // Birth date in 1984 puts the derived age past 40 regardless of the
        // current date.
        assert!(player.age.unwrap() >= 40);
    }

    #[test]
    fn gridiron_weight_gets_unit_suffix_when_missing() {
        let raw = json!({
            "id": 101,
            "name": "Mac Jones",
            "age": 26,
            "height": "6' 3\"",
            "weight": "214",
            "group": "Offense",
            "position": "QB",
            "number": 10,
            "college": "Alabama",
            "experience": 4
        });
        let player = team_of(GridironNormalizer.player(SportId::Nfl, &raw));
        assert_eq!(player.weight.as_deref(), Some("214 lbs"));
        // Already-annotated height is left alone.
        assert_eq!(player.height.as_deref(), Some("6' 3\""));
        assert_eq!(player.group_label.as_deref(), Some("Offense"));
    }

    #[test]
    fn gridiron_team_collects_franchise_extras() {
        let raw = json!({
            "id": 17,
            "name": "New England Patriots",
            "code": "NE",
            "city": "Foxborough",
            "coach": "Mike Vrabel",
            "owner": "Robert Kraft",
            "stadium": "Gillette Stadium",
            "established": 1960,
            "country": {"name": "USA", "code": "US"}
        });
        let team = team_of(GridironNormalizer.team(SportId::Nfl, "1", &raw));
        assert_eq!(team.founded, Some(1960));
        assert_eq!(team.extras.get("coach").map(String::as_str), Some("Mike Vrabel"));
        assert_eq!(team.extras.get("owner").map(String::as_str), Some("Robert Kraft"));
    }

    #[test]
    fn soccer_position_comes_from_first_statistics_entry() {
        let raw = json!({
            "player": {
                "id": 874,
                "name": "C. Ronaldo",
                "age": null,
                "birth": {"date": "1985-02-05"},
                "nationality": "Portugal",
                "height": "187",
                "weight": "83 kg",
                "photo": "https://cdn/874.png"
            },
            "statistics": [
                {"games": {"position": "Attacker", "number": 7}}
            ]
        });
        let player = team_of(SoccerNormalizer.player(SportId::Soccer, &raw));
        assert_eq!(player.position.as_deref(), Some("Attacker"));
        assert_eq!(player.jersey, Some(7));
        assert_eq!(player.height.as_deref(), Some("187 cm"));
        assert_eq!(player.weight.as_deref(), Some("83 kg"));
        assert!(player.age.unwrap() >= 40);
        assert_eq!(player.group_label.as_deref(), Some("Portugal"));
    }

    #[test]
    fn soccer_national_squad_is_filtered() {
        let raw = json!({
            "team": {"id": 10, "name": "England", "national": true},
            "venue": {"name": "Wembley", "city": "London"}
        });
        assert_eq!(
            SoccerNormalizer.team(SportId::Soccer, "39", &raw),
            NormalizeOutcome::Filtered
        );
    }

    #[test]
    fn flat_roster_falls_back_to_buried_position() {
        let raw = json!({
            "id": 63,
            "name": "Brad Marchand",
            "age": 37,
            "height": "175",
            "weight": "82",
            "number": 63,
            "statistics": [{"position": "LW"}]
        });
        let player = team_of(FlatRosterNormalizer.player(SportId::Nhl, &raw));
        assert_eq!(player.position.as_deref(), Some("LW"));
        assert_eq!(player.height.as_deref(), Some("175 cm"));
        assert_eq!(player.weight.as_deref(), Some("82 kg"));
    }

    #[test]
    fn college_and_wnba_variants_reuse_the_family_normalizers() {
        // WNBA routes through the basketball normalizer, placeholder
        // heuristic included.
        let placeholder = json!({"id": 5, "name": "WEST", "code": null});
        assert_eq!(
            normalizer_for(SportId::Wnba).team(SportId::Wnba, "13", &placeholder),
            NormalizeOutcome::Filtered
        );
        // NCAAF routes through the gridiron normalizer.
        let conference = json!({"id": 9, "name": "SEC", "code": null});
        assert_eq!(
            normalizer_for(SportId::Ncaaf).team(SportId::Ncaaf, "2", &conference),
            NormalizeOutcome::Filtered
        );
    }

    #[test]
    fn unit_helper_leaves_annotated_values_alone() {
        assert_eq!(with_unit("313", "lbs"), "313 lbs");
        assert_eq!(with_unit("6'3\"", "in"), "6'3\"");
        assert_eq!(with_unit("187 cm", "cm"), "187 cm");
    }
}
