//! Short-code derivation and collision avoidance.
//!
//! Teams without a provider-supplied short code get a deterministic
//! human-readable one derived from their display name. The registry is
//! scoped to one league and one run, seeded from the store, and every code
//! handed out is registered before the next candidate is looked at — that
//! ordering is what keeps two similarly named teams in the same run from
//! ever sharing a code.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Per-league set of codes already assigned, persisted or in this run.
#[derive(Debug, Default)]
pub struct CodeRegistry {
    codes: HashSet<String>,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from codes already persisted for this league.
    pub fn seeded<I: IntoIterator<Item = String>>(existing: I) -> Self {
        Self {
            codes: existing.into_iter().map(|c| c.to_uppercase()).collect(),
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(&code.to_uppercase())
    }

    pub fn register(&mut self, code: &str) {
        self.codes.insert(code.to_uppercase());
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Assign a unique code for a team, registering it immediately.
    ///
    /// Preference order: the supplied short code; the name-derived base; the
    /// 3-char base with an ascending numeric suffix; finally a hash-derived
    /// disambiguator for the pathological case where 1–99 are all taken.
    pub fn assign(&mut self, supplied: Option<&str>, name: &str) -> String {
        let base = supplied
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| derive_base_code(name));

        let code = if !self.contains(&base) {
            base
        } else {
            self.disambiguate(&base, name)
        };

        self.register(&code);
        code
    }

    fn disambiguate(&self, base: &str, name: &str) -> String {
        let stem: String = base.chars().take(3).collect();
        for n in 1..=99 {
            let candidate = format!("{stem}{n}");
            if !self.contains(&candidate) {
                return candidate;
            }
        }

        // Pathological fallback: walk the digest of the full name two hex
        // chars at a time until a free code turns up. Deterministic in the
        // name; the digest gives 32 candidates before the final counter scan.
        let short: String = base.chars().take(2).collect();
        let digest = Sha256::digest(name.as_bytes());
        for byte in digest.iter() {
            let candidate = format!("{short}{byte:02X}");
            if !self.contains(&candidate) {
                return candidate;
            }
        }
        let mut n = 100u32;
        loop {
            let candidate = format!("{short}{n}");
            if !self.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Derive a 4-character base code from a display name: first two characters
/// of the first word plus first two of the last word; single-word names take
/// their first four characters.
pub fn derive_base_code(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let code: String = match words.as_slice() {
        [] => String::new(),
        [only] => only.chars().take(4).collect(),
        [first, .., last] => first.chars().take(2).chain(last.chars().take(2)).collect(),
    };
    code.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_code_from_two_word_name() {
        assert_eq!(derive_base_code("Boston Celtics"), "BOCE");
        assert_eq!(derive_base_code("New England Patriots"), "NEPA");
    }

    #[test]
    fn single_word_name_takes_first_four() {
        assert_eq!(derive_base_code("Juventus"), "JUVE");
        assert_eq!(derive_base_code("Ajax"), "AJAX");
        assert_eq!(derive_base_code("OM"), "OM");
    }

    #[test]
    fn supplied_code_wins_over_derivation() {
        let mut registry = CodeRegistry::new();
        assert_eq!(registry.assign(Some("bos"), "Boston Celtics"), "BOS");
    }

    #[test]
    fn colliding_base_codes_get_numeric_suffixes() {
        assert_eq!(derive_base_code("Boston Red"), "BORE");
        assert_eq!(derive_base_code("Boston Renegades"), "BORE");

        let mut registry = CodeRegistry::new();
        let first = registry.assign(None, "Boston Red");
        let second = registry.assign(None, "Boston Renegades");
        let third = registry.assign(None, "Boston Revolution");
        assert_eq!(first, "BORE");
        assert_eq!(second, "BOR1");
        assert_eq!(third, "BOR2");
    }

    #[test]
    fn seeded_registry_never_reassigns_persisted_codes() {
        let mut registry =
            CodeRegistry::seeded(vec!["BORE".to_string(), "BOR1".to_string()]);
        let code = registry.assign(None, "Boston Renegades");
        assert_eq!(code, "BOR2");
        assert!(registry.contains("BOR2"));
    }

    #[test]
    fn n_colliding_names_yield_n_distinct_codes() {
        let mut registry = CodeRegistry::new();
        let mut seen = HashSet::new();
        for i in 0..150 {
            let code = registry.assign(None, &format!("Boston Renegades {i} Boston"));
            assert!(seen.insert(code), "duplicate code assigned");
        }
        assert_eq!(seen.len(), 150);
    }

    #[test]
    fn exhausted_numeric_suffixes_fall_back_to_hash() {
        let mut registry = CodeRegistry::new();
        registry.register("BORE");
        for n in 1..=99 {
            registry.register(&format!("BOR{n}"));
        }
        let code = registry.assign(None, "Boston Renegades");
        assert_eq!(code.len(), 4);
        assert!(code.starts_with("BO"));
        // Hash-derived suffix is two uppercase hex characters.
        assert!(code[2..].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(registry.contains(&code));
    }

    #[test]
    fn registration_happens_before_next_candidate() {
        let mut registry = CodeRegistry::new();
        let a = registry.assign(None, "Los Angeles Lakers");
        // Same base ("LOLA") must be visible to the very next candidate.
        let b = registry.assign(None, "Lodi Lancers");
        assert_eq!(a, "LOLA");
        assert_ne!(a, b);
    }
}
