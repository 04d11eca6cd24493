// ─── Library Deduplicator ───
// Some loader families re-declare the same library at different versions in
// different chain layers. For those chains, duplicates are collapsed to a
// single coordinate before the classpath is built.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::collector::CollectedLibrary;
use crate::core::maven::compare_versions;
use crate::core::version::ResolvedChain;

/// One row of the activation table.
///
/// Matches when some descriptor id carries `token` and the chain's game
/// version (the base descriptor id) lies in `[min_game_version, max_game_version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRule {
    pub token: String,
    #[serde(default)]
    pub min_game_version: Option<String>,
    #[serde(default)]
    pub max_game_version: Option<String>,
}

impl DedupRule {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_ascii_lowercase(),
            min_game_version: None,
            max_game_version: None,
        }
    }

    pub fn since(mut self, version: &str) -> Self {
        self.min_game_version = Some(version.to_string());
        self
    }

    pub fn until(mut self, version: &str) -> Self {
        self.max_game_version = Some(version.to_string());
        self
    }

    fn matches(&self, ids: &[&str], game_version: &str) -> bool {
        // Rules read from config bypass `new`.
        let token = self.token.to_ascii_lowercase();
        if !ids.iter().any(|id| id_has_token(id, &token)) {
            return false;
        }
        if let Some(min) = &self.min_game_version {
            if compare_versions(game_version, min) == Ordering::Less {
                return false;
            }
        }
        if let Some(max) = &self.max_game_version {
            if compare_versions(game_version, max) != Ordering::Less {
                return false;
            }
        }
        true
    }
}

/// Loader families whose installers re-declare libraries per layer.
pub fn default_dedup_rules() -> Vec<DedupRule> {
    vec![DedupRule::new("neoforge"), DedupRule::new("forge").since("1.17")]
}

/// `true` when `token` appears in `id` as a `-`/`_`/space separated word,
/// optionally glued to a version number (`forge1.12.2`).
fn id_has_token(id: &str, token: &str) -> bool {
    id.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .map(|word| word.to_ascii_lowercase())
        .any(|word| match word.strip_prefix(token) {
            Some("") => true,
            Some(rest) => rest.starts_with(|c: char| c.is_ascii_digit()),
            None => false,
        })
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub libraries: Vec<CollectedLibrary>,
    /// Entries dropped in favour of a lower version.
    pub discarded: Vec<CollectedLibrary>,
}

#[derive(Debug, Clone)]
pub struct LibraryDeduplicator {
    rules: Vec<DedupRule>,
}

impl Default for LibraryDeduplicator {
    fn default() -> Self {
        Self::new(default_dedup_rules())
    }
}

impl LibraryDeduplicator {
    pub fn new(rules: Vec<DedupRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[DedupRule] {
        &self.rules
    }

    /// The rule that activates dedup for this chain, if any.
    pub fn triggering_rule(&self, chain: &ResolvedChain) -> Option<&DedupRule> {
        let ids = chain.ids();
        let game_version = chain.base().id.as_str();
        self.rules.iter().find(|rule| rule.matches(&ids, game_version))
    }

    /// Collapse duplicates when the chain needs it; otherwise return the
    /// libraries untouched.
    pub fn apply(&self, chain: &ResolvedChain, libraries: Vec<CollectedLibrary>) -> DedupOutcome {
        match self.triggering_rule(chain) {
            Some(rule) => {
                info!(
                    "Deduplicating libraries for {} (loader rule '{}')",
                    chain.leaf().id,
                    rule.token
                );
                keep_lowest_versions(libraries)
            }
            None => DedupOutcome {
                libraries,
                discarded: Vec::new(),
            },
        }
    }
}

/// For every version-agnostic key seen more than once keep the lowest
/// version, placed where the key first appeared.
pub fn keep_lowest_versions(libraries: Vec<CollectedLibrary>) -> DedupOutcome {
    let mut slot_by_key: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<CollectedLibrary> = Vec::with_capacity(libraries.len());
    let mut discarded = Vec::new();

    for library in libraries {
        let key = library.artifact.dedup_key();
        match slot_by_key.get(&key) {
            None => {
                slot_by_key.insert(key, kept.len());
                kept.push(library);
            }
            Some(&slot) => {
                let current = &mut kept[slot];
                if compare_versions(&library.artifact.version, &current.artifact.version)
                    == Ordering::Less
                {
                    let replaced = std::mem::replace(current, library);
                    discarded.push(replaced);
                } else {
                    discarded.push(library);
                }
            }
        }
    }

    for dropped in &discarded {
        let key = dropped.artifact.dedup_key();
        let survivor = slot_by_key
            .get(&key)
            .map(|&slot| kept[slot].artifact.version.as_str())
            .unwrap_or("?");
        info!(
            "Discarded duplicate {} {} (declared by {}), keeping {}",
            key, dropped.artifact.version, dropped.declared_by, survivor
        );
    }

    DedupOutcome {
        libraries: kept,
        discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::maven::MavenArtifact;
    use crate::core::version::VersionDescriptor;

    fn lib(coord: &str) -> CollectedLibrary {
        let artifact = MavenArtifact::parse(coord).unwrap();
        CollectedLibrary {
            path: artifact.local_path(),
            artifact,
            native_classifier: None,
            url: None,
            sha1: None,
            extract_exclude: Vec::new(),
            declared_by: "test".into(),
        }
    }

    fn chain(ids: &[&str]) -> ResolvedChain {
        let descriptors = ids
            .iter()
            .map(|id| {
                serde_json::from_value::<VersionDescriptor>(serde_json::json!({
                    "id": id,
                    "mainClass": "a.Main",
                }))
                .unwrap()
            })
            .collect();
        ResolvedChain::from_descriptors(descriptors).unwrap()
    }

    fn coords(libs: &[CollectedLibrary]) -> Vec<String> {
        libs.iter().map(|l| l.artifact.to_string()).collect()
    }

    fn sample() -> Vec<CollectedLibrary> {
        vec![lib("g:a:1.0"), lib("g:a:2.0"), lib("g:b:1.0")]
    }

    #[test]
    fn triggering_chain_keeps_lowest_version() {
        let dedup = LibraryDeduplicator::default();
        let outcome = dedup.apply(&chain(&["1.20.1", "1.20.1-forge-47.2.0"]), sample());

        assert_eq!(coords(&outcome.libraries), vec!["g:a:1.0", "g:b:1.0"]);
        assert_eq!(coords(&outcome.discarded), vec!["g:a:2.0"]);
    }

    #[test]
    fn non_triggering_chain_is_untouched() {
        let dedup = LibraryDeduplicator::default();
        let outcome = dedup.apply(&chain(&["1.20.1", "fabric-loader-0.15.0-1.20.1"]), sample());

        assert_eq!(coords(&outcome.libraries), vec!["g:a:1.0", "g:a:2.0", "g:b:1.0"]);
        assert!(outcome.discarded.is_empty());
    }

    #[test]
    fn lower_version_later_in_list_takes_first_slot() {
        let outcome = keep_lowest_versions(vec![lib("g:a:2.0"), lib("g:b:1.0"), lib("g:a:1.0")]);
        assert_eq!(coords(&outcome.libraries), vec!["g:a:1.0", "g:b:1.0"]);
    }

    #[test]
    fn classifiers_and_extensions_are_separate_keys() {
        let outcome = keep_lowest_versions(vec![
            lib("g:a:1.0"),
            lib("g:a:2.0:natives-linux"),
            lib("g:a:3.0@zip"),
        ]);
        assert_eq!(outcome.libraries.len(), 3);
    }

    #[test]
    fn game_version_thresholds_gate_activation() {
        let dedup = LibraryDeduplicator::default();
        assert!(dedup
            .triggering_rule(&chain(&["1.16.5", "1.16.5-forge-36.2.39"]))
            .is_none());
        assert!(dedup
            .triggering_rule(&chain(&["1.17.1", "1.17.1-forge-37.1.1"]))
            .is_some());

        let bounded = LibraryDeduplicator::new(vec![DedupRule::new("forge").since("1.13").until("1.17")]);
        assert!(bounded
            .triggering_rule(&chain(&["1.16.5", "1.16.5-forge-36.2.39"]))
            .is_some());
        assert!(bounded
            .triggering_rule(&chain(&["1.17", "1.17-forge-37.0.0"]))
            .is_none());
    }

    #[test]
    fn tokens_do_not_match_inside_other_words() {
        assert!(id_has_token("1.20.1-neoforge-20.1", "neoforge"));
        assert!(!id_has_token("1.20.1-neoforge-20.1", "forge"));
        assert!(id_has_token("1.12.2-forge1.12.2-14.23.5.2859", "forge"));
        assert!(!id_has_token("forgery-1.0", "forge"));
    }

    #[test]
    fn configured_rule_tokens_ignore_case() {
        let rule: DedupRule =
            serde_json::from_value(serde_json::json!({ "token": "NeoForge" })).unwrap();
        let dedup = LibraryDeduplicator::new(vec![rule]);
        assert!(dedup
            .triggering_rule(&chain(&["1.20.1", "1.20.1-neoforge-20.1.80"]))
            .is_some());
    }
}
