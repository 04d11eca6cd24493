// ─── Rule Evaluation ───
// OS and feature predicates attached to libraries and arguments.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
    /// Feature name → required state. Every entry must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    /// OS version regex. Carried for completeness, not evaluated.
    #[serde(default)]
    pub version: Option<String>,
}

/// Everything a rule can be evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleContext {
    pub os_name: String,
    pub os_arch: String,
    pub features: BTreeSet<String>,
}

impl Default for RuleContext {
    fn default() -> Self {
        Self::current()
    }
}

impl RuleContext {
    /// Context for the running platform with no features enabled.
    pub fn current() -> Self {
        Self {
            os_name: current_os_name().to_string(),
            os_arch: current_os_arch().to_string(),
            features: BTreeSet::new(),
        }
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    /// `"64"` or `"32"`, used to expand `${arch}` in native classifiers.
    pub fn arch_bits(&self) -> &'static str {
        if self.os_arch == "x86" || self.os_arch == "arm" {
            "32"
        } else {
            "64"
        }
    }
}

impl Rule {
    fn matches(&self, ctx: &RuleContext) -> bool {
        if let Some(os) = &self.os {
            if os.name.as_deref().is_some_and(|name| name != ctx.os_name) {
                return false;
            }
            if os.arch.as_deref().is_some_and(|arch| arch != ctx.os_arch) {
                return false;
            }
        }

        if let Some(features) = &self.features {
            for (feature, wanted) in features {
                if ctx.has_feature(feature) != *wanted {
                    return false;
                }
            }
        }

        true
    }
}

/// Evaluate a rule list.
///
/// - No rules → allowed.
/// - Otherwise start disallowed; every matching rule overwrites the verdict
///   with its own action, so the last match wins.
pub fn rules_allow(rules: &[Rule], ctx: &RuleContext) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut allowed = false;
    for rule in rules {
        if rule.matches(ctx) {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}

/// Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

fn current_os_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "x86",
        "x86_64" => "x86_64",
        "aarch64" => "arm64",
        "arm" => "arm",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(os: &str) -> RuleContext {
        RuleContext {
            os_name: os.into(),
            os_arch: "x86_64".into(),
            features: BTreeSet::new(),
        }
    }

    fn os_rule(action: RuleAction, os: &str) -> Rule {
        Rule {
            action,
            os: Some(OsRule {
                name: Some(os.into()),
                ..OsRule::default()
            }),
            features: None,
        }
    }

    #[test]
    fn no_rules_means_allowed() {
        assert!(rules_allow(&[], &ctx("linux")));
    }

    #[test]
    fn allow_only_named_os() {
        let rules = vec![os_rule(RuleAction::Allow, "osx")];
        assert!(rules_allow(&rules, &ctx("osx")));
        assert!(!rules_allow(&rules, &ctx("linux")));
    }

    #[test]
    fn last_matching_rule_wins() {
        let rules = vec![
            Rule {
                action: RuleAction::Allow,
                os: None,
                features: None,
            },
            os_rule(RuleAction::Disallow, "osx"),
        ];
        assert!(rules_allow(&rules, &ctx("linux")));
        assert!(!rules_allow(&rules, &ctx("osx")));
    }

    #[test]
    fn feature_rules_require_every_feature() {
        let mut features = BTreeMap::new();
        features.insert("has_custom_resolution".to_string(), true);
        let rules = vec![Rule {
            action: RuleAction::Allow,
            os: None,
            features: Some(features),
        }];

        assert!(!rules_allow(&rules, &ctx("linux")));
        let with_feature = ctx("linux").with_features(["has_custom_resolution"]);
        assert!(rules_allow(&rules, &with_feature));
    }

    #[test]
    fn arch_rule_is_compared() {
        let rules = vec![Rule {
            action: RuleAction::Allow,
            os: Some(OsRule {
                arch: Some("x86".into()),
                ..OsRule::default()
            }),
            features: None,
        }];
        assert!(!rules_allow(&rules, &ctx("windows")));
        let mut x86 = ctx("windows");
        x86.os_arch = "x86".into();
        assert!(rules_allow(&rules, &x86));
        assert_eq!(x86.arch_bits(), "32");
    }

    #[test]
    fn deserializes_mojang_rule_json() {
        let rules: Vec<Rule> = serde_json::from_value(serde_json::json!([
            {"action": "allow"},
            {"action": "disallow", "os": {"name": "osx"}}
        ]))
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].action, RuleAction::Disallow);
    }
}
