// ─── Version Descriptor ───
// One layer of launch configuration, parsed from a Mojang-format version JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::rules::{rules_allow, Rule, RuleContext};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub id: String,
    #[serde(default)]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
    /// Legacy asset index reference, used when `assetIndex` is absent.
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    /// Legacy `minecraftArguments` field (pre-1.13).
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    /// Overrides which version's jar is the primary game jar.
    #[serde(default)]
    pub jar: Option<String>,
    #[serde(default, rename = "type")]
    pub version_type: Option<String>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<DownloadArtifact>,
}

/// A file published with its location and checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadArtifact {
    pub url: String,
    pub sha1: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<ArgumentValue>,
    #[serde(default)]
    pub jvm: Vec<ArgumentValue>,
}

/// Either a bare string or a rule-gated object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Plain(String),
    Gated {
        #[serde(default)]
        rules: Vec<Rule>,
        value: OneOrMany,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// A single argument string with `${token}` placeholders and its gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentTemplate {
    pub value: String,
    pub rules: Vec<Rule>,
}

impl ArgumentTemplate {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            rules: Vec::new(),
        }
    }

    pub fn gated(value: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            value: value.into(),
            rules,
        }
    }
}

// ─── Library Entry ───

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Maven coordinate.
    pub name: String,
    /// Repository base for loaders that publish plain Maven coordinates.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// OS name → native classifier (may contain `${arch}`).
    #[serde(default)]
    pub natives: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub extract: Option<ExtractRules>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<LibraryArtifact>,
    #[serde(default)]
    pub classifiers: Option<BTreeMap<String, LibraryArtifact>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryArtifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractRules {
    /// Archive path prefixes that must not be extracted (e.g. `META-INF/`).
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl LibraryEntry {
    pub fn coordinate(&self) -> LauncherResult<MavenArtifact> {
        MavenArtifact::parse(&self.name)
    }

    pub fn is_allowed(&self, ctx: &RuleContext) -> bool {
        rules_allow(&self.rules, ctx)
    }

    /// The native classifier declared for the context's OS, with `${arch}`
    /// expanded.
    pub fn native_classifier(&self, ctx: &RuleContext) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let classifier = natives.get(&ctx.os_name)?;
        Some(classifier.replace("${arch}", ctx.arch_bits()))
    }

    /// Download metadata for the given classifier, or the main artifact.
    pub fn download_for(&self, classifier: Option<&str>) -> Option<&LibraryArtifact> {
        let downloads = self.downloads.as_ref()?;
        match classifier {
            Some(c) => downloads.classifiers.as_ref()?.get(c),
            None => downloads.artifact.as_ref(),
        }
    }

    pub fn extract_excludes(&self) -> &[String] {
        self.extract
            .as_ref()
            .map(|e| e.exclude.as_slice())
            .unwrap_or(&[])
    }
}

impl VersionDescriptor {
    /// Parse a version JSON document.
    pub fn from_json(raw: &str) -> LauncherResult<Self> {
        let descriptor: VersionDescriptor = serde_json::from_str(raw)?;
        if descriptor.id.trim().is_empty() {
            return Err(LauncherError::InvalidDescriptor {
                id: String::new(),
                reason: "empty id".into(),
            });
        }
        if descriptor.inherits_from.as_deref() == Some(descriptor.id.as_str()) {
            return Err(LauncherError::CircularReference(descriptor.id));
        }
        Ok(descriptor)
    }

    pub fn client_download(&self) -> Option<&DownloadArtifact> {
        self.downloads.as_ref().and_then(|d| d.client.as_ref())
    }

    pub fn asset_index_id(&self) -> Option<&str> {
        self.asset_index
            .as_ref()
            .map(|a| a.id.as_str())
            .or(self.assets.as_deref())
    }

    /// Program argument templates. Falls back to splitting the legacy
    /// `minecraftArguments` string when the modern block is absent.
    pub fn game_templates(&self) -> Vec<ArgumentTemplate> {
        match &self.arguments {
            Some(args) if !args.game.is_empty() => flatten_arguments(&args.game),
            _ => self
                .minecraft_arguments
                .as_deref()
                .map(|s| s.split_whitespace().map(ArgumentTemplate::plain).collect())
                .unwrap_or_default(),
        }
    }

    pub fn jvm_templates(&self) -> Vec<ArgumentTemplate> {
        match &self.arguments {
            Some(args) => flatten_arguments(&args.jvm),
            None => Vec::new(),
        }
    }

    /// Whether this layer declares the modern `arguments` block.
    pub fn has_modern_arguments(&self) -> bool {
        self.arguments.is_some()
    }
}

fn flatten_arguments(values: &[ArgumentValue]) -> Vec<ArgumentTemplate> {
    let mut templates = Vec::new();
    for value in values {
        match value {
            ArgumentValue::Plain(s) => templates.push(ArgumentTemplate::plain(s.clone())),
            ArgumentValue::Gated { rules, value } => match value {
                OneOrMany::One(s) => templates.push(ArgumentTemplate::gated(s.clone(), rules.clone())),
                OneOrMany::Many(list) => templates.extend(
                    list.iter()
                        .map(|s| ArgumentTemplate::gated(s.clone(), rules.clone())),
                ),
            },
        }
    }
    templates
}
