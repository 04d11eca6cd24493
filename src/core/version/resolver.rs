// ─── Manifest Resolver ───
// Follows `inheritsFrom` pointers into an ordered, cycle-free chain.

use std::collections::HashSet;

use tracing::debug;

use super::descriptor::{ArgumentTemplate, AssetIndexInfo, DownloadArtifact, VersionDescriptor};
use super::index::VersionIndex;
use crate::core::error::{LauncherError, LauncherResult};

/// Descriptors ordered base-first, leaf-last.
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    descriptors: Vec<VersionDescriptor>,
    main_class: String,
}

pub struct ManifestResolver<'a> {
    index: &'a dyn VersionIndex,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(index: &'a dyn VersionIndex) -> Self {
        Self { index }
    }

    /// Resolve `leaf_id` and all its ancestors.
    ///
    /// Iterative on purpose: deep chains never grow the stack, and the seen
    /// set catches any cycle, reported against the requested root.
    pub async fn resolve(&self, leaf_id: &str) -> LauncherResult<ResolvedChain> {
        let mut chain: Vec<VersionDescriptor> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut next = Some(leaf_id.to_string());

        while let Some(id) = next.take() {
            if !seen.insert(id.clone()) {
                return Err(LauncherError::CircularReference(leaf_id.to_string()));
            }

            let descriptor = self
                .index
                .lookup(&id)
                .await?
                .ok_or_else(|| LauncherError::MissingVersion(id.clone()))?;

            debug!(
                "Resolved descriptor {} (parent: {:?})",
                descriptor.id, descriptor.inherits_from
            );
            next = descriptor.inherits_from.clone();
            chain.push(descriptor);
        }

        chain.reverse();
        ResolvedChain::from_descriptors(chain)
    }
}

impl ResolvedChain {
    /// Build a chain from descriptors already ordered base-first.
    pub fn from_descriptors(descriptors: Vec<VersionDescriptor>) -> LauncherResult<Self> {
        let Some(leaf) = descriptors.last() else {
            return Err(LauncherError::InvalidDescriptor {
                id: String::new(),
                reason: "empty version chain".into(),
            });
        };

        let mut seen = HashSet::new();
        for d in &descriptors {
            if !seen.insert(d.id.as_str()) {
                return Err(LauncherError::CircularReference(leaf.id.clone()));
            }
        }

        let main_class = descriptors
            .iter()
            .rev()
            .find_map(|d| d.main_class.clone().filter(|m| !m.trim().is_empty()))
            .ok_or_else(|| LauncherError::MissingMainClass(leaf.id.clone()))?;

        Ok(Self {
            descriptors,
            main_class,
        })
    }

    pub fn descriptors(&self) -> &[VersionDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn base(&self) -> &VersionDescriptor {
        &self.descriptors[0]
    }

    pub fn leaf(&self) -> &VersionDescriptor {
        &self.descriptors[self.descriptors.len() - 1]
    }

    /// Last non-empty main class walking leaf-to-base.
    pub fn main_class(&self) -> &str {
        &self.main_class
    }

    /// Asset index id, most specific layer first; the base supplies the default.
    pub fn asset_index_id(&self) -> Option<&str> {
        self.descriptors.iter().rev().find_map(|d| d.asset_index_id())
    }

    /// Asset index reference, most specific layer first. Layers that only
    /// name their assets (`"assets": "1.8"`) carry no index to fetch.
    pub fn asset_index(&self) -> Option<&AssetIndexInfo> {
        self.descriptors.iter().rev().find_map(|d| d.asset_index.as_ref())
    }

    /// Download of the primary game jar. Prefers the layer the jar is named
    /// after, then the most specific layer that publishes one.
    pub fn client_download(&self) -> Option<&DownloadArtifact> {
        let jar = self.jar_name();
        self.descriptors
            .iter()
            .find(|d| d.id == jar)
            .and_then(|d| d.client_download())
            .or_else(|| self.descriptors.iter().rev().find_map(|d| d.client_download()))
    }

    /// Name of the version whose jar is the primary game jar.
    pub fn jar_name(&self) -> &str {
        self.descriptors
            .iter()
            .rev()
            .find_map(|d| d.jar.as_deref())
            .unwrap_or(&self.base().id)
    }

    pub fn version_type(&self) -> &str {
        self.descriptors
            .iter()
            .rev()
            .find_map(|d| d.version_type.as_deref())
            .unwrap_or("release")
    }

    /// JVM templates merged base-first.
    pub fn jvm_templates(&self) -> Vec<ArgumentTemplate> {
        self.descriptors
            .iter()
            .flat_map(|d| d.jvm_templates())
            .collect()
    }

    /// Program templates. A legacy `minecraftArguments` string is a full
    /// replacement for its parent's, so the most specific legacy layer wins;
    /// modern `arguments.game` blocks are appended base-first.
    pub fn game_templates(&self) -> Vec<ArgumentTemplate> {
        let mut templates = Vec::new();
        for descriptor in &self.descriptors {
            if descriptor.has_modern_arguments() {
                templates.extend(descriptor.game_templates());
            } else if descriptor.minecraft_arguments.is_some() {
                templates = descriptor.game_templates();
            }
        }
        templates
    }

    /// Whether any layer uses the modern argument format.
    pub fn has_modern_arguments(&self) -> bool {
        self.descriptors.iter().any(|d| d.has_modern_arguments())
    }
}
