// ─── Library Collector ───
// Gathers the libraries of a resolved chain that apply to the current
// platform, most specific layer first.

use std::path::PathBuf;

use tracing::debug;

use crate::core::error::LauncherResult;
use crate::core::maven::{MavenArtifact, MOJANG_LIBRARIES};
use crate::core::version::{ResolvedChain, RuleContext};

/// A library that passed its rules, ready for dedup / classpath / extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedLibrary {
    /// Coordinate; for natives this carries the resolved native classifier.
    pub artifact: MavenArtifact,
    /// Set when the library is a native bundle for this OS. Such libraries
    /// never go on the classpath.
    pub native_classifier: Option<String>,
    /// Path relative to the libraries root.
    pub path: PathBuf,
    pub url: Option<String>,
    pub sha1: Option<String>,
    /// Archive prefixes skipped during native extraction.
    pub extract_exclude: Vec<String>,
    /// Id of the descriptor that declared the library.
    pub declared_by: String,
}

impl CollectedLibrary {
    pub fn is_native(&self) -> bool {
        self.native_classifier.is_some()
    }
}

/// Walk the chain leaf-first and emit every library allowed by its rules.
///
/// The output is not deduplicated.
pub fn collect_libraries(
    chain: &ResolvedChain,
    ctx: &RuleContext,
) -> LauncherResult<Vec<CollectedLibrary>> {
    let mut collected = Vec::new();

    for descriptor in chain.descriptors().iter().rev() {
        for entry in &descriptor.libraries {
            if !entry.is_allowed(ctx) {
                debug!("Skipping library (rules): {}", entry.name);
                continue;
            }

            let base = entry.coordinate()?;
            let native_classifier = entry.native_classifier(ctx);
            let artifact = match &native_classifier {
                Some(classifier) => base.with_classifier(classifier),
                None => base,
            };

            let download = entry.download_for(native_classifier.as_deref());
            let path = download
                .and_then(|d| d.path.as_deref())
                .map(PathBuf::from)
                .unwrap_or_else(|| artifact.local_path());
            let url = download.and_then(|d| d.url.clone()).or_else(|| {
                let repo = entry.url.as_deref().unwrap_or(MOJANG_LIBRARIES);
                Some(artifact.url(repo))
            });

            collected.push(CollectedLibrary {
                artifact,
                native_classifier,
                path,
                url,
                sha1: download.and_then(|d| d.sha1.clone()),
                extract_exclude: entry.extract_excludes().to_vec(),
                declared_by: descriptor.id.clone(),
            });
        }
    }

    debug!(
        "Collected {} libraries ({} natives) across {} descriptors",
        collected.len(),
        collected.iter().filter(|l| l.is_native()).count(),
        chain.len()
    );
    Ok(collected)
}
