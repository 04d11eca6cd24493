pub mod descriptor;
pub mod index;
pub mod resolver;
pub mod rules;

pub use descriptor::{
    ArgumentTemplate, ArgumentValue, Arguments, AssetIndexInfo, DownloadArtifact, ExtractRules,
    LibraryArtifact, LibraryDownloads, LibraryEntry, VersionDescriptor, VersionDownloads,
};
pub use index::{LocalFirstVersionIndex, MapVersionIndex, VersionIndex, VersionManifest};
pub use resolver::{ManifestResolver, ResolvedChain};
pub use rules::{current_os_name, rules_allow, OsRule, Rule, RuleAction, RuleContext};
