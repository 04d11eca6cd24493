mod artifact;
mod version;

pub use artifact::MavenArtifact;
pub use version::compare_versions;

/// Default repository for vanilla libraries.
pub const MOJANG_LIBRARIES: &str = "https://libraries.minecraft.net";
