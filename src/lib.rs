pub mod core;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

pub use crate::core::assets::{AssetFetcher, HttpFetcher, LocalFileCheck};
pub use crate::core::auth::{IdentityProvider, LaunchAccountProfile, OfflineIdentity};
pub use crate::core::config::LauncherConfig;
pub use crate::core::error::{ErrorCategory, LauncherError, LauncherResult};
pub use crate::core::instance::{Instance, InstanceStore, JsonInstanceStore};
pub use crate::core::launch::{
    cancellation_token, CancellationToken, LaunchObserver, LaunchServices, LaunchSession, Phase,
    ProcessSupervisor,
};
pub use crate::core::snapshot::{SnapshotRecord, SnapshotStore};
pub use crate::core::version::{LocalFirstVersionIndex, ManifestResolver, VersionIndex};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter. Calling it twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,interface_launch=debug")),
        )
        .try_init();
}

/// Production wiring: versions from disk with a remote manifest fallback,
/// files over HTTP, instances as JSON under the data directory.
pub fn default_services(
    config: &LauncherConfig,
    identity: Arc<dyn IdentityProvider>,
) -> LauncherResult<LaunchServices> {
    let user_agent = crate::core::http::user_agent(&config.launcher_name, &config.launcher_version);
    let client = crate::core::http::build_http_client(&user_agent)?;

    let versions = LocalFirstVersionIndex::new(config.versions_dir())
        .with_remote(client.clone(), config.version_manifest_url.clone());

    Ok(LaunchServices {
        versions: Arc::new(versions),
        fetcher: Arc::new(HttpFetcher::new(client)),
        identity,
        instances: Arc::new(JsonInstanceStore::new(config.instances_dir())),
    })
}
