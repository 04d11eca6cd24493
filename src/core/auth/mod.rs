// ─── Launch Identity ───
// The account data templated into a launch. Authentication itself lives
// outside this crate; it hands over a profile through `IdentityProvider`.

use serde::{Deserialize, Serialize};

const OFFLINE_UUID: &str = "00000000-0000-0000-0000-000000000000";
const OFFLINE_ACCESS_TOKEN: &str = "offline_access_token";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountMode {
    Offline,
    Microsoft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchAccountProfile {
    pub mode: AccountMode,
    pub username: String,
    pub uuid: String,
    pub access_token: String,
    pub user_type: String,
}

impl Default for LaunchAccountProfile {
    fn default() -> Self {
        Self::offline("Player")
    }
}

impl LaunchAccountProfile {
    pub fn offline(username: &str) -> Self {
        Self {
            mode: AccountMode::Offline,
            username: username.trim().to_string(),
            uuid: OFFLINE_UUID.into(),
            access_token: OFFLINE_ACCESS_TOKEN.into(),
            user_type: "legacy".into(),
        }
    }

    /// Fill blank fields with offline-safe defaults.
    pub fn sanitized(mut self) -> Self {
        if self.username.trim().is_empty() {
            self.username = "Player".into();
        }
        if self.uuid.trim().is_empty() {
            self.uuid = OFFLINE_UUID.into();
        }
        if self.access_token.trim().is_empty() {
            self.access_token = OFFLINE_ACCESS_TOKEN.into();
        }
        if self.user_type.trim().is_empty() {
            self.user_type = match self.mode {
                AccountMode::Offline => "legacy".into(),
                AccountMode::Microsoft => "msa".into(),
            };
        }
        self
    }
}

/// Source of the profile used for a launch.
pub trait IdentityProvider: Send + Sync {
    /// The authenticated profile, if any.
    fn active_profile(&self) -> Option<LaunchAccountProfile>;

    /// Username used when nobody is signed in.
    fn offline_username(&self) -> String {
        "Player".into()
    }

    /// Active profile, or an offline one built from the fallback username.
    fn launch_profile(&self) -> LaunchAccountProfile {
        self.active_profile()
            .unwrap_or_else(|| LaunchAccountProfile::offline(&self.offline_username()))
            .sanitized()
    }
}

/// Always offline, with a fixed username.
#[derive(Debug, Clone)]
pub struct OfflineIdentity {
    pub username: String,
}

impl OfflineIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl IdentityProvider for OfflineIdentity {
    fn active_profile(&self) -> Option<LaunchAccountProfile> {
        None
    }

    fn offline_username(&self) -> String {
        self.username.clone()
    }
}
