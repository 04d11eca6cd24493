// ─── Argument Templater ───
// Substitutes `${token}` placeholders in JVM/program argument templates and
// masks secrets in anything rendered for logs.

use std::collections::HashMap;
use std::path::Path;

use tracing::error;

use super::classpath::{classpath_separator, safe_path_str};
use crate::core::auth::LaunchAccountProfile;
use crate::core::version::{rules_allow, ArgumentTemplate, RuleContext};

/// Replacement for every recorded secret in log output.
pub const SECRET_MASK: &str = "********";

/// Telemetry identifiers this launcher does not own. Always emptied, never
/// reported as unresolved.
pub const DENY_LISTED_PLACEHOLDERS: &[&str] = &["clientid", "auth_xuid"];

#[derive(Debug, Clone, Default)]
pub struct ArgumentTemplater {
    values: HashMap<String, String>,
    secrets: Vec<String>,
}

/// Output of a render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedArguments {
    pub args: Vec<String>,
    /// Placeholder names that had no value (deny-listed names excluded).
    pub unresolved: Vec<String>,
}

impl ArgumentTemplater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Like [`set`](Self::set), but the value is also recorded as a secret.
    pub fn set_secret(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        if !value.is_empty() && !self.secrets.contains(&value) {
            self.secrets.push(value.clone());
            // Longest first so a secret containing another is masked whole.
            self.secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
        }
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn secrets(&self) -> &[String] {
        &self.secrets
    }

    /// Gate every template against `ctx`, then substitute its placeholders.
    pub fn render(&self, templates: &[ArgumentTemplate], ctx: &RuleContext) -> RenderedArguments {
        let mut rendered = RenderedArguments::default();
        for template in templates {
            if !rules_allow(&template.rules, ctx) {
                continue;
            }
            let arg = self.substitute(&template.value, &mut rendered.unresolved);
            rendered.args.push(arg);
        }
        rendered
    }

    /// Replace every `${name}` in `raw`. Unknown names become empty strings;
    /// they are logged and pushed to `unresolved` unless deny-listed.
    pub fn substitute(&self, raw: &str, unresolved: &mut Vec<String>) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                // Unterminated: keep the tail verbatim.
                out.push_str(&rest[start..]);
                return out;
            };

            let name = &after[..end];
            match self.values.get(name) {
                Some(value) => out.push_str(value),
                None if DENY_LISTED_PLACEHOLDERS.contains(&name) => {}
                None => {
                    error!("Unresolved launch placeholder ${{{}}} in {:?}", name, self.redact(raw));
                    unresolved.push(name.to_string());
                }
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        out
    }

    /// Mask every verbatim occurrence of every recorded secret.
    pub fn redact(&self, text: &str) -> String {
        let mut redacted = text.to_string();
        for secret in &self.secrets {
            if redacted.contains(secret.as_str()) {
                redacted = redacted.replace(secret.as_str(), SECRET_MASK);
            }
        }
        redacted
    }
}

/// Runtime values for the standard placeholder set.
#[derive(Debug, Clone)]
pub struct LaunchValues<'a> {
    pub account: &'a LaunchAccountProfile,
    pub version_name: &'a str,
    pub version_type: &'a str,
    pub game_dir: &'a Path,
    pub assets_root: &'a Path,
    pub asset_index: Option<&'a str>,
    pub natives_dir: &'a Path,
    pub libraries_dir: &'a Path,
    pub classpath: &'a str,
    pub launcher_name: &'a str,
    pub launcher_version: &'a str,
    pub resolution: Option<(u32, u32)>,
    pub max_memory_mb: u32,
    pub min_memory_mb: u32,
}

impl ArgumentTemplater {
    /// Templater preloaded with the standard launch placeholders. The access
    /// token and session string are recorded as secrets.
    pub fn for_launch(values: &LaunchValues<'_>) -> Self {
        let mut t = Self::new();
        let account = values.account;
        let assets_root = safe_path_str(values.assets_root);

        t.set("auth_player_name", account.username.clone())
            .set("auth_uuid", account.uuid.clone())
            .set("user_type", account.user_type.clone())
            .set("user_properties", "{}")
            .set_secret("auth_access_token", account.access_token.clone())
            .set_secret(
                "auth_session",
                format!("token:{}:{}", account.access_token, account.uuid),
            )
            .set("version_name", values.version_name)
            .set("version_type", values.version_type)
            .set("game_directory", safe_path_str(values.game_dir))
            .set("assets_root", assets_root.clone())
            .set("game_assets", assets_root)
            .set("assets_index_name", values.asset_index.unwrap_or("legacy"))
            .set("natives_directory", safe_path_str(values.natives_dir))
            .set("library_directory", safe_path_str(values.libraries_dir))
            .set("classpath", values.classpath)
            .set("classpath_separator", classpath_separator())
            .set("launcher_name", values.launcher_name)
            .set("launcher_version", values.launcher_version)
            .set("max_memory", values.max_memory_mb.to_string())
            .set("min_memory", values.min_memory_mb.to_string());

        if let Some((width, height)) = values.resolution {
            t.set("resolution_width", width.to_string())
                .set("resolution_height", height.to_string());
        }

        t
    }
}
