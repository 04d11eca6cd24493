// ─── Launch Command ───
// Pre-launch hooks and assembly of the final command line:
// `[shell prefix] java <jvm args> <main class> <program args>`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use super::classpath::safe_path_str;
use super::template::ArgumentTemplater;
use crate::core::error::LauncherResult;
use crate::core::instance::Instance;
use crate::core::version::{ArgumentTemplate, Rule, RuleAction};

/// Extra arguments gathered from pre-launch tasks before spawn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    pub extra_jvm_args: Vec<String>,
    pub extra_program_args: Vec<String>,
    /// Wrapper command placed in front of the java binary.
    pub shell_prefix: Vec<String>,
}

/// A hook run after preparation and before spawn.
#[async_trait]
pub trait PreLaunchTask: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, instance: &Instance, ctx: &mut LaunchContext) -> LauncherResult<()>;
}

/// Runs the game through a wrapper such as `gamemoderun` or `prime-run`.
#[derive(Debug, Clone)]
pub struct ShellPrefix {
    args: Vec<String>,
}

impl ShellPrefix {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PreLaunchTask for ShellPrefix {
    fn name(&self) -> &str {
        "shell-prefix"
    }

    async fn run(&self, _instance: &Instance, ctx: &mut LaunchContext) -> LauncherResult<()> {
        ctx.shell_prefix.extend(self.args.iter().cloned());
        Ok(())
    }
}

/// Heap bounds, always first on the JVM command line.
pub fn memory_templates() -> Vec<ArgumentTemplate> {
    vec![
        ArgumentTemplate::plain("-Xmx${max_memory}M"),
        ArgumentTemplate::plain("-Xms${min_memory}M"),
    ]
}

/// JVM arguments for chains that only use `minecraftArguments`.
pub fn legacy_jvm_templates() -> Vec<ArgumentTemplate> {
    vec![
        ArgumentTemplate::plain("-Djava.library.path=${natives_directory}"),
        ArgumentTemplate::plain("-Dminecraft.launcher.brand=${launcher_name}"),
        ArgumentTemplate::plain("-Dminecraft.launcher.version=${launcher_version}"),
        ArgumentTemplate::plain("-cp"),
        ArgumentTemplate::plain("${classpath}"),
    ]
}

/// Window size for legacy chains, which never gate it themselves.
pub fn legacy_resolution_templates() -> Vec<ArgumentTemplate> {
    let gate = vec![Rule {
        action: RuleAction::Allow,
        os: None,
        features: Some([("has_custom_resolution".to_string(), true)].into()),
    }];
    ["--width", "${resolution_width}", "--height", "${resolution_height}"]
        .into_iter()
        .map(|value| ArgumentTemplate::gated(value, gate.clone()))
        .collect()
}

/// The fully rendered command, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub natives_dir: PathBuf,
}

impl CommandLine {
    pub fn assemble(
        java: &Path,
        jvm_args: Vec<String>,
        main_class: &str,
        program_args: Vec<String>,
        ctx: &LaunchContext,
        working_dir: &Path,
        natives_dir: &Path,
    ) -> Self {
        let java = safe_path_str(java);
        let mut head = ctx.shell_prefix.clone();
        head.push(java);
        let program = head.remove(0);

        let mut args = head;
        args.extend(jvm_args);
        args.extend(ctx.extra_jvm_args.iter().cloned());
        args.push(main_class.to_string());
        args.extend(program_args);
        args.extend(ctx.extra_program_args.iter().cloned());

        Self {
            program,
            args,
            working_dir: working_dir.to_path_buf(),
            natives_dir: natives_dir.to_path_buf(),
        }
    }

    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        configure_native_library_env(&mut cmd, &self.natives_dir);
        configure_platform_spawn(&mut cmd);
        cmd
    }

    /// Shell-escaped single line, with every recorded secret masked.
    pub fn render_for_logs(&self, templater: &ArgumentTemplater) -> String {
        let line = std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| shell_escape(part))
            .collect::<Vec<_>>()
            .join(" ");
        templater.redact(&line)
    }
}

/// The instance's java binary when set and present, otherwise `fallback`.
pub fn resolve_java(instance: &Instance, fallback: &Path) -> PathBuf {
    match &instance.java_path {
        Some(path) if path.exists() => path.clone(),
        _ => fallback.to_path_buf(),
    }
}

fn configure_native_library_env(cmd: &mut tokio::process::Command, natives_dir: &Path) {
    let native_path = safe_path_str(natives_dir);
    let var = if cfg!(target_os = "windows") {
        "PATH"
    } else if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else {
        "LD_LIBRARY_PATH"
    };
    cmd.env(var, append_env_path(var, &native_path));
}

fn configure_platform_spawn(cmd: &mut tokio::process::Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
        cmd.env_remove("WT_SESSION");
        cmd.env_remove("TERM");
    }
    // The game leads its own process group so a stop also reaches whatever
    // a wrapper started.
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
}

fn append_env_path(var_name: &str, value: &str) -> String {
    let separator = if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    };
    match std::env::var(var_name) {
        Ok(existing) if !existing.trim().is_empty() => {
            format!("{}{}{}", value, separator, existing)
        }
        _ => value.to_string(),
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
