mod common;

use std::sync::Arc;

use common::{base_with_assets, drain, forge_child, legacy_base, observe, Fixture};
use interface_launch::core::auth::{AccountMode, LaunchAccountProfile};
use interface_launch::core::launch::{LaunchEvent, ShellPrefix, TerminalReason};
use interface_launch::{cancellation_token, IdentityProvider, InstanceStore, LauncherError, Phase};

struct SignedIn;

impl IdentityProvider for SignedIn {
    fn active_profile(&self) -> Option<LaunchAccountProfile> {
        Some(LaunchAccountProfile {
            mode: AccountMode::Microsoft,
            username: "Alex".into(),
            uuid: "1234".into(),
            access_token: "tok-very-secret-123".into(),
            user_type: "msa".into(),
        })
    }
}

fn terminal(events: &[LaunchEvent]) -> Vec<&interface_launch::core::launch::TerminalEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            LaunchEvent::Terminal(t) => Some(t),
            _ => None,
        })
        .collect()
}

fn log_text(events: &[LaunchEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            LaunchEvent::Log(batch) => Some(batch.lines.iter().map(|l| l.text.clone())),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Wraps the java command in `sh -c <script>`; the script ignores the
/// remaining arguments.
fn run_script(script: &str) -> Arc<ShellPrefix> {
    Arc::new(ShellPrefix::new(["/bin/sh", "-c", script, "sh"]))
}

#[tokio::test]
async fn test_missing_version_returns_to_not_started() {
    let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.7.10").await;
    let supervisor = fx.supervisor();

    let result = supervisor.launch(&fx.instance.id, &cancellation_token()).await;

    assert!(matches!(result, Err(LauncherError::MissingVersion(ref id)) if id == "1.7.10"));
    assert_eq!(supervisor.phase(), Phase::NotStarted);
    assert!(supervisor.resolved_chain().is_none());
}

#[tokio::test]
async fn test_cancelled_token_aborts_preparation() {
    let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
    let supervisor = fx.supervisor();
    let cancel = cancellation_token();
    cancel.store(true, std::sync::atomic::Ordering::SeqCst);

    let result = supervisor.launch(&fx.instance.id, &cancel).await;

    assert!(matches!(result, Err(LauncherError::Cancelled)));
    assert_eq!(supervisor.phase(), Phase::NotStarted);
}

#[tokio::test]
async fn test_unknown_instance_is_reported() {
    let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
    let supervisor = fx.supervisor();

    let result = supervisor.launch("no-such-instance", &cancellation_token()).await;

    assert!(matches!(result, Err(LauncherError::InstanceNotFound(_))));
    assert_eq!(supervisor.phase(), Phase::NotStarted);
}

#[tokio::test]
async fn test_missing_library_fails_before_spawn() {
    let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
    std::fs::remove_file(
        fx.config
            .libraries_dir()
            .join("com/google/guava/guava/32.1.2-jre/guava-32.1.2-jre.jar"),
    )
    .unwrap();
    let supervisor = fx.supervisor();

    let result = supervisor.launch(&fx.instance.id, &cancellation_token()).await;

    assert!(matches!(result, Err(LauncherError::Preparation(_))));
    assert_eq!(supervisor.phase(), Phase::NotStarted);
    assert!(supervisor.resolved_chain().is_some());
}

#[tokio::test]
async fn test_missing_asset_object_fails_preparation() {
    let fx = Fixture::new(vec![base_with_assets("1.21", "17")], "1.21").await;
    fx.write_asset_index("17", false);
    let supervisor = fx.supervisor();

    let result = supervisor.launch(&fx.instance.id, &cancellation_token()).await;

    assert!(matches!(result, Err(LauncherError::Preparation(ref m)) if m.contains("objects")));
    assert_eq!(supervisor.phase(), Phase::NotStarted);
}

#[tokio::test]
async fn test_missing_asset_index_fails_preparation() {
    let fx = Fixture::new(vec![base_with_assets("1.21", "17")], "1.21").await;
    let supervisor = fx.supervisor();

    let result = supervisor.launch(&fx.instance.id, &cancellation_token()).await;

    assert!(matches!(result, Err(LauncherError::Preparation(ref m)) if m.contains("indexes")));
}

#[tokio::test]
async fn test_reset_deletes_directories_registered_before_launch() {
    let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
    let supervisor = fx.supervisor();
    let scratch = fx.path().join("scratch");
    std::fs::create_dir_all(scratch.join("nested")).unwrap();
    supervisor.register_ephemeral_dir(scratch.clone());

    supervisor.reset().unwrap();

    assert!(!scratch.exists());
    assert_eq!(supervisor.phase(), Phase::NotStarted);
}

#[cfg(unix)]
mod process {
    use super::*;

    #[tokio::test]
    async fn test_clean_exit_reports_stopped_with_output() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let supervisor = fx.supervisor();
        let mut rx = observe(&supervisor);
        supervisor.add_pre_launch_task(run_script("echo hello; echo oops >&2"));

        let session = supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        assert!(session.pid.is_some());
        assert!(session.command_line.contains("net.minecraft.client.main.Main"));

        assert_eq!(supervisor.wait_for_exit().await, Phase::Stopped);
        let events = drain(&mut rx);

        let ends = terminal(&events);
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].reason, TerminalReason::Stopped);
        assert_eq!(ends[0].exit_code, Some(0));
        assert!(matches!(events.last(), Some(LaunchEvent::Terminal(_))));

        let lines = log_text(&events);
        assert!(lines.contains(&"hello".to_string()));
        assert!(lines.contains(&"oops".to_string()));

        let steps: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                LaunchEvent::Status(s) => Some(s.step_index),
                _ => None,
            })
            .collect();
        assert_eq!(steps.first(), Some(&1));
        assert!(steps.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(steps.last(), Some(&6));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_errored() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let supervisor = fx.supervisor();
        let mut rx = observe(&supervisor);
        supervisor.add_pre_launch_task(run_script("exit 3"));

        supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();

        assert_eq!(supervisor.wait_for_exit().await, Phase::Errored);
        let events = drain(&mut rx);
        let ends = terminal(&events);
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].reason, TerminalReason::Errored);
        assert_eq!(ends[0].exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_force_stop_kills_and_reports_stopped() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let supervisor = fx.supervisor();
        let mut rx = observe(&supervisor);
        supervisor.add_pre_launch_task(run_script("exec sleep 30"));

        supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        assert_eq!(supervisor.phase(), Phase::Started);

        let again = supervisor.launch(&fx.instance.id, &cancellation_token()).await;
        assert!(matches!(
            again,
            Err(LauncherError::IllegalState {
                phase: Phase::Started,
                ..
            })
        ));
        assert!(supervisor.reset().is_err());

        supervisor.force_stop();
        supervisor.force_stop();

        let phase = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            supervisor.wait_for_exit(),
        )
        .await
        .unwrap();
        assert_eq!(phase, Phase::Stopped);

        let events = drain(&mut rx);
        let ends = terminal(&events);
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].reason, TerminalReason::Stopped);
    }

    #[tokio::test]
    async fn test_exit_path_runs_callbacks_then_removes_natives() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let supervisor = fx.supervisor();
        supervisor.add_pre_launch_task(run_script("exit 0"));

        let extra = fx.path().join("scratch");
        std::fs::create_dir_all(&extra).unwrap();
        supervisor.register_ephemeral_dir(extra.clone());

        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let natives_root = fx.config.natives_dir();
        supervisor.add_exit_callback(move |code| {
            let natives_present = std::fs::read_dir(&natives_root)
                .map(|mut d| d.next().is_some())
                .unwrap_or(false);
            seen_tx.send((code, natives_present)).unwrap();
            Ok(())
        });

        let session = supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        assert!(session.natives_dir.starts_with(fx.config.natives_dir()));

        assert_eq!(supervisor.wait_for_exit().await, Phase::Stopped);
        let (code, natives_present) = seen_rx.recv().unwrap();
        assert_eq!(code, Some(0));
        assert!(natives_present, "callbacks run before ephemeral cleanup");
        assert!(!session.natives_dir.exists());
        assert!(!extra.exists());
    }

    #[tokio::test]
    async fn test_missing_wrapper_reports_launch_failed() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let supervisor = fx.supervisor();
        let mut rx = observe(&supervisor);
        supervisor.add_pre_launch_task(Arc::new(ShellPrefix::new([fx
            .path()
            .join("no-such-wrapper")
            .to_string_lossy()
            .into_owned()])));

        let result = supervisor.launch(&fx.instance.id, &cancellation_token()).await;

        assert!(matches!(result, Err(LauncherError::Spawn(_))));
        assert_eq!(supervisor.phase(), Phase::Errored);
        let events = drain(&mut rx);
        let ends = terminal(&events);
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].reason, TerminalReason::LaunchFailed);
        assert!(std::fs::read_dir(fx.config.natives_dir()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_reset_allows_relaunch_and_drops_tasks() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let supervisor = fx.supervisor();
        let mut rx = observe(&supervisor);
        supervisor.add_pre_launch_task(run_script("exit 0"));

        supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        supervisor.wait_for_exit().await;
        supervisor.reset().unwrap();
        assert_eq!(supervisor.phase(), Phase::NotStarted);
        assert!(supervisor.resolved_chain().is_none());
        drain(&mut rx);

        supervisor.add_pre_launch_task(run_script("exit 5"));
        supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        assert_eq!(supervisor.wait_for_exit().await, Phase::Errored);

        // Observers survive a reset.
        let events = drain(&mut rx);
        assert_eq!(terminal(&events)[0].exit_code, Some(5));
    }

    #[tokio::test]
    async fn test_launch_records_last_played() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        assert!(fx.instance.last_played.is_none());
        let supervisor = fx.supervisor();
        supervisor.add_pre_launch_task(run_script("exit 0"));

        supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        supervisor.wait_for_exit().await;

        let stored = fx.store.load(&fx.instance.id).await.unwrap();
        assert!(stored.last_played.is_some());
    }

    #[tokio::test]
    async fn test_command_line_masks_access_token() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let supervisor = fx.supervisor_with(Arc::new(SignedIn));
        supervisor.add_pre_launch_task(run_script("exit 0"));

        let session = supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        supervisor.wait_for_exit().await;

        assert!(!session.command_line.contains("tok-very-secret-123"));
        assert!(session.command_line.contains("--accessToken"));
        assert!(session.command_line.contains("Alex"));
    }

    #[tokio::test]
    async fn test_loader_chain_keeps_lowest_library_version() {
        let fx = Fixture::new(
            vec![
                legacy_base("1.20.1"),
                forge_child("1.20.1-forge-47.2.0", "1.20.1"),
            ],
            "1.20.1-forge-47.2.0",
        )
        .await;
        let supervisor = fx.supervisor();
        supervisor.add_pre_launch_task(run_script("exit 0"));

        let session = supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        supervisor.wait_for_exit().await;

        let chain = supervisor.resolved_chain().unwrap();
        assert_eq!(chain.ids(), vec!["1.20.1", "1.20.1-forge-47.2.0"]);
        assert!(session.command_line.contains("guava-31.1-jre.jar"));
        assert!(!session.command_line.contains("guava-32.1.2-jre.jar"));
        assert!(session.command_line.contains("fmlloader-1.20.1-47.2.0.jar"));
        assert!(session
            .command_line
            .contains("cpw.mods.bootstraplauncher.BootstrapLauncher"));
    }

    #[tokio::test]
    async fn test_launch_with_assets_passes_index_name() {
        let fx = Fixture::new(vec![base_with_assets("1.21", "17")], "1.21").await;
        fx.write_asset_index("17", true);
        let supervisor = fx.supervisor();
        supervisor.add_pre_launch_task(run_script("exit 0"));

        let session = supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        assert_eq!(supervisor.wait_for_exit().await, Phase::Stopped);
        assert!(session.command_line.contains("--assetIndex 17"));
    }

    #[tokio::test]
    async fn test_failing_exit_callback_does_not_block_cleanup() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let supervisor = fx.supervisor();
        let mut rx = observe(&supervisor);
        supervisor.add_pre_launch_task(run_script("exit 0"));

        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        supervisor.add_exit_callback(|_| Err(LauncherError::Runtime("callback broke".into())));
        supervisor.add_exit_callback(move |code| {
            seen_tx.send(code).unwrap();
            Ok(())
        });

        let session = supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        assert_eq!(supervisor.wait_for_exit().await, Phase::Stopped);

        assert_eq!(seen_rx.recv().unwrap(), Some(0));
        assert!(!session.natives_dir.exists());
        let events = drain(&mut rx);
        let ends = terminal(&events);
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].reason, TerminalReason::Stopped);
    }

    #[tokio::test]
    async fn test_background_descendant_does_not_hold_session_open() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let supervisor = fx.supervisor();
        let mut rx = observe(&supervisor);
        supervisor.add_pre_launch_task(run_script("echo started; sleep 5 & exit 0"));

        let started = std::time::Instant::now();
        supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();
        let phase = tokio::time::timeout(
            std::time::Duration::from_secs(4),
            supervisor.wait_for_exit(),
        )
        .await
        .unwrap();

        assert_eq!(phase, Phase::Stopped);
        assert!(started.elapsed() < std::time::Duration::from_secs(3));
        let events = drain(&mut rx);
        assert!(log_text(&events).contains(&"started".to_string()));
        assert!(matches!(events.last(), Some(LaunchEvent::Terminal(_))));
    }

    #[cfg(target_os = "linux")]
    fn process_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            // State is the first field after the parenthesised command name.
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .map(|state| state != "Z")
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_force_stop_reaches_processes_started_by_a_wrapper() {
        let fx = Fixture::new(vec![legacy_base("1.8.9")], "1.8.9").await;
        let pid_file = fx.path().join("game.pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
        let supervisor = fx.supervisor();
        supervisor.add_pre_launch_task(run_script(&script));

        supervisor
            .launch(&fx.instance.id, &cancellation_token())
            .await
            .unwrap();

        let mut game_pid = None;
        for _ in 0..100 {
            if let Some(pid) = std::fs::read_to_string(&pid_file)
                .ok()
                .and_then(|raw| raw.trim().parse::<u32>().ok())
            {
                game_pid = Some(pid);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let game_pid = game_pid.expect("wrapper wrote the game pid");
        assert!(process_alive(game_pid));

        let started = std::time::Instant::now();
        supervisor.force_stop();
        let phase = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            supervisor.wait_for_exit(),
        )
        .await
        .unwrap();
        assert_eq!(phase, Phase::Stopped);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        let mut alive = true;
        for _ in 0..50 {
            alive = process_alive(game_pid);
            if !alive {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(!alive, "process started by the wrapper survived the stop");
    }
}
