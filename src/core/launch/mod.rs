pub mod classpath;
pub mod collector;
pub mod command;
pub mod dedup;
pub mod events;
pub mod natives;
pub mod supervisor;
pub mod template;

pub use classpath::{build_classpath, classpath_separator, game_jar_path, join_classpath};
pub use collector::{collect_libraries, CollectedLibrary};
pub use command::{CommandLine, LaunchContext, PreLaunchTask, ShellPrefix};
pub use dedup::{default_dedup_rules, DedupOutcome, DedupRule, LibraryDeduplicator};
pub use events::{
    ChannelObserver, LaunchEvent, LaunchObserver, LogBatch, LogLine, OutputStream,
    ProgressThrottle, StatusEvent, TerminalEvent, TerminalReason,
};
pub use natives::{reap_orphaned, NativesExtractor, SessionMarker};
pub use supervisor::{
    cancellation_token, CancellationToken, ExitCallback, LaunchServices, LaunchSession, Phase,
    ProcessSupervisor,
};
pub use template::{ArgumentTemplater, LaunchValues, RenderedArguments};
