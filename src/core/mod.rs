// ─── InterfaceLaunch Core ───
// Launch preparation, process supervision and snapshot rollback.
//
// Architecture:
//   core/
//     version/   — Version descriptors, OS/feature rules, chain resolution
//     maven/     — Coordinate parsing and version ordering
//     launch/    — Collection, dedup, templating, natives, supervisor
//     assets/    — Fetcher seam for files needed before spawn
//     instance/  — Instance model + JSON persistence
//     auth/      — Account profile handed to templating
//     snapshot/  — Archive-before / restore-on-failure transactions
//     config     — Launcher settings and data layout

pub mod assets;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod instance;
pub mod launch;
pub mod maven;
pub mod snapshot;
pub mod version;
