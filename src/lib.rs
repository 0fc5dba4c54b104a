//! Focus-aware activity tracker: a daemon samples the foreground window on
//! a fixed interval, folds the samples into compact per-day records, and
//! during a focus session holds them against the user's block lists,
//! prompting before distractions take over. The cli drives the daemon and
//! tracked sessions from a terminal.

pub mod cli;
pub mod daemon;
pub mod fs;
pub mod sampling;
pub mod settings;
pub mod utils;
