//!  Storage is organized through [activity_log::ActivityLogImpl] and
//!  [session_store::JsonSessionStore].
//!  The basic idea is:
//!   - There is a directory with one activity file per local calendar day.
//!   - Raw samples are appended as records with a repeat count and the file
//!     is periodically compacted by the merge engine.
//!   - Tracked sessions live in a single sessions file next to it.

pub mod activity_log;
pub mod entities;
pub mod merge;
pub mod session_store;
