//! Debugger attach: session tracking, the attach routine, application
//! watches and `tye` debug configurations.

pub mod attach;
pub mod configuration;
pub mod session;
pub mod tracker;
pub mod watcher;

pub use attach::{Attacher, HostDebugger};
pub use configuration::{
    resolve_debug_configuration, AttachedReplica, DebugContext, ResolvedDebugSession,
    TyeDebugConfiguration,
};
pub use session::{AttachRequest, DebugSessionInfo, RequestMode};
pub use tracker::DebugSessionTracker;
pub use watcher::{ApplicationWatcher, WatchOptions};
