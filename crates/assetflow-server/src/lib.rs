//! Development server with live reload for assetflow.
//!
//! Serves the app directory, re-runs pipelines when their sources change, and
//! pushes reload messages to connected browsers over a WebSocket.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::{EventBatch, FileWatcher, WatchAction, WatchEvent, WatchRules};
pub use websocket::{ReloadHub, ReloadMessage};
