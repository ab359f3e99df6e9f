//! File watching: route changed paths to pipeline re-runs or raw reloads.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::{MatchOptions, Pattern};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::mpsc as async_mpsc;

use assetflow_pipeline::select::pattern_in;
use assetflow_pipeline::{PipelineConfig, TaskName};

/// What a change should trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    /// Re-run a pipeline, then notify browsers
    Run(TaskName),

    /// Reload browsers without rebuilding
    Reload,
}

/// A coalesced change, ready to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub action: WatchAction,
    /// First path that triggered the action in this batch
    pub path: PathBuf,
}

struct WatchRule {
    patterns: Vec<Pattern>,
    action: WatchAction,
}

/// Ordered glob rules; the first matching rule wins.
pub struct WatchRules {
    rules: Vec<WatchRule>,
}

impl WatchRules {
    /// The standard rules for a project layout.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let exact = |path: &Path| Pattern::new(&Pattern::escape(&absolute(path).to_string_lossy()));
        let within = |dir: &Path, glob: &str| Pattern::new(&pattern_in(&absolute(dir), glob));

        let rules = vec![
            WatchRule {
                patterns: config.style_entries.iter().filter_map(|p| exact(p.as_path()).ok()).collect(),
                action: WatchAction::Run(TaskName::Styles),
            },
            WatchRule {
                patterns: config.script_entries.iter().filter_map(|p| exact(p.as_path()).ok()).collect(),
                action: WatchAction::Run(TaskName::Scripts),
            },
            WatchRule {
                patterns: [&config.components_dir, &config.pages_dir]
                    .into_iter()
                    .filter_map(|dir| within(dir.as_path(), "*").ok())
                    .collect(),
                action: WatchAction::Run(TaskName::Pages),
            },
            WatchRule {
                patterns: within(config.app_dir.as_path(), "*.html").into_iter().collect(),
                action: WatchAction::Reload,
            },
        ];

        Self { rules }
    }

    /// Action for a changed path, if any rule matches.
    pub fn classify(&self, path: &Path) -> Option<WatchAction> {
        let path = absolute(path);
        let options = MatchOptions {
            require_literal_separator: true,
            ..Default::default()
        };
        self.rules
            .iter()
            .find(|rule| {
                rule.patterns
                    .iter()
                    .any(|p| p.matches_path_with(&path, options))
            })
            .map(|rule| rule.action)
    }
}

/// Resolve a path to an absolute one, following symlinks when it exists so
/// it compares equal to the paths the OS reports.
fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| {
            // Not created yet: canonicalize the parent and re-attach the name.
            let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
            match (parent.map(fs::canonicalize), path.file_name()) {
                (Some(Ok(dir)), Some(name)) => Ok(dir.join(name)),
                _ => std::path::absolute(path),
            }
        })
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Pending actions in one settle window, one per action.
#[derive(Debug, Default)]
pub struct EventBatch {
    events: Vec<WatchEvent>,
}

impl EventBatch {
    pub fn push(&mut self, action: WatchAction, path: PathBuf) {
        if !self.events.iter().any(|e| e.action == action) {
            self.events.push(WatchEvent { action, path });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<WatchEvent> {
        std::mem::take(&mut self.events)
    }
}

/// File watcher for detecting changes.
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl FileWatcher {
    /// Watch `paths` recursively, classifying changes with `rules`.
    ///
    /// Changes are debounced per path over `settle`, and each delivery yields
    /// at most one event per action. A path that keeps changing is still
    /// flushed once per `settle`.
    pub fn new(
        paths: &[PathBuf],
        rules: WatchRules,
        settle: Duration,
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (tx, rx) = async_mpsc::channel(100);

        let mut debouncer = new_debouncer(settle, move |res: DebounceEventResult| {
            let events = match res {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!("Watch error: {}", e);
                    return;
                }
            };

            let mut batch = EventBatch::default();
            for event in events {
                if let Some(action) = rules.classify(&event.path) {
                    batch.push(action, event.path);
                }
            }
            for event in batch.drain() {
                if tx.blocking_send(event).is_err() {
                    return;
                }
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                debouncer
                    .watcher()
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
            } else {
                tracing::warn!("Not watching missing path {}", path.display());
            }
        }

        Ok((Self { _debouncer: debouncer }, rx))
    }
}
