//! Named tasks and their composition.
//!
//! Leaf tasks map onto a pipeline (or onto the watcher, which lives in the
//! server crate); `build` and `default` are composites of leaves.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::PipelineReport;
use crate::{fonts, images, package, pages, scripts, sprite, styles};

/// Every task name the runner knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskName {
    Pages,
    Fonts,
    Styles,
    Sprite,
    Images,
    Scripts,
    Watching,
    Building,
    CleanDist,
    Build,
    Default,
}

/// A synchronous pipeline entry point.
pub type PipelineFn = fn(&PipelineConfig) -> Result<PipelineReport, PipelineError>;

impl TaskName {
    pub const ALL: [TaskName; 11] = [
        TaskName::Pages,
        TaskName::Fonts,
        TaskName::Styles,
        TaskName::Sprite,
        TaskName::Images,
        TaskName::Scripts,
        TaskName::Watching,
        TaskName::Building,
        TaskName::CleanDist,
        TaskName::Build,
        TaskName::Default,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskName::Pages => "pages",
            TaskName::Fonts => "fonts",
            TaskName::Styles => "styles",
            TaskName::Sprite => "sprite",
            TaskName::Images => "images",
            TaskName::Scripts => "scripts",
            TaskName::Watching => "watching",
            TaskName::Building => "building",
            TaskName::CleanDist => "clean-dist",
            TaskName::Build => "build",
            TaskName::Default => "default",
        }
    }

    /// The pipeline behind a leaf task. `None` for the watcher and composites.
    pub fn pipeline(self) -> Option<PipelineFn> {
        let run: PipelineFn = match self {
            TaskName::Pages => pages::run,
            TaskName::Fonts => fonts::run,
            TaskName::Styles => styles::run,
            TaskName::Sprite => sprite::run,
            TaskName::Images => images::run,
            TaskName::Scripts => scripts::run,
            TaskName::Building => package::run,
            TaskName::CleanDist => package::clean,
            TaskName::Watching | TaskName::Build | TaskName::Default => return None,
        };
        Some(run)
    }

    /// Expand a name into its task graph.
    pub fn graph(self) -> Task {
        match self {
            TaskName::Build => Task::Series(vec![
                Task::Run(TaskName::Building),
                Task::Run(TaskName::CleanDist),
                Task::Run(TaskName::Building),
            ]),
            TaskName::Default => Task::Parallel(vec![
                Task::Run(TaskName::Styles),
                Task::Run(TaskName::Scripts),
                Task::Run(TaskName::Pages),
                Task::Run(TaskName::Watching),
            ]),
            leaf => Task::Run(leaf),
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for names that are not tasks.
#[derive(Debug, thiserror::Error)]
#[error("Unknown task '{0}'")]
pub struct UnknownTask(pub String);

impl FromStr for TaskName {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownTask(s.to_string()))
    }
}

/// Errors surfaced by the task runner.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task '{task}' failed: {source}")]
    Pipeline {
        task: TaskName,
        #[source]
        source: PipelineError,
    },

    #[error("Task '{task}' failed: {message}")]
    Failed { task: TaskName, message: String },

    #[error("Task join error: {0}")]
    Join(String),
}

/// A composable unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Run(TaskName),
    Series(Vec<Task>),
    Parallel(Vec<Task>),
}

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

/// Executes leaf tasks on behalf of the runner.
pub trait TaskHandler: Send + Sync + 'static {
    fn run(&self, task: TaskName) -> TaskFuture;
}

impl Task {
    /// Execute the graph.
    ///
    /// `Series` stops at the first failure. `Parallel` starts every child at
    /// once, completes when all have completed, and on the first failure aborts
    /// the remaining children and returns that failure.
    pub fn execute(self, handler: Arc<dyn TaskHandler>) -> TaskFuture {
        Box::pin(async move {
            match self {
                Task::Run(name) => {
                    tracing::info!("Starting '{}'...", name);
                    let start = Instant::now();
                    let result = handler.run(name).await;
                    match &result {
                        Ok(()) => tracing::info!(
                            "Finished '{}' after {} ms",
                            name,
                            start.elapsed().as_millis()
                        ),
                        Err(e) => tracing::error!(
                            "'{}' errored after {} ms: {}",
                            name,
                            start.elapsed().as_millis(),
                            e
                        ),
                    }
                    result
                }
                Task::Series(tasks) => {
                    for task in tasks {
                        task.execute(Arc::clone(&handler)).await?;
                    }
                    Ok(())
                }
                Task::Parallel(tasks) => {
                    let mut set = JoinSet::new();
                    for task in tasks {
                        set.spawn(task.execute(Arc::clone(&handler)));
                    }

                    while let Some(joined) = set.join_next().await {
                        let result = joined
                            .map_err(|e| TaskError::Join(e.to_string()))
                            .and_then(|r| r);
                        if let Err(e) = result {
                            set.shutdown().await;
                            return Err(e);
                        }
                    }
                    Ok(())
                }
            }
        })
    }
}

/// Run a leaf pipeline on the blocking pool.
pub async fn run_blocking(
    task: TaskName,
    config: Arc<PipelineConfig>,
) -> Result<PipelineReport, TaskError> {
    let Some(pipeline) = task.pipeline() else {
        return Err(TaskError::Failed {
            task,
            message: "not a pipeline task".to_string(),
        });
    };

    tokio::task::spawn_blocking(move || pipeline(&config))
        .await
        .map_err(|e| TaskError::Join(e.to_string()))?
        .map_err(|source| TaskError::Pipeline { task, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// Records every leaf it runs; fails on `fail`.
    struct Recorder {
        log: Mutex<Vec<TaskName>>,
        fail: Option<TaskName>,
        barrier: Option<Arc<Barrier>>,
    }

    impl Recorder {
        fn new(fail: Option<TaskName>, barrier: Option<Arc<Barrier>>) -> Arc<Self> {
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
                fail,
                barrier,
            })
        }

        fn log(&self) -> Vec<TaskName> {
            self.log.lock().unwrap().clone()
        }
    }

    impl TaskHandler for Recorder {
        fn run(&self, task: TaskName) -> TaskFuture {
            self.log.lock().unwrap().push(task);
            let fail = self.fail == Some(task);
            let barrier = self.barrier.clone();
            Box::pin(async move {
                if let Some(barrier) = barrier {
                    barrier.wait().await;
                }
                if fail {
                    Err(TaskError::Failed {
                        task,
                        message: "boom".to_string(),
                    })
                } else {
                    Ok(())
                }
            })
        }
    }

    #[test]
    fn names_round_trip() {
        for name in TaskName::ALL {
            assert_eq!(name.as_str().parse::<TaskName>().unwrap(), name);
        }
        assert!("bundle".parse::<TaskName>().is_err());
    }

    #[test]
    fn composites_have_no_pipeline() {
        assert!(TaskName::Build.pipeline().is_none());
        assert!(TaskName::Default.pipeline().is_none());
        assert!(TaskName::Watching.pipeline().is_none());
        assert!(TaskName::Styles.pipeline().is_some());
    }

    #[tokio::test]
    async fn build_runs_package_clean_package_in_order() {
        let recorder = Recorder::new(None, None);

        TaskName::Build
            .graph()
            .execute(recorder.clone())
            .await
            .unwrap();

        assert_eq!(
            recorder.log(),
            vec![TaskName::Building, TaskName::CleanDist, TaskName::Building]
        );
    }

    #[tokio::test]
    async fn series_stops_at_first_failure() {
        let recorder = Recorder::new(Some(TaskName::CleanDist), None);

        let result = TaskName::Build.graph().execute(recorder.clone()).await;

        assert!(matches!(result, Err(TaskError::Failed { task: TaskName::CleanDist, .. })));
        assert_eq!(recorder.log(), vec![TaskName::Building, TaskName::CleanDist]);
    }

    #[tokio::test]
    async fn parallel_children_run_concurrently() {
        // Each child waits until all three have started; sequential execution
        // would never get past the first.
        let barrier = Arc::new(Barrier::new(3));
        let recorder = Recorder::new(None, Some(barrier));
        let task = Task::Parallel(vec![
            Task::Run(TaskName::Styles),
            Task::Run(TaskName::Scripts),
            Task::Run(TaskName::Pages),
        ]);

        let result = tokio::time::timeout(Duration::from_secs(5), task.execute(recorder.clone()))
            .await
            .expect("parallel tasks deadlocked");

        assert!(result.is_ok());
        let mut log = recorder.log();
        log.sort_by_key(|t| t.as_str());
        assert_eq!(log, vec![TaskName::Pages, TaskName::Scripts, TaskName::Styles]);
    }

    #[tokio::test]
    async fn parallel_reports_a_failing_child() {
        let recorder = Recorder::new(Some(TaskName::Scripts), None);
        let task = Task::Parallel(vec![
            Task::Run(TaskName::Styles),
            Task::Run(TaskName::Scripts),
        ]);

        let result = task.execute(recorder).await;

        assert!(matches!(result, Err(TaskError::Failed { task: TaskName::Scripts, .. })));
    }

    /// Fails `fail` at once; every other leaf sleeps, then marks itself done.
    struct SlowSiblings {
        fail: TaskName,
        done: Arc<Mutex<Vec<TaskName>>>,
    }

    impl TaskHandler for SlowSiblings {
        fn run(&self, task: TaskName) -> TaskFuture {
            let fail = task == self.fail;
            let done = Arc::clone(&self.done);
            Box::pin(async move {
                if fail {
                    return Err(TaskError::Failed {
                        task,
                        message: "boom".to_string(),
                    });
                }
                tokio::time::sleep(Duration::from_millis(300)).await;
                done.lock().unwrap().push(task);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn parallel_failure_aborts_running_siblings() {
        let done = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(SlowSiblings {
            fail: TaskName::Scripts,
            done: Arc::clone(&done),
        });
        let task = Task::Parallel(vec![
            Task::Run(TaskName::Styles),
            Task::Run(TaskName::Scripts),
            Task::Run(TaskName::Pages),
        ]);

        let result = tokio::time::timeout(Duration::from_millis(200), task.execute(handler))
            .await
            .expect("parallel waited for its siblings after a failure");
        assert!(matches!(result, Err(TaskError::Failed { task: TaskName::Scripts, .. })));

        // Past the point where the siblings would have finished.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(done.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_blocking_executes_pipelines() {
        let temp = tempfile::tempdir().unwrap();
        let config = Arc::new(PipelineConfig::with_root(temp.path()));

        let report = run_blocking(TaskName::CleanDist, config.clone()).await.unwrap();
        assert!(report.written.is_empty());

        let err = run_blocking(TaskName::Styles, config).await.unwrap_err();
        assert!(matches!(err, TaskError::Pipeline { task: TaskName::Styles, .. }));
    }
}
