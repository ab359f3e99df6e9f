//! Named task execution.

use std::sync::Arc;

use anyhow::Result;
use assetflow_pipeline::{run_blocking, PipelineConfig, TaskError, TaskFuture, TaskHandler, TaskName};
use assetflow_server::{DevServer, DevServerConfig};

use super::config::Settings;

/// Runs leaf tasks: pipelines on the blocking pool, `watching` on the dev server.
struct Dispatcher {
    pipeline: Arc<PipelineConfig>,
    server: DevServerConfig,
}

impl TaskHandler for Dispatcher {
    fn run(&self, task: TaskName) -> TaskFuture {
        let pipeline = Arc::clone(&self.pipeline);

        if task == TaskName::Watching {
            let server = DevServer::new(self.server.clone(), pipeline);
            return Box::pin(async move {
                server.start().await.map_err(|e| TaskError::Failed {
                    task,
                    message: e.to_string(),
                })
            });
        }

        Box::pin(async move {
            let report = run_blocking(task, pipeline).await?;
            tracing::debug!(
                "'{}' wrote {} files, skipped {}",
                task,
                report.written.len(),
                report.skipped
            );
            Ok(())
        })
    }
}

/// Run a named task and everything it expands to.
pub async fn run(task: TaskName, settings: Settings) -> Result<()> {
    let dispatcher = Dispatcher {
        pipeline: Arc::new(settings.pipeline),
        server: settings.server,
    };

    task.graph().execute(Arc::new(dispatcher)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn settings(root: &Path) -> Settings {
        Settings {
            pipeline: PipelineConfig::with_root(root),
            server: DevServerConfig::default(),
        }
    }

    #[tokio::test]
    async fn build_replaces_stale_distribution() {
        let temp = tempfile::tempdir().unwrap();
        let settings = settings(temp.path());
        let app = settings.pipeline.app_dir.clone();
        let dist = settings.pipeline.dist_dir.clone();

        touch(&app.join("index.html"), "<html></html>");
        touch(&app.join("css/style.min.css"), "a{color:red}");
        touch(&app.join("js/main.min.js"), "console.log(1)");
        touch(&app.join("images/photo.avif"), "avif");
        touch(&app.join("images/logo.svg"), "<svg/>");
        touch(&app.join("images/sprite.svg"), "<svg/>");
        touch(&app.join("scss/style.scss"), "a { color: red; }");
        touch(&dist.join("stale.txt"), "old");

        run(TaskName::Build, settings).await.unwrap();

        assert!(dist.join("index.html").exists());
        assert!(dist.join("css/style.min.css").exists());
        assert!(dist.join("js/main.min.js").exists());
        assert!(dist.join("images/photo.avif").exists());
        assert!(dist.join("images/sprite.svg").exists());
        assert!(!dist.join("images/logo.svg").exists());
        assert!(!dist.join("scss/style.scss").exists());
        assert!(!dist.join("stale.txt").exists());
    }

    #[tokio::test]
    async fn failing_pipeline_fails_the_task() {
        let temp = tempfile::tempdir().unwrap();

        let result = run(TaskName::Scripts, settings(temp.path())).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn scripts_task_writes_minified_output() {
        let temp = tempfile::tempdir().unwrap();
        let settings = settings(temp.path());
        let output = settings.pipeline.script_output_path();
        let source = "function greet(name) {\n  return 'hello ' + name;\n}\n\nconsole.log(greet('you'));\n";
        touch(&settings.pipeline.script_entries[0], source);

        run(TaskName::Scripts, settings).await.unwrap();

        let minified = fs::read_to_string(output).unwrap();
        assert!(minified.contains("hello"));
        assert!(minified.len() < source.len());
    }
}
