//! Preview server for the distribution tree.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use assetflow_pipeline::select::{pattern_in, select};
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

/// Page served with a 404 status for unknown paths, when the site has one.
const NOT_FOUND_PAGE: &str = "404.html";

/// What a built distribution holds.
#[derive(Debug)]
struct Distribution {
    files: usize,
    has_index: bool,
    not_found: Option<PathBuf>,
}

/// Check that `dir` is a non-empty distribution.
fn inspect(dir: &Path) -> Result<Distribution> {
    if !dir.is_dir() {
        anyhow::bail!(
            "Directory not found: {}. Run 'assetflow build' first.",
            dir.display()
        );
    }

    let files = select(&[pattern_in(dir, "**/*")], &[])
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    if files.is_empty() {
        anyhow::bail!("{} is empty. Run 'assetflow build' first.", dir.display());
    }

    let not_found = dir.join(NOT_FOUND_PAGE);
    Ok(Distribution {
        files: files.len(),
        has_index: dir.join("index.html").is_file(),
        not_found: not_found.is_file().then_some(not_found),
    })
}

fn router(dir: &Path, dist: &Distribution) -> Router {
    let files = ServeDir::new(dir);
    match &dist.not_found {
        Some(page) => Router::new().fallback_service(files.not_found_service(ServeFile::new(page))),
        None => Router::new().fallback_service(files),
    }
}

/// Run the serve command.
pub async fn run(port: u16, dir: PathBuf, open: bool) -> Result<()> {
    let dist = inspect(&dir)?;
    if !dist.has_index {
        tracing::warn!("{} has no index.html", dir.display());
    }

    let addr: SocketAddr = format!("127.0.0.1:{}", port)
        .parse()
        .context("Invalid address")?;

    tracing::info!(
        "Previewing {} ({} files) at http://{}",
        dir.display(),
        dist.files,
        addr
    );

    let app = router(&dir, &dist);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    if open {
        let _ = open::that(format!("http://{}", addr));
    }

    axum::serve(listener, app).await?;

    Ok(())
}
