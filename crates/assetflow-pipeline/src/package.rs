//! Distribution packaging: copy the allow-listed artifacts into `dist`.

use std::fs;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::PipelineReport;
use crate::select::{pattern_in, select_ordered};

/// Ordered allow-list of artifact globs. Raw SVGs are dropped, then the
/// generated sprite is added back.
pub fn distribution_globs(config: &PipelineConfig) -> Vec<String> {
    let exact = |path: std::path::PathBuf| glob::Pattern::escape(&path.to_string_lossy());

    vec![
        exact(config.style_output_path()),
        pattern_in(&config.image_dir, "*.*"),
        format!("!{}", pattern_in(&config.image_dir, "*.svg")),
        exact(config.sprite_path()),
        pattern_in(&config.font_dir, "*.*"),
        exact(config.script_output_path()),
        pattern_in(&config.app_dir, "**/*.html"),
    ]
}

/// Copy every allow-listed artifact into the distribution root, keeping its
/// path relative to the app directory.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    let mut report = PipelineReport::default();

    for source in select_ordered(&distribution_globs(config))? {
        let Ok(relative) = source.strip_prefix(&config.app_dir) else {
            tracing::warn!("Skipping {}: outside {}", source.display(), config.app_dir.display());
            continue;
        };

        let dest = config.dist_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::write(parent, e))?;
        }
        fs::copy(&source, &dest).map_err(|e| PipelineError::write(&dest, e))?;
        report.record(dest);
    }

    tracing::info!(
        "Packaged {} files into {}",
        report.written.len(),
        config.dist_dir.display()
    );
    Ok(report.finish(start))
}

/// Remove the distribution root. A missing root is not an error.
pub fn clean(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let start = Instant::now();

    if config.dist_dir.exists() {
        fs::remove_dir_all(&config.dist_dir)
            .map_err(|e| PipelineError::write(&config.dist_dir, e))?;
        tracing::info!("Removed {}", config.dist_dir.display());
    }

    Ok(PipelineReport::default().finish(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;
    use walkdir::WalkDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, path.to_string_lossy().as_bytes()).unwrap();
    }

    fn populated() -> (tempfile::TempDir, PipelineConfig) {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());
        let app = &config.app_dir;

        for file in [
            "index.html",
            "pages/index.html",
            "css/style.min.css",
            "css/debug.css",
            "images/hero.png",
            "images/hero.avif",
            "images/logo.svg",
            "images/sprite.svg",
            "images/src/raw.png",
            "fonts/Inter.woff2",
            "fonts/src/Inter.ttf",
            "js/main.min.js",
            "js/main.js",
            "scss/style.scss",
        ] {
            touch(&app.join(file));
        }
        (temp, config)
    }

    fn dist_files(config: &PipelineConfig) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&config.dist_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(&config.dist_dir).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn copies_exactly_the_allow_list() {
        let (_temp, config) = populated();

        run(&config).unwrap();

        let expected: Vec<PathBuf> = [
            "css/style.min.css",
            "fonts/Inter.woff2",
            "images/hero.avif",
            "images/hero.png",
            "images/sprite.svg",
            "index.html",
            "js/main.min.js",
            "pages/index.html",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(dist_files(&config), expected);
    }

    #[test]
    fn preserves_contents() {
        let (_temp, config) = populated();

        run(&config).unwrap();

        let copied = fs::read_to_string(config.dist_dir.join("css/style.min.css")).unwrap();
        assert!(copied.ends_with("css/style.min.css"));
    }

    #[test]
    fn clean_removes_stale_files() {
        let (_temp, config) = populated();
        touch(&config.dist_dir.join("old/stale.html"));

        clean(&config).unwrap();
        run(&config).unwrap();

        assert!(!config.dist_dir.join("old").exists());
    }

    #[test]
    fn clean_tolerates_missing_dist() {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());

        assert!(clean(&config).is_ok());
    }
}
