//! Glob selection and output routing shared by the pipelines.

use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::PipelineError;

/// Join a glob fragment onto a literal directory, escaping the directory part.
pub fn pattern_in(dir: &Path, pattern: &str) -> String {
    let dir = dir.to_string_lossy();
    if dir.is_empty() {
        pattern.to_string()
    } else {
        format!("{}/{}", Pattern::escape(dir.trim_end_matches('/')), pattern)
    }
}

/// Select files matching any of `includes` and none of `excludes`.
///
/// The result is sorted and free of duplicates so pipelines process inputs in
/// a stable order.
pub fn select(includes: &[String], excludes: &[String]) -> Result<Vec<PathBuf>, PipelineError> {
    let excludes = excludes
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| PipelineError::GlobError {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..Default::default()
    };

    let mut files = Vec::new();
    for pattern in includes {
        let paths = glob::glob_with(pattern, options).map_err(|e| PipelineError::GlobError {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        for path in paths {
            let path = path.map_err(|e| PipelineError::read(e.path(), e.error()))?;
            if !path.is_file() {
                continue;
            }
            if excludes.iter().any(|ex| ex.matches_path(&path)) {
                continue;
            }
            files.push(path);
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Select files from an ordered glob list where a `!`-prefixed glob removes
/// matches of the globs before it, and a later positive glob can add them back.
pub fn select_ordered(globs: &[String]) -> Result<Vec<PathBuf>, PipelineError> {
    let mut selected: Vec<PathBuf> = Vec::new();

    for glob in globs {
        if let Some(negated) = glob.strip_prefix('!') {
            let pattern = Pattern::new(negated).map_err(|e| PipelineError::GlobError {
                pattern: glob.clone(),
                message: e.to_string(),
            })?;
            selected.retain(|path| !pattern.matches_path(path));
        } else {
            selected.extend(select(std::slice::from_ref(glob), &[])?);
        }
    }

    selected.sort();
    selected.dedup();
    Ok(selected)
}

/// Whether `source` should be processed into `dest`.
///
/// True when `dest` is missing or was modified before `source`.
pub fn is_newer(source: &Path, dest: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified());

    match (modified(source), modified(dest)) {
        (Ok(src), Ok(dst)) => src > dst,
        (_, Err(_)) => true,
        (Err(_), Ok(_)) => false,
    }
}

/// File stem as an owned string.
pub fn stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Lowercased file extension.
pub fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn read_bytes(path: &Path) -> Result<Vec<u8>, PipelineError> {
    fs::read(path).map_err(|e| PipelineError::read(path, e))
}

pub fn read_string(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|e| PipelineError::read(path, e))
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::write(parent, e))?;
        }
    }
    fs::write(path, contents).map_err(|e| PipelineError::write(path, e))
}

/// Concatenate entry files with a newline separator.
pub fn concat(entries: &[PathBuf]) -> Result<String, PipelineError> {
    let mut out = String::new();
    for entry in entries {
        if !entry.is_file() {
            return Err(PipelineError::MissingInput(entry.display().to_string()));
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&read_string(entry)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn selects_with_exclusions() {
        let temp = tempdir().unwrap();
        for name in ["a.png", "b.jpg", "c.svg", ".hidden.png"] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }
        fs::create_dir(temp.path().join("sub.png")).unwrap();

        let files = select(
            &[pattern_in(temp.path(), "*.*")],
            &[pattern_in(temp.path(), "*.svg")],
        )
        .unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.png", "b.jpg"]);
    }

    #[test]
    fn deduplicates_overlapping_patterns() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("sprite.svg"), b"<svg/>").unwrap();

        let files = select(
            &[
                pattern_in(temp.path(), "*.svg"),
                pattern_in(temp.path(), "sprite.svg"),
            ],
            &[],
        )
        .unwrap();

        assert_eq!(files.len(), 1);
    }

    #[test]
    fn later_globs_re_include_negated_matches() {
        let temp = tempdir().unwrap();
        for name in ["photo.png", "logo.svg", "sprite.svg"] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }

        let files = select_ordered(&[
            pattern_in(temp.path(), "*.*"),
            format!("!{}", pattern_in(temp.path(), "*.svg")),
            pattern_in(temp.path(), "sprite.svg"),
        ])
        .unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["photo.png", "sprite.svg"]);
    }

    #[test]
    fn newer_compares_modification_times() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src.png");
        let dest = temp.path().join("dest.png");
        fs::write(&src, b"src").unwrap();

        assert!(is_newer(&src, &dest), "missing destination is stale");

        fs::write(&dest, b"dest").unwrap();
        let past = SystemTime::now() - Duration::from_secs(60);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(past)
            .unwrap();
        assert!(!is_newer(&src, &dest));

        let future = SystemTime::now() + Duration::from_secs(60);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(future)
            .unwrap();
        assert!(is_newer(&src, &dest));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directories_are_errors() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("a.png"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not stop a privileged user.
        let readable = fs::read_dir(&locked).is_ok();
        let result = select(&[pattern_in(temp.path(), "**/*.png")], &[]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }

        match result {
            Err(PipelineError::ReadError { path, .. }) => assert!(path.ends_with("locked")),
            other => panic!("expected a read error, got {:?}", other),
        }
    }

    #[test]
    fn concat_fails_on_missing_entry() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope.js");

        let result = concat(&[missing]);

        assert!(matches!(result, Err(PipelineError::MissingInput(_))));
    }
}
