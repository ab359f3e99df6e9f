//! Page assembly: inline HTML fragments into page templates.
//!
//! Templates pull fragments in with line directives:
//!
//! ```text
//! <!--=include header.html -->
//! //=require scripts/*.html
//! ```
//!
//! `include` inserts the fragment every time, `require` at most once per page.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use regex::Regex;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::PipelineReport;
use crate::select::{pattern_in, read_string, select, write_file};

/// Resolves include directives against a set of fragment directories.
pub struct IncludeResolver {
    search_dirs: Vec<PathBuf>,
    directive: Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive {
    Include,
    Require,
}

/// Per-page expansion state.
#[derive(Default)]
struct Expansion {
    stack: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl IncludeResolver {
    /// Create a resolver searching `search_dirs` after the including file's directory.
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        let directive = Regex::new(
            r#"^([ \t]*)(?:<!--|//|#)\s*=\s*(include|require)\s+["']?([^"'\s]+?)["']?\s*(?:-->)?\s*$"#,
        )
        .expect("include directive pattern is valid");

        Self {
            search_dirs,
            directive,
        }
    }

    /// Expand every directive in `source`, which was read from `path`.
    pub fn expand(&self, path: &Path, source: &str) -> Result<String, PipelineError> {
        let mut state = Expansion::default();
        state.stack.push(canonical(path));
        self.expand_inner(path, source, &mut state)
    }

    fn expand_inner(
        &self,
        path: &Path,
        source: &str,
        state: &mut Expansion,
    ) -> Result<String, PipelineError> {
        let mut out = String::with_capacity(source.len());

        for line in source.split_inclusive('\n') {
            let body = line.trim_end_matches(['\n', '\r']);
            let Some(caps) = self.directive.captures(body) else {
                out.push_str(line);
                continue;
            };

            let indent = &caps[1];
            let kind = if &caps[2] == "require" {
                Directive::Require
            } else {
                Directive::Include
            };
            let target = &caps[3];

            for fragment in self.resolve(path, target)? {
                let key = canonical(&fragment);

                if state.stack.contains(&key) {
                    let chain = state
                        .stack
                        .iter()
                        .chain(std::iter::once(&key))
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    return Err(PipelineError::IncludeError {
                        path: path.display().to_string(),
                        message: format!("include cycle: {}", chain),
                    });
                }

                if kind == Directive::Require && state.seen.contains(&key) {
                    continue;
                }
                state.seen.insert(key.clone());

                let content = read_string(&fragment)?;
                state.stack.push(key);
                let expanded = self.expand_inner(&fragment, &content, state)?;
                state.stack.pop();

                for fragment_line in expanded.split_inclusive('\n') {
                    if !fragment_line.trim().is_empty() {
                        out.push_str(indent);
                    }
                    out.push_str(fragment_line);
                }
                if !expanded.ends_with('\n') && line.ends_with('\n') {
                    out.push('\n');
                }
            }
        }

        Ok(out)
    }

    /// Resolve a directive target to one or more fragment files.
    fn resolve(&self, from: &Path, target: &str) -> Result<Vec<PathBuf>, PipelineError> {
        let local = from.parent().map(Path::to_path_buf).unwrap_or_default();
        let is_glob = target.contains(['*', '?', '[']);

        for dir in std::iter::once(&local).chain(self.search_dirs.iter()) {
            if is_glob {
                let matches = select(&[pattern_in(dir, target)], &[])?;
                if !matches.is_empty() {
                    return Ok(matches);
                }
            } else {
                let candidate = dir.join(target);
                if candidate.is_file() {
                    return Ok(vec![candidate]);
                }
            }
        }

        Err(PipelineError::IncludeError {
            path: from.display().to_string(),
            message: format!("fragment not found: {}", target),
        })
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Assemble every page template into the app directory.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    let resolver = IncludeResolver::new(vec![config.components_dir.clone()]);
    let mut report = PipelineReport::default();

    for page in select(&[pattern_in(&config.pages_dir, "*.html")], &[])? {
        let source = read_string(&page)?;
        let html = resolver.expand(&page, &source)?;

        let Some(name) = page.file_name() else {
            continue;
        };
        let output = config.app_dir.join(name);
        write_file(&output, html)?;
        report.record(output);
    }

    tracing::info!("Assembled {} pages", report.written.len());
    Ok(report.finish(start))
}
