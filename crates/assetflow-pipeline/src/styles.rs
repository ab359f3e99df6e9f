//! Stylesheet pipeline: SCSS entries to one prefixed, minified CSS file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::PipelineReport;
use crate::select::{concat, write_file};

/// Compile the configured entries to the final CSS text.
pub fn compile(config: &PipelineConfig) -> Result<String, PipelineError> {
    let source = concat(&config.style_entries)?;

    let load_paths: Vec<PathBuf> = config
        .style_entries
        .iter()
        .filter_map(|entry| entry.parent().map(Path::to_path_buf))
        .collect();

    let css = compile_scss(source, &load_paths)?;
    prefix_and_minify(&css, &config.browsers)
}

/// Compile SCSS source to plain CSS with grass.
pub fn compile_scss(source: String, load_paths: &[PathBuf]) -> Result<String, PipelineError> {
    let mut options = grass::Options::default().style(grass::OutputStyle::Expanded);
    for path in load_paths {
        options = options.load_path(path);
    }

    grass::from_string(source, &options)
        .map_err(|e| PipelineError::StyleError(format!("SCSS compile error: {}", e)))
}

/// Resolve browserslist queries to lightningcss targets.
pub fn targets_for(browsers: &[String]) -> Result<Targets, PipelineError> {
    if browsers.is_empty() {
        return Ok(Targets::default());
    }

    let resolved = Browsers::from_browserslist(browsers.iter().map(String::as_str))
        .map_err(|e| PipelineError::StyleError(format!("Invalid browserslist query: {}", e)))?;

    Ok(Targets {
        browsers: resolved,
        ..Targets::default()
    })
}

/// Add vendor prefixes for `browsers` and minify using lightningcss.
pub fn prefix_and_minify(css: &str, browsers: &[String]) -> Result<String, PipelineError> {
    let targets = targets_for(browsers)?;

    let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|e| PipelineError::StyleError(format!("CSS parse error: {}", e)))?;

    stylesheet
        .minify(MinifyOptions {
            targets: targets.clone(),
            ..Default::default()
        })
        .map_err(|e| PipelineError::StyleError(format!("CSS minify error: {}", e)))?;

    let minified = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            ..Default::default()
        })
        .map_err(|e| PipelineError::StyleError(format!("CSS print error: {}", e)))?;

    Ok(minified.code)
}

/// Compile and write the stylesheet.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    let css = compile(config)?;

    let output = config.style_output_path();
    write_file(&output, css)?;

    let mut report = PipelineReport::default();
    report.record(output);
    tracing::info!("Compiled {}", config.style_output);
    Ok(report.finish(start))
}
