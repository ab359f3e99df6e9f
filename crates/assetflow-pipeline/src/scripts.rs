//! Script pipeline: concatenate entries and minify with oxc.

use std::path::Path;
use std::time::Instant;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::PipelineReport;
use crate::select::{concat, extension, write_file};

/// Minify JavaScript source. `path` selects script or module parsing and
/// labels errors.
pub fn minify(source: &str, path: &Path) -> Result<String, PipelineError> {
    let allocator = Allocator::default();
    let source_type = match extension(path).as_str() {
        "mjs" => SourceType::mjs(),
        _ => SourceType::cjs(),
    };

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if let Some(err) = parsed.errors.first() {
        return Err(PipelineError::ScriptError {
            path: path.display().to_string(),
            message: err.to_string(),
        });
    }

    let mut program = parsed.program;
    let minified = Minifier::new(MinifierOptions::default()).build(&allocator, &mut program);

    let code = Codegen::new()
        .with_options(CodegenOptions::minify())
        .with_scoping(minified.scoping)
        .build(&program)
        .code;

    Ok(code)
}

/// Concatenate, minify and write the script bundle.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    let source = concat(&config.script_entries)?;

    let output = config.script_output_path();
    let code = minify(&source, &output)?;
    write_file(&output, code)?;

    let mut report = PipelineReport::default();
    report.record(output);
    tracing::info!("Minified {}", config.script_output);
    Ok(report.finish(start))
}
