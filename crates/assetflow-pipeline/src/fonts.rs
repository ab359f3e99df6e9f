//! Font pipeline: sources to WOFF + TTF, then every TTF to WOFF2.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use read_fonts::{FontRef, ReadError, TableProvider};
use ttf2woff2::BrotliQuality;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::PipelineReport;
use crate::select::{pattern_in, read_bytes, select, stem, write_file};

/// Container format, from the first four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFormat {
    /// sfnt with TrueType outlines (`0x00010000` or `true`)
    TrueType,
    /// sfnt with CFF outlines (`OTTO`)
    OpenType,
    Woff,
    Woff2,
    Collection,
    Unknown,
}

pub fn detect(bytes: &[u8]) -> FontFormat {
    match bytes.get(..4) {
        Some([0x00, 0x01, 0x00, 0x00]) | Some(b"true") => FontFormat::TrueType,
        Some(b"OTTO") => FontFormat::OpenType,
        Some(b"wOFF") => FontFormat::Woff,
        Some(b"wOF2") => FontFormat::Woff2,
        Some(b"ttcf") => FontFormat::Collection,
        _ => FontFormat::Unknown,
    }
}

/// Errors from reading or converting a font.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("Invalid font: {0}")]
    Invalid(#[from] ReadError),

    #[error("Truncated font: {0}")]
    Truncated(String),

    #[error("Unsupported font: {0}")]
    Unsupported(String),

    #[error("WOFF {0} failed")]
    Woff(&'static str),

    #[error("WOFF2 encoding failed: {0}")]
    Woff2(#[from] ttf2woff2::Error),
}

/// WOFF 1.0 header length.
const WOFF_HEADER_LEN: usize = 44;

/// Load any accepted font container as checked sfnt bytes.
pub fn load(bytes: &[u8]) -> Result<Vec<u8>, FontError> {
    let sfnt = match detect(bytes) {
        FontFormat::TrueType | FontFormat::OpenType => bytes.to_vec(),
        FontFormat::Woff => {
            check_woff_header(bytes)?;
            woff::version1::decompress(bytes).ok_or(FontError::Woff("decoding"))?
        }
        FontFormat::Woff2 => return Err(FontError::Unsupported("WOFF2 input".to_string())),
        FontFormat::Collection => {
            return Err(FontError::Unsupported("font collection".to_string()))
        }
        FontFormat::Unknown => {
            return Err(FontError::Unsupported("unrecognized signature".to_string()))
        }
    };

    revision(&sfnt)?;
    Ok(sfnt)
}

/// The WOFF decoder trusts its header, so check it before handing bytes over.
fn check_woff_header(bytes: &[u8]) -> Result<(), FontError> {
    let header = bytes
        .get(..WOFF_HEADER_LEN)
        .ok_or_else(|| FontError::Truncated("WOFF header".to_string()))?;
    let length = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if length != bytes.len() {
        return Err(FontError::Truncated(format!(
            "WOFF header declares {} bytes, file has {}",
            length,
            bytes.len()
        )));
    }
    Ok(())
}

/// Validate the table directory and return `head.fontRevision` as (major, minor),
/// with minor in thousandths.
pub fn revision(sfnt: &[u8]) -> Result<(usize, usize), FontError> {
    let font = FontRef::new(sfnt)?;

    for record in font.table_directory.table_records() {
        let end = record.offset() as usize + record.length() as usize;
        if end > sfnt.len() {
            return Err(FontError::Truncated(format!("table '{}'", record.tag())));
        }
    }

    let bits = font.head()?.font_revision().to_bits();
    let major = (bits >> 16).max(0) as usize;
    let minor = (((bits & 0xFFFF) as usize) * 1000 + 0x8000) >> 16;
    Ok((major, minor))
}

/// Wrap sfnt bytes in a WOFF 1.0 container.
pub fn encode_woff(sfnt: &[u8]) -> Result<Vec<u8>, FontError> {
    let (major, minor) = revision(sfnt)?;
    woff::version1::compress(sfnt, major, minor).ok_or(FontError::Woff("encoding"))
}

/// Encode TrueType sfnt bytes as WOFF2 with the glyf/loca transform.
pub fn encode_woff2(sfnt: &[u8]) -> Result<Vec<u8>, FontError> {
    Ok(ttf2woff2::encode(sfnt, BrotliQuality::default())?)
}

fn font_error(path: &Path, err: FontError) -> PipelineError {
    PipelineError::FontError {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Run both font steps.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    let mut report = PipelineReport::default();

    report.merge(convert_sources(config)?);
    report.merge(convert_woff2(config)?);

    tracing::info!("Converted fonts: {} files written", report.written.len());
    Ok(report.finish(start))
}

/// Step 1: every source font to `<stem>.woff` and `<stem>.ttf`.
pub fn convert_sources(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let sources = select(&[pattern_in(&config.font_src_dir, "*.*")], &[])?;

    let written: Vec<Result<Vec<PathBuf>, PipelineError>> = sources
        .par_iter()
        .map(|source| {
            let sfnt = load(&read_bytes(source)?).map_err(|e| font_error(source, e))?;
            let name = stem(source);

            let woff_path = config.font_dir.join(format!("{}.woff", name));
            let woff = encode_woff(&sfnt).map_err(|e| font_error(source, e))?;
            write_file(&woff_path, woff)?;

            let ttf_path = config.font_dir.join(format!("{}.ttf", name));
            write_file(&ttf_path, sfnt)?;

            Ok(vec![woff_path, ttf_path])
        })
        .collect();

    let mut report = PipelineReport::default();
    for paths in written {
        for path in paths? {
            report.record(path);
        }
    }
    Ok(report)
}

/// Step 2: every `*.ttf` in the font directory to `<stem>.woff2`.
///
/// CFF-flavoured files are skipped with a warning; the WOFF2 encoder only
/// takes TrueType outlines.
pub fn convert_woff2(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let sources = select(&[pattern_in(&config.font_dir, "*.ttf")], &[])?;

    let written: Vec<Result<Option<PathBuf>, PipelineError>> = sources
        .par_iter()
        .map(|source| {
            let sfnt = load(&read_bytes(source)?).map_err(|e| font_error(source, e))?;
            if detect(&sfnt) == FontFormat::OpenType {
                tracing::warn!("Skipping {}: CFF outlines have no WOFF2 encoder", source.display());
                return Ok(None);
            }

            let dest = config.font_dir.join(format!("{}.woff2", stem(source)));
            let bytes = encode_woff2(&sfnt).map_err(|e| font_error(source, e))?;
            write_file(&dest, bytes)?;
            Ok(Some(dest))
        })
        .collect();

    let mut report = PipelineReport::default();
    for path in written {
        match path? {
            Some(path) => report.record(path),
            None => report.skip(),
        }
    }
    Ok(report)
}
