//! Image pipeline: AVIF conversion plus size optimization, skipping inputs
//! whose output is already up to date.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use rayon::prelude::*;
use regex::{Captures, Regex};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::PipelineReport;
use crate::select::{extension, is_newer, pattern_in, read_bytes, select, stem, write_file};

/// Extensions the raster codecs can decode.
const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// rav1e speed preset; 1 is slowest, 10 fastest.
const AVIF_SPEED: u8 = 6;

const JPEG_QUALITY: u8 = 80;

static SVG_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid svg comment pattern"));
/// A whole `<text>` element, or a tag end, each with the whitespace after it.
static SVG_GAP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<text\b.*?</text\s*>\s*|>\s+").expect("valid svg whitespace pattern")
});

/// Outcome of processing one input.
enum Outcome {
    Written(PathBuf),
    Skipped,
}

/// Run both passes over the image sources.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    let mut report = PipelineReport::default();

    report.merge(avif_pass(config)?);
    report.merge(optimize_pass(config)?);

    tracing::info!(
        "Processed images: {} written, {} up to date",
        report.written.len(),
        report.skipped
    );
    Ok(report.finish(start))
}

/// Convert every raster source to AVIF.
pub fn avif_pass(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let sources = select(
        &[pattern_in(&config.image_src_dir, "*.*")],
        &[pattern_in(&config.image_src_dir, "*.svg")],
    )?;

    let outcomes: Vec<Result<Outcome, PipelineError>> = sources
        .par_iter()
        .map(|source| {
            if !RASTER_EXTENSIONS.contains(&extension(source).as_str()) {
                tracing::warn!("Skipping AVIF conversion of {}", source.display());
                return Ok(Outcome::Skipped);
            }

            let dest = config.image_dir.join(format!("{}.avif", stem(source)));
            if !is_newer(source, &dest) {
                return Ok(Outcome::Skipped);
            }

            let image = decode(source)?;
            let bytes = encode_avif(&image, config.avif_quality)
                .map_err(|e| image_error(source, e))?;
            write_file(&dest, bytes)?;
            Ok(Outcome::Written(dest))
        })
        .collect();

    collect(outcomes)
}

/// Optimize every source, including SVG, into a same-named output.
pub fn optimize_pass(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let sources = select(&[pattern_in(&config.image_src_dir, "*.*")], &[])?;

    let outcomes: Vec<Result<Outcome, PipelineError>> = sources
        .par_iter()
        .map(|source| {
            let Some(name) = source.file_name() else {
                return Ok(Outcome::Skipped);
            };
            let dest = config.image_dir.join(name);
            if !is_newer(source, &dest) {
                return Ok(Outcome::Skipped);
            }

            let original = read_bytes(source)?;
            let optimized = optimize(source, &original)?;
            let bytes = match optimized {
                Some(smaller) if smaller.len() < original.len() => smaller,
                _ => original,
            };
            write_file(&dest, bytes)?;
            Ok(Outcome::Written(dest))
        })
        .collect();

    collect(outcomes)
}

fn collect(outcomes: Vec<Result<Outcome, PipelineError>>) -> Result<PipelineReport, PipelineError> {
    let mut report = PipelineReport::default();
    for outcome in outcomes {
        match outcome? {
            Outcome::Written(path) => report.record(path),
            Outcome::Skipped => report.skip(),
        }
    }
    Ok(report)
}

fn decode(path: &Path) -> Result<DynamicImage, PipelineError> {
    let bytes = read_bytes(path)?;
    image::load_from_memory(&bytes).map_err(|e| image_error(path, e))
}

fn image_error(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::ImageError {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Encode an image as AVIF at `quality`.
pub fn encode_avif(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let mut out = Vec::new();
    let encoder = AvifEncoder::new_with_speed_quality(&mut out, AVIF_SPEED, quality.clamp(1, 100));
    rgba.write_with_encoder(encoder)?;
    Ok(out)
}

/// Produce an optimized encoding of `bytes`, or `None` when the format is
/// passed through untouched.
fn optimize(path: &Path, bytes: &[u8]) -> Result<Option<Vec<u8>>, PipelineError> {
    match extension(path).as_str() {
        "png" => {
            let image = image::load_from_memory(bytes).map_err(|e| image_error(path, e))?;
            let mut out = Cursor::new(Vec::new());
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
            image
                .write_with_encoder(encoder)
                .map_err(|e| image_error(path, e))?;
            Ok(Some(out.into_inner()))
        }
        "jpg" | "jpeg" => {
            let image = image::load_from_memory(bytes).map_err(|e| image_error(path, e))?;
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            let mut out = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)
                .map_err(|e| image_error(path, e))?;
            Ok(Some(out))
        }
        "svg" => {
            let text = std::str::from_utf8(bytes).map_err(|e| image_error(path, e))?;
            Ok(Some(minify_svg(text).into_bytes()))
        }
        _ => Ok(None),
    }
}

/// Strip comments and inter-tag whitespace from SVG markup.
///
/// Whitespace inside `<text>` is rendered, so text elements are left as is.
pub fn minify_svg(svg: &str) -> String {
    let source = SVG_COMMENT.replace_all(svg, "");
    SVG_GAP
        .replace_all(&source, |caps: &Captures| {
            let found = &caps[0];
            let end = caps.get(0).map_or(source.len(), |m| m.end());
            let kept = found.trim_end();
            if kept.ends_with('>') && source[end..].starts_with('<') {
                kept.to_string()
            } else {
                found.to_string()
            }
        })
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn project() -> (tempfile::TempDir, PipelineConfig) {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());
        fs::create_dir_all(&config.image_src_dir).unwrap();
        (temp, config)
    }

    fn write_png(path: &Path) {
        let image = image::RgbaImage::from_fn(8, 8, |x, y| {
            image::Rgba([(x * 30) as u8, (y * 30) as u8, 128, 255])
        });
        image.save(path).unwrap();
    }

    fn backdate(path: &Path) {
        let past = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(past)
            .unwrap();
    }

    #[test]
    fn writes_avif_and_optimized_siblings() {
        let (_temp, config) = project();
        write_png(&config.image_src_dir.join("hero.png"));

        let report = run(&config).unwrap();

        assert!(config.image_dir.join("hero.avif").exists());
        assert!(config.image_dir.join("hero.png").exists());
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn svg_sources_skip_avif() {
        let (_temp, config) = project();
        fs::write(
            config.image_src_dir.join("icon.svg"),
            "<svg>\n  <!-- note -->\n  <path d=\"M0 0\"/>\n</svg>\n",
        )
        .unwrap();

        run(&config).unwrap();

        assert!(!config.image_dir.join("icon.avif").exists());
        assert_eq!(
            fs::read_to_string(config.image_dir.join("icon.svg")).unwrap(),
            "<svg><path d=\"M0 0\"/></svg>"
        );
    }

    #[test]
    fn svg_text_keeps_its_whitespace() {
        let svg = "<svg>\n  <g>\n    <text x=\"0\"><tspan>A</tspan> <tspan>B</tspan></text>\n  </g>\n</svg>";

        assert_eq!(
            minify_svg(svg),
            "<svg><g><text x=\"0\"><tspan>A</tspan> <tspan>B</tspan></text></g></svg>"
        );
    }

    #[test]
    fn up_to_date_outputs_are_not_rewritten() {
        let (_temp, config) = project();
        let source = config.image_src_dir.join("hero.png");
        write_png(&source);
        run(&config).unwrap();
        backdate(&source);

        let avif = config.image_dir.join("hero.avif");
        let before = fs::metadata(&avif).unwrap().modified().unwrap();

        let report = run(&config).unwrap();

        assert!(report.written.is_empty());
        assert_eq!(report.skipped, 2);
        assert_eq!(fs::metadata(&avif).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn passes_unknown_formats_through() {
        let (_temp, config) = project();
        fs::write(config.image_src_dir.join("notes.txt"), b"plain").unwrap();

        let report = run(&config).unwrap();

        assert_eq!(report.written, vec![config.image_dir.join("notes.txt")]);
        assert_eq!(
            fs::read(config.image_dir.join("notes.txt")).unwrap(),
            b"plain"
        );
    }

    #[test]
    fn corrupt_raster_fails_the_run() {
        let (_temp, config) = project();
        fs::write(config.image_src_dir.join("broken.png"), b"not a png").unwrap();

        let result = run(&config);

        assert!(matches!(result, Err(PipelineError::ImageError { .. })));
    }
}
