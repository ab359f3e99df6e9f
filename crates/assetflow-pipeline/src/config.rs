//! Pipeline configuration.

use std::path::{Path, PathBuf};

/// Paths and options shared by every pipeline.
///
/// `Default` reproduces the conventional `app/` layout relative to the current
/// directory; [`PipelineConfig::with_root`] rebases the same layout onto another
/// project root.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Working tree served by the dev server and read by the packager
    pub app_dir: PathBuf,

    /// Distribution root written by the packager
    pub dist_dir: PathBuf,

    /// Page templates (`*.html`)
    pub pages_dir: PathBuf,

    /// Fragment directory searched by include directives
    pub components_dir: PathBuf,

    /// Font sources
    pub font_src_dir: PathBuf,

    /// Converted fonts
    pub font_dir: PathBuf,

    /// Image and icon sources
    pub image_src_dir: PathBuf,

    /// Processed images and the sprite
    pub image_dir: PathBuf,

    /// Stylesheet entries, concatenated in order
    pub style_entries: Vec<PathBuf>,

    /// Compiled stylesheet directory
    pub css_dir: PathBuf,

    /// Compiled stylesheet file name
    pub style_output: String,

    /// Browserslist queries used for vendor prefixing
    pub browsers: Vec<String>,

    /// Script entries, concatenated in order
    pub script_entries: Vec<PathBuf>,

    /// Minified script directory
    pub js_dir: PathBuf,

    /// Minified script file name
    pub script_output: String,

    /// AVIF encoder quality (1-100)
    pub avif_quality: u8,

    /// Sprite file name, written into `image_dir`
    pub sprite_name: String,

    /// Emit an HTML usage page next to the sprite
    pub sprite_example: bool,
}

impl PipelineConfig {
    /// Build the conventional layout under `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::with_dirs(root.join("app"), root.join("dist"))
    }

    /// Build the conventional layout inside `app`, packaging into `dist`.
    pub fn with_dirs(app: impl Into<PathBuf>, dist: impl Into<PathBuf>) -> Self {
        let app: PathBuf = app.into();

        Self {
            dist_dir: dist.into(),
            pages_dir: app.join("pages"),
            components_dir: app.join("components"),
            font_src_dir: app.join("fonts").join("src"),
            font_dir: app.join("fonts"),
            image_src_dir: app.join("images").join("src"),
            image_dir: app.join("images"),
            style_entries: vec![app.join("scss").join("style.scss")],
            css_dir: app.join("css"),
            style_output: "style.min.css".to_string(),
            browsers: vec!["last 10 versions".to_string()],
            script_entries: vec![app.join("js").join("main.js")],
            js_dir: app.join("js"),
            script_output: "main.min.js".to_string(),
            avif_quality: 50,
            sprite_name: "sprite.svg".to_string(),
            sprite_example: true,
            app_dir: app,
        }
    }

    /// Path of the compiled stylesheet.
    pub fn style_output_path(&self) -> PathBuf {
        self.css_dir.join(&self.style_output)
    }

    /// Path of the minified script.
    pub fn script_output_path(&self) -> PathBuf {
        self.js_dir.join(&self.script_output)
    }

    /// Path of the generated sprite.
    pub fn sprite_path(&self) -> PathBuf {
        self.image_dir.join(&self.sprite_name)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_root("")
    }
}
