//! SVG stack sprite builder.
//!
//! Every icon becomes a nested `<svg>` with an `id` equal to its file stem. A
//! `:target` rule in the root shows only the referenced icon, so
//! `sprite.svg#home` can be used directly as an image source.
//!
//! Ids inside an icon are prefixed with the icon id, along with every
//! `url(#…)`, `href="#…"` and `xlink:href="#…"` that points at them, so two
//! icons exporting the same gradient id do not collide in one document.

use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use minijinja::{context, Environment};
use regex::{Captures, Regex};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::PipelineReport;
use crate::select::{pattern_in, read_string, select, stem, write_file};

/// Root attributes carried over onto each stacked icon.
const KEPT_ATTRIBUTES: &[&str] = &["viewBox", "width", "height", "preserveAspectRatio", "fill"];

const STACK_STYLE: &str = ":root>svg{display:none}:root>svg:target{display:block}";

/// An icon extracted from a source SVG.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Icon {
    /// Fragment identifier within the sprite
    pub id: String,
    /// Root attributes kept on the nested `<svg>`
    pub attributes: Vec<(String, String)>,
    /// Markup inside the root element
    pub content: String,
}

/// Parses icon sources and renders stack sprites.
pub struct SpriteBuilder {
    root: Regex,
    attribute: Regex,
    comment: Regex,
    inner_id: Regex,
    url_ref: Regex,
    href_ref: Regex,
}

impl SpriteBuilder {
    pub fn new() -> Self {
        Self {
            root: Regex::new(r"(?s)<svg\b([^>]*)>(.*)</svg\s*>").expect("valid svg root pattern"),
            attribute: Regex::new(r#"([A-Za-z_][\w:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
                .expect("valid attribute pattern"),
            comment: Regex::new(r"(?s)<!--.*?-->").expect("valid comment pattern"),
            inner_id: Regex::new(r#"(\s)id\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
                .expect("valid id pattern"),
            url_ref: Regex::new(r#"url\(\s*['"]?#([^)'"\s]+)['"]?\s*\)"#)
                .expect("valid url reference pattern"),
            href_ref: Regex::new(r#"((?:xlink:)?href\s*=\s*["'])#([^"']+)"#)
                .expect("valid href reference pattern"),
        }
    }

    /// Parse one icon source.
    pub fn parse_icon(&self, id: &str, source: &str) -> Result<Icon, PipelineError> {
        let source = self.comment.replace_all(source, "");
        let caps = self
            .root
            .captures(&source)
            .ok_or_else(|| PipelineError::SpriteError(format!("{}: no <svg> root element", id)))?;

        let mut attributes: Vec<(String, String)> = self
            .attribute
            .captures_iter(&caps[1])
            .filter_map(|a| {
                let name = a.get(1)?.as_str();
                let value = a.get(2).or_else(|| a.get(3))?.as_str();
                KEPT_ATTRIBUTES
                    .contains(&name)
                    .then(|| (name.to_string(), value.to_string()))
            })
            .collect();

        if !attributes.iter().any(|(name, _)| name == "viewBox") {
            let dimension = |key: &str| {
                attributes
                    .iter()
                    .find(|(name, _)| name == key)
                    .and_then(|(_, v)| v.trim_end_matches("px").parse::<f64>().ok())
            };
            if let (Some(w), Some(h)) = (dimension("width"), dimension("height")) {
                attributes.insert(0, ("viewBox".to_string(), format!("0 0 {} {}", w, h)));
            }
        }

        let id = sanitize_id(id);
        let content = self.namespace(&id, caps[2].trim());

        Ok(Icon {
            id,
            attributes,
            content,
        })
    }

    /// Prefix inner ids, and local references to them, with `prefix-`.
    fn namespace(&self, prefix: &str, content: &str) -> String {
        let ids: HashSet<&str> = self
            .inner_id
            .captures_iter(content)
            .filter_map(|c| c.get(2).or_else(|| c.get(3)))
            .map(|m| m.as_str())
            .collect();
        if ids.is_empty() {
            return content.to_string();
        }

        let scoped = |id: &str| {
            if ids.contains(id) {
                format!("{}-{}", prefix, id)
            } else {
                id.to_string()
            }
        };

        let content = self.inner_id.replace_all(content, |c: &Captures| {
            let id = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
            format!(r#"{}id="{}""#, &c[1], scoped(id))
        });
        let content = self
            .url_ref
            .replace_all(&content, |c: &Captures| format!("url(#{})", scoped(&c[1])));
        let content = self
            .href_ref
            .replace_all(&content, |c: &Captures| format!("{}#{}", &c[1], scoped(&c[2])));
        content.into_owned()
    }

    /// Render icons into one stack sprite document.
    pub fn render(&self, icons: &[Icon]) -> String {
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="utf-8"?><svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
        );
        out.push_str("<style>");
        out.push_str(STACK_STYLE);
        out.push_str("</style>");

        for icon in icons {
            out.push_str("<svg");
            for (name, value) in &icon.attributes {
                out.push_str(&format!(r#" {}="{}""#, name, value));
            }
            out.push_str(&format!(r#" id="{}">"#, icon.id));
            out.push_str(&icon.content);
            out.push_str("</svg>");
        }

        out.push_str("</svg>");
        out
    }
}

impl Default for SpriteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Render the HTML usage page for a sprite referenced as `sprite_href`.
pub fn render_example(sprite_href: &str, icons: &[Icon]) -> Result<String, PipelineError> {
    let mut env = Environment::new();
    env.add_template("example.html", EXAMPLE_TEMPLATE)
        .map_err(|e| PipelineError::SpriteError(e.to_string()))?;

    env.get_template("example.html")
        .and_then(|tmpl| tmpl.render(context! { sprite => sprite_href, icons => icons }))
        .map_err(|e| PipelineError::SpriteError(e.to_string()))
}

/// Build the sprite (and optional example page) from all source SVGs.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    let mut report = PipelineReport::default();
    let builder = SpriteBuilder::new();

    let sources = select(&[pattern_in(&config.image_src_dir, "*.svg")], &[])?;
    if sources.is_empty() {
        tracing::warn!("No SVG icons in {}", config.image_src_dir.display());
        return Ok(report.finish(start));
    }

    let icons = sources
        .iter()
        .map(|path| builder.parse_icon(&stem(path), &read_string(path)?))
        .collect::<Result<Vec<_>, _>>()?;

    let sprite_path = config.sprite_path();
    write_file(&sprite_path, builder.render(&icons))?;
    report.record(sprite_path);

    if config.sprite_example {
        let example_path = config.image_dir.join("stack").join(example_name(&config.sprite_name));
        let href = format!("../{}", config.sprite_name);
        write_file(&example_path, render_example(&href, &icons)?)?;
        report.record(example_path);
    }

    tracing::info!("Packed {} icons into {}", icons.len(), config.sprite_name);
    Ok(report.finish(start))
}

/// `sprite.svg` -> `sprite.stack.html`
fn example_name(sprite_name: &str) -> String {
    format!("{}.stack.html", stem(Path::new(sprite_name)))
}

const EXAMPLE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>SVG stack sprite</title>
  <style>
    body { font-family: system-ui, sans-serif; margin: 2rem; }
    ul { list-style: none; padding: 0; display: flex; flex-wrap: wrap; gap: 1.5rem; }
    li { display: flex; flex-direction: column; align-items: center; gap: 0.5rem; }
    img { width: 48px; height: 48px; }
  </style>
</head>
<body>
  <h1>SVG stack sprite</h1>
  <p>Reference an icon by fragment: <code>&lt;img src="{{ sprite|safe }}#icon-id"&gt;</code></p>
  <ul>
  {% for icon in icons %}
    <li>
      <img src="{{ sprite|safe }}#{{ icon.id }}" alt="{{ icon.id }}">
      <code>#{{ icon.id }}</code>
    </li>
  {% endfor %}
  </ul>
</body>
</html>
"##;
