//! Scaffold the conventional project layout.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Run the init command.
pub async fn run(yes: bool) -> Result<()> {
    tracing::info!("Initializing assetflow...");

    if !scaffold(Path::new("."), yes)? {
        return Ok(());
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'assetflow' to build and start the development server.");

    Ok(())
}

/// Files written by `init`, relative to the project root.
const FILES: &[(&str, &str)] = &[
    ("assetflow.toml", DEFAULT_CONFIG),
    ("app/pages/index.html", DEFAULT_INDEX),
    ("app/components/header.html", DEFAULT_HEADER),
    ("app/scss/style.scss", DEFAULT_STYLE),
    ("app/js/main.js", DEFAULT_SCRIPT),
    ("app/images/src/logo.svg", DEFAULT_ICON),
];

/// Directories created empty, waiting for sources.
const DIRS: &[&str] = &["app/fonts/src"];

/// Write the starter project under `root`. Returns false when an existing
/// `app/` was left untouched.
fn scaffold(root: &Path, yes: bool) -> Result<bool> {
    let app_dir = root.join("app");

    // Check if app already exists
    if app_dir.exists() && !yes {
        tracing::warn!("app/ directory already exists. Use --yes to overwrite.");
        return Ok(false);
    }

    for dir in DIRS {
        let path = root.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }

    for (name, contents) in FILES {
        let path = root.join(name);
        if path.exists() && !yes {
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", name))?;
        tracing::info!("Created {}", name);
    }

    Ok(true)
}

const DEFAULT_CONFIG: &str = r#"# assetflow configuration

[paths]
# Working tree served by the dev server
app = "app"

# Distribution output
dist = "dist"

[styles]
entries = ["app/scss/style.scss"]
browsers = ["last 10 versions"]

[scripts]
entries = ["app/js/main.js"]

[images]
avif_quality = 50

[sprite]
# Write images/stack/sprite.stack.html next to the sprite
example = true

[server]
host = "0.0.0.0"
port = 3000
open = false
"#;

const DEFAULT_INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Home</title>
  <link rel="stylesheet" href="css/style.min.css">
</head>
<body>
  <!--=include header.html -->
  <main>
    <p>Edit <code>app/pages/index.html</code> to get started.</p>
  </main>
  <script src="js/main.min.js"></script>
</body>
</html>
"#;

const DEFAULT_HEADER: &str = r#"<header class="site-header">
  <svg class="site-header__logo" width="32" height="32">
    <use href="images/sprite.svg#logo"></use>
  </svg>
</header>
"#;

const DEFAULT_STYLE: &str = r#"$accent: #3b82f6;

body {
  margin: 0;
  font-family: system-ui, sans-serif;
}

.site-header {
  display: flex;
  align-items: center;
  padding: 1rem;
  border-bottom: 2px solid $accent;

  &__logo {
    color: $accent;
  }
}
"#;

const DEFAULT_SCRIPT: &str = r#"document.addEventListener('DOMContentLoaded', function () {
  console.log('ready');
});
"#;

const DEFAULT_ICON: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24">
  <circle cx="12" cy="12" r="10" fill="currentColor"/>
</svg>
"#;
