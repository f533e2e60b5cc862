//! Project scaffolding: `init` and `add-target`.
//!
//! Files are written only when absent, so re-running either command never
//! clobbers work in progress.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use pipewright_shared::{
    AppConfig, BuildTarget, PipewrightError, Result, init_config, load_config_from,
    project_root, save_config,
};

use crate::pipeline::CSS_OUTPUT;
use crate::targets::{self, ProjectLayout};

/// Target every new project starts with.
pub const DEFAULT_TARGET: &str = "index";

/// Component file written next to each target's entry module.
pub const COMPONENT_FILE: &str = "App.svelte";

/// Styling framework config, one of the default watch-trigger files.
pub const STYLING_CONFIG_FILE: &str = "tailwind.config.js";

/// Paths derived from a loaded config.
struct Paths {
    root: PathBuf,
    layout: ProjectLayout,
    templates_root: PathBuf,
}

impl Paths {
    fn new(config: &AppConfig, config_path: &Path) -> Self {
        let root = project_root(config_path);
        Self {
            layout: ProjectLayout::new(
                root.join(&config.project.source_root),
                root.join(&config.project.output_root),
            ),
            templates_root: root.join(&config.project.templates_root),
            root,
        }
    }

    /// Server app package: the directory holding the templates folder.
    fn app_dir(&self) -> &Path {
        self.templates_root.parent().unwrap_or(&self.root)
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| PipewrightError::io(path, e))
}

/// Write `content` unless the file already exists.
fn write_new(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        debug!(path = %path.display(), "keeping existing file");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    std::fs::write(path, content).map_err(|e| PipewrightError::io(path, e))
}

/// Write a default config, the directory layout, the styling config and a
/// sample server app, then add the `index` target.
pub fn init_project(config_path: &Path, force: bool) -> Result<AppConfig> {
    let config = init_config(config_path, force)?;
    let paths = Paths::new(&config, config_path);

    create_dir(&paths.layout.source_root)?;
    create_dir(&paths.layout.output_root)?;
    create_dir(&paths.templates_root)?;

    write_new(
        &paths.root.join(STYLING_CONFIG_FILE),
        &generate_styling_config(&config.styling.content),
    )?;
    write_new(&paths.layout.output_root.join("global.css"), "")?;
    write_new(
        &paths.app_dir().join("__init__.py"),
        &generate_server_app(DEFAULT_TARGET),
    )?;

    add_target(config_path, DEFAULT_TARGET)?;
    load_config_from(config_path)
}

/// Append a target to the config, create its directories and write its
/// entry module, component and page template.
///
/// The whole target list is re-validated, so a duplicate or malformed name
/// leaves the config file untouched.
pub fn add_target(config_path: &Path, name: &str) -> Result<BuildTarget> {
    let mut config = load_config_from(config_path)?;
    let paths = Paths::new(&config, config_path);

    let mut names = config.project.targets.clone();
    names.push(name.to_string());
    let resolved = targets::resolve(&names, &paths.layout)?;
    let target = resolved
        .into_iter()
        .last()
        .ok_or_else(|| PipewrightError::config("target list unexpectedly empty"))?;

    let source_dir = target
        .entry_path
        .parent()
        .unwrap_or(&paths.layout.source_root)
        .to_path_buf();
    create_dir(&source_dir)?;
    create_dir(target.output_dir())?;

    write_new(&target.entry_path, &generate_entry_module())?;
    write_new(&source_dir.join(COMPONENT_FILE), &generate_component(&target.name))?;
    write_new(
        &paths.templates_root.join(format!("{}.html", target.name)),
        &generate_page_template(&target, &asset_base(&config, &paths, &target.name)),
    )?;

    config.project.targets = names;
    save_config(config_path, &config)?;

    info!(target = %target.name, entry = %target.entry_path.display(), "target added");
    Ok(target)
}

/// URL prefix the server exposes a target's bundle under: the output root
/// relative to the app package, e.g. `/static/svelte/index`.
fn asset_base(config: &AppConfig, paths: &Paths, name: &str) -> String {
    let output = Path::new(&config.project.output_root);
    let app_rel = paths.app_dir().strip_prefix(&paths.root).unwrap_or(Path::new(""));
    let rel = output.strip_prefix(app_rel).unwrap_or(output);

    let mut url = String::new();
    for part in rel.iter().chain(std::iter::once(std::ffi::OsStr::new(name))) {
        url.push('/');
        url.push_str(&part.to_string_lossy());
    }
    url
}

fn generate_entry_module() -> String {
    r#"import App from "./App.svelte";

export default App;
"#
    .to_string()
}

fn generate_component(name: &str) -> String {
    format!(
        r#"<script>
  export let title = "{name}";
</script>

<main class="mx-auto max-w-2xl p-8">
  <h1 class="text-3xl font-bold">{{title}}</h1>
  <p class="mt-4">Edit this component to get started.</p>
</main>
"#
    )
}

/// Page that loads the target's bundle and mounts its `{name}App` global.
fn generate_page_template(target: &BuildTarget, asset_base: &str) -> String {
    let bundle = target.bundle_name();
    let name = &target.name;
    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{name}</title>
    <link rel="stylesheet" href="{asset_base}/{CSS_OUTPUT}" />
  </head>
  <body>
    <div id="app"></div>
    <script src="{asset_base}/index.js"></script>
    <script>
      new {bundle}({{ target: document.getElementById("app") }});
    </script>
  </body>
</html>
"#
    )
}

fn generate_styling_config(content: &[String]) -> String {
    let globs = content
        .iter()
        .map(|g| format!("    \"{g}\","))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"/** @type {{import('tailwindcss').Config}} */
export default {{
  content: [
{globs}
  ],
  theme: {{
    extend: {{}},
  }},
  plugins: [],
}}
"#
    )
}

fn generate_server_app(page: &str) -> String {
    format!(
        r#"from flask import Flask, render_template

app = Flask(__name__)


@app.route("/")
def index():
    return render_template("{page}.html")
"#
    )
}

#[cfg(test)]
mod tests {
    use pipewright_shared::CONFIG_FILE_NAME;

    use super::*;

    #[test]
    fn init_creates_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);

        init_project(&path, false).expect("init");
        assert!(path.exists());
        assert!(dir.path().join("app/svelte").is_dir());
        assert!(dir.path().join("app/static/svelte").is_dir());
        assert!(dir.path().join("app/templates").is_dir());
        assert!(dir.path().join("app/__init__.py").is_file());
        assert!(dir.path().join("app/static/svelte/global.css").is_file());
    }

    #[test]
    fn init_writes_styling_config_from_content_globs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        init_project(&path, false).expect("init");

        let styling = std::fs::read_to_string(dir.path().join(STYLING_CONFIG_FILE))
            .expect("styling config");
        assert!(styling.contains("\"./app/svelte/**/*.svelte\","));
        assert!(styling.contains("\"./app/templates/**/*.html\","));
    }

    #[test]
    fn init_adds_index_target_with_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);

        let config = init_project(&path, false).expect("init");
        assert_eq!(config.project.targets, vec![DEFAULT_TARGET]);
        assert!(dir.path().join("app/svelte/index/main.js").is_file());
        assert!(dir.path().join("app/svelte/index/App.svelte").is_file());
        assert!(dir.path().join("app/templates/index.html").is_file());
    }

    #[test]
    fn add_target_writes_entry_component_and_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        init_project(&path, false).expect("init");

        let target = add_target(&path, "admin").expect("add admin");

        let entry = std::fs::read_to_string(&target.entry_path).expect("entry module");
        assert!(entry.contains("import App from \"./App.svelte\""));
        let component =
            std::fs::read_to_string(dir.path().join("app/svelte/admin/App.svelte")).expect("component");
        assert!(component.contains("\"admin\""));

        let page = std::fs::read_to_string(dir.path().join("app/templates/admin.html"))
            .expect("page template");
        assert!(page.contains("new adminApp("));
        assert!(page.contains("src=\"/static/svelte/admin/index.js\""));
        assert!(page.contains("href=\"/static/svelte/admin/style.css\""));
    }

    #[test]
    fn add_target_keeps_existing_sources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        init_project(&path, false).expect("init");

        let entry = dir.path().join("app/svelte/blog/main.js");
        std::fs::create_dir_all(entry.parent().expect("parent")).expect("mkdir");
        std::fs::write(&entry, "// mine\n").expect("write");

        add_target(&path, "blog").expect("add blog");
        assert_eq!(std::fs::read_to_string(&entry).expect("read"), "// mine\n");
    }

    #[test]
    fn add_target_persists_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        init_project(&path, false).expect("init");

        let target = add_target(&path, "admin").expect("add admin");

        assert_eq!(target.name, "admin");
        assert!(dir.path().join("app/svelte/admin").is_dir());
        assert!(dir.path().join("app/static/svelte/admin").is_dir());

        let config = load_config_from(&path).expect("reload");
        assert_eq!(config.project.targets, vec!["index", "admin"]);
    }

    #[test]
    fn add_duplicate_target_leaves_config_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        init_project(&path, false).expect("init");

        let err = add_target(&path, "index").unwrap_err();
        assert!(err.is_configuration());
        assert!(add_target(&path, "").is_err());

        let config = load_config_from(&path).expect("reload");
        assert_eq!(config.project.targets, vec!["index"]);
        assert!(!dir.path().join("app/templates/.html").exists());
    }

    #[test]
    fn add_target_without_config_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = add_target(&dir.path().join(CONFIG_FILE_NAME), "index").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn asset_base_falls_back_to_output_root() {
        let mut config = AppConfig::default();
        config.project.output_root = "public/bundles".into();
        let paths = Paths::new(&config, Path::new("site/pipewright.toml"));
        assert_eq!(asset_base(&config, &paths, "index"), "/public/bundles/index");
    }
}
