//! Pipeline construction: registry + mode + target index → ordered stages.

use serde::Serialize;
use tracing::{debug, instrument};

use pipewright_shared::{AppConfig, BuildTarget, Mode, Result};
use pipewright_supervisor::ServerCommand;

use crate::registry::{PluginDescriptor, PluginKind, Registry};

/// File name the CSS-extraction stage writes next to each bundle.
pub const CSS_OUTPUT: &str = "style.css";

// ---------------------------------------------------------------------------
// Stage options
// ---------------------------------------------------------------------------

/// Style preprocessing handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preprocess {
    pub postcss_plugins: Vec<String>,
    /// Content-scan globs for the styling framework.
    pub content: Vec<String>,
}

/// Per-stage options as the external engine sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "plugin", rename_all = "kebab-case")]
pub enum StageOptions {
    Compile {
        /// Run-time checks in the compiled components.
        dev: bool,
        preprocess: Preprocess,
    },
    CssExtract {
        output: String,
    },
    Resolve {
        browser: bool,
        dedupe: Vec<String>,
        export_conditions: Vec<String>,
    },
    #[serde(rename = "commonjs")]
    CommonJs,
    LiveReload {
        watch_dir: String,
    },
    Minify,
    DevServer {
        command: String,
        args: Vec<String>,
        shell: bool,
    },
    WatchTrigger {
        globs: Vec<String>,
    },
}

impl StageOptions {
    pub fn kind(&self) -> PluginKind {
        match self {
            Self::Compile { .. } => PluginKind::Compile,
            Self::CssExtract { .. } => PluginKind::CssExtract,
            Self::Resolve { .. } => PluginKind::Resolve,
            Self::CommonJs => PluginKind::CommonJs,
            Self::LiveReload { .. } => PluginKind::LiveReload,
            Self::Minify => PluginKind::Minify,
            Self::DevServer { .. } => PluginKind::DevServer,
            Self::WatchTrigger { .. } => PluginKind::WatchTrigger,
        }
    }
}

/// Settings the stages are configured from.
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub postcss_plugins: Vec<String>,
    pub content_globs: Vec<String>,
    pub live_reload_dir: String,
    pub dev_server: ServerCommand,
    pub watch_globs: Vec<String>,
}

impl From<&AppConfig> for StageSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            postcss_plugins: config.styling.postcss_plugins.clone(),
            content_globs: config.styling.content.clone(),
            live_reload_dir: config.live_reload.dir.clone(),
            dev_server: ServerCommand::new(
                config.dev_server.command.as_str(),
                config.dev_server.args.clone(),
            )
            .with_shell(config.dev_server.shell),
            watch_globs: config.watch.globs.clone(),
        }
    }
}

impl Default for StageSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl StageSettings {
    fn options_for(&self, kind: PluginKind, mode: Mode) -> StageOptions {
        match kind {
            PluginKind::Compile => StageOptions::Compile {
                dev: mode.is_development(),
                preprocess: Preprocess {
                    postcss_plugins: self.postcss_plugins.clone(),
                    content: self.content_globs.clone(),
                },
            },
            PluginKind::CssExtract => StageOptions::CssExtract {
                output: CSS_OUTPUT.to_string(),
            },
            PluginKind::Resolve => StageOptions::Resolve {
                browser: true,
                dedupe: vec!["svelte".into()],
                export_conditions: vec!["svelte".into()],
            },
            PluginKind::CommonJs => StageOptions::CommonJs,
            PluginKind::LiveReload => StageOptions::LiveReload {
                watch_dir: self.live_reload_dir.clone(),
            },
            PluginKind::Minify => StageOptions::Minify,
            PluginKind::DevServer => StageOptions::DevServer {
                command: self.dev_server.program.clone(),
                args: self.dev_server.args.clone(),
                shell: self.dev_server.shell,
            },
            PluginKind::WatchTrigger => StageOptions::WatchTrigger {
                globs: self.watch_globs.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One configured stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub id: String,
    pub position: u32,
    #[serde(flatten)]
    pub options: StageOptions,
}

impl Stage {
    pub fn kind(&self) -> PluginKind {
        self.options.kind()
    }
}

/// Ordered, mode-filtered stages for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pipeline {
    pub target: String,
    pub mode: Mode,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn ids(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn contains(&self, kind: PluginKind) -> bool {
        self.stage(kind).is_some()
    }

    pub fn stage(&self, kind: PluginKind) -> Option<&Stage> {
        self.stages.iter().find(|s| s.kind() == kind)
    }

    /// Whether this pipeline carries the dev-server stage.
    pub fn serves(&self) -> bool {
        self.contains(PluginKind::DevServer)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds pipelines from a validated registry.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    registry: Registry,
    settings: StageSettings,
}

impl PipelineBuilder {
    /// Validate `descriptors` (unique ids and positions) and build a builder.
    pub fn new(descriptors: Vec<PluginDescriptor>, settings: StageSettings) -> Result<Self> {
        Ok(Self {
            registry: Registry::new(descriptors)?,
            settings,
        })
    }

    /// Builder over the built-in stage chain.
    pub fn builtin(settings: StageSettings) -> Self {
        Self {
            registry: Registry::builtin(),
            settings,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Stable filter of the registry for `(mode, target_index)`.
    ///
    /// Deterministic: the same inputs always give the same stage sequence.
    #[instrument(skip_all, fields(target = %target.name, mode = %mode, target_index = target_index))]
    pub fn build(&self, target: &BuildTarget, mode: Mode, target_index: usize) -> Pipeline {
        let stages: Vec<Stage> = self
            .registry
            .enabled(mode, target_index)
            .map(|desc| Stage {
                id: desc.id.clone(),
                position: desc.position,
                options: self.settings.options_for(desc.kind, mode),
            })
            .collect();

        debug!(stages = stages.len(), "pipeline built");

        Pipeline {
            target: target.name.clone(),
            mode,
            stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::registry::{Activation, builtin_descriptors};

    fn target(name: &str) -> BuildTarget {
        BuildTarget::new(name, Path::new("src"), Path::new("dist"))
    }

    fn builder() -> PipelineBuilder {
        PipelineBuilder::builtin(StageSettings::default())
    }

    #[test]
    fn production_pipeline_minifies_and_never_serves() {
        let builder = builder();
        for index in 0..3 {
            let pipeline = builder.build(&target("admin"), Mode::Production, index);
            assert!(pipeline.contains(PluginKind::Minify));
            assert!(!pipeline.contains(PluginKind::LiveReload));
            assert!(!pipeline.contains(PluginKind::DevServer));
            assert!(!pipeline.contains(PluginKind::WatchTrigger));
        }
    }

    #[test]
    fn development_pipeline_never_minifies() {
        let builder = builder();
        for index in 0..3 {
            let pipeline = builder.build(&target("admin"), Mode::Development, index);
            assert!(!pipeline.contains(PluginKind::Minify));
            assert!(pipeline.contains(PluginKind::LiveReload));
        }
    }

    #[test]
    fn dev_server_only_on_first_target_in_development() {
        let builder = builder();
        let first = builder.build(&target("index"), Mode::Development, 0);
        assert_eq!(
            first.ids(),
            [
                "compile",
                "css-extract",
                "resolve",
                "commonjs",
                "live-reload",
                "dev-server",
                "watch-trigger",
            ]
        );

        let second = builder.build(&target("admin"), Mode::Development, 1);
        assert!(!second.serves());
        assert!(!second.contains(PluginKind::WatchTrigger));
    }

    #[test]
    fn production_order_ends_with_minify() {
        let pipeline = builder().build(&target("index"), Mode::Production, 0);
        assert_eq!(
            pipeline.ids(),
            ["compile", "css-extract", "resolve", "commonjs", "minify"]
        );
    }

    #[test]
    fn compile_stage_carries_dev_flag() {
        let builder = builder();
        let dev = builder.build(&target("index"), Mode::Development, 0);
        let prod = builder.build(&target("index"), Mode::Production, 0);

        assert!(matches!(
            dev.stage(PluginKind::Compile).map(|s| &s.options),
            Some(StageOptions::Compile { dev: true, .. })
        ));
        assert!(matches!(
            prod.stage(PluginKind::Compile).map(|s| &s.options),
            Some(StageOptions::Compile { dev: false, .. })
        ));
    }

    #[test]
    fn css_stage_writes_style_css() {
        let pipeline = builder().build(&target("index"), Mode::Production, 0);
        let stage = pipeline.stage(PluginKind::CssExtract).expect("css stage");
        assert_eq!(
            stage.options,
            StageOptions::CssExtract {
                output: "style.css".into()
            }
        );
    }

    #[test]
    fn build_is_deterministic() {
        let builder = builder();
        let a = builder.build(&target("index"), Mode::Development, 0);
        let b = builder.build(&target("index"), Mode::Development, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn custom_registry_with_duplicate_ids_fails() {
        let mut descriptors = builtin_descriptors();
        descriptors.push(PluginDescriptor::new(
            "compile",
            PluginKind::Compile,
            Activation::Always,
            42,
        ));
        let err = PipelineBuilder::new(descriptors, StageSettings::default()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn stage_serializes_with_plugin_tag() {
        let pipeline = builder().build(&target("index"), Mode::Development, 0);
        let json = serde_json::to_value(&pipeline).expect("serialize");

        assert_eq!(json["mode"], "development");
        assert_eq!(json["stages"][0]["id"], "compile");
        assert_eq!(json["stages"][0]["plugin"], "compile");
        assert_eq!(json["stages"][0]["dev"], true);
        assert_eq!(json["stages"][5]["plugin"], "dev-server");
        assert_eq!(json["stages"][5]["command"], "flask");
    }
}
