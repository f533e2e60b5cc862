//! Plugin descriptors and the ordered registry they live in.
//!
//! Stage membership and ordering are data here, not branching in the
//! builder: each descriptor carries its ordinal and an [`Activation`] rule.

use std::collections::HashSet;

use serde::Serialize;

use pipewright_shared::{Mode, PipewrightError, Result};

/// The transformation a descriptor stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginKind {
    /// Component compilation (with style preprocessing).
    Compile,
    /// Extract component CSS into a separate file.
    CssExtract,
    /// Resolve bare imports against installed packages.
    Resolve,
    /// CommonJS → ES module interop shim.
    #[serde(rename = "commonjs")]
    CommonJs,
    /// Attach the live-reload client.
    LiveReload,
    /// Minify the final bundle.
    Minify,
    /// Start the supervised dev server after a build.
    DevServer,
    /// Rebuild when extra config files change.
    WatchTrigger,
}

impl PluginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::CssExtract => "css-extract",
            Self::Resolve => "resolve",
            Self::CommonJs => "commonjs",
            Self::LiveReload => "live-reload",
            Self::Minify => "minify",
            Self::DevServer => "dev-server",
            Self::WatchTrigger => "watch-trigger",
        }
    }
}

/// When a descriptor is part of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Activation {
    Always,
    Development,
    Production,
    /// Only the first target, only in development.
    FirstTargetInDevelopment,
}

impl Activation {
    pub fn enabled_if(self, mode: Mode, target_index: usize) -> bool {
        match self {
            Self::Always => true,
            Self::Development => mode == Mode::Development,
            Self::Production => mode == Mode::Production,
            Self::FirstTargetInDevelopment => target_index == 0 && mode == Mode::Development,
        }
    }
}

/// A named, ordered, conditionally-enabled stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub kind: PluginKind,
    pub activation: Activation,
    pub position: u32,
}

impl PluginDescriptor {
    pub fn new(
        id: impl Into<String>,
        kind: PluginKind,
        activation: Activation,
        position: u32,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            activation,
            position,
        }
    }

    pub fn enabled_if(&self, mode: Mode, target_index: usize) -> bool {
        self.activation.enabled_if(mode, target_index)
    }
}

/// The built-in stage chain, in execution order.
///
/// Order is load-bearing: minification must see compiled output, and the
/// dev server must come after everything that writes the bundle.
pub fn builtin_descriptors() -> Vec<PluginDescriptor> {
    use Activation::*;
    use PluginKind::*;

    [
        (Compile, Always),
        (CssExtract, Always),
        (Resolve, Always),
        (CommonJs, Always),
        (LiveReload, Development),
        (Minify, Production),
        (DevServer, FirstTargetInDevelopment),
        (WatchTrigger, FirstTargetInDevelopment),
    ]
    .into_iter()
    .zip(0u32..)
    .map(|((kind, activation), position)| {
        PluginDescriptor::new(kind.as_str(), kind, activation, position)
    })
    .collect()
}

/// Validated, position-ordered set of descriptors.
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: Vec<PluginDescriptor>,
}

impl Registry {
    /// Validate and order descriptors. Ids and positions must be unique.
    pub fn new(mut descriptors: Vec<PluginDescriptor>) -> Result<Self> {
        let mut ids = HashSet::new();
        let mut positions = HashSet::new();

        for desc in &descriptors {
            if desc.id.trim().is_empty() {
                return Err(PipewrightError::config("plugin id must not be empty"));
            }
            if !ids.insert(desc.id.as_str()) {
                return Err(PipewrightError::config(format!(
                    "duplicate plugin id '{}'",
                    desc.id
                )));
            }
            if !positions.insert(desc.position) {
                return Err(PipewrightError::config(format!(
                    "plugin '{}' reuses position {}",
                    desc.id, desc.position
                )));
            }
        }

        descriptors.sort_by_key(|d| d.position);
        Ok(Self { descriptors })
    }

    /// Registry of [`builtin_descriptors`].
    pub fn builtin() -> Self {
        let mut descriptors = builtin_descriptors();
        descriptors.sort_by_key(|d| d.position);
        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    /// Descriptors enabled for `(mode, target_index)`, in registry order.
    pub fn enabled(
        &self,
        mode: Mode,
        target_index: usize,
    ) -> impl Iterator<Item = &PluginDescriptor> + '_ {
        self.descriptors
            .iter()
            .filter(move |d| d.enabled_if(mode, target_index))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
