use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diagnostics::LowerError;

/// Which variable reuse the alias/shadow eliminator repairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// Any second declaration of an identity anywhere in the tree.
    #[default]
    Alias,
    /// Only redeclarations inside a strictly nested scope.
    Shadow,
}

/// Pipeline configuration, loadable from the `[lowering]` table of a TOML file.
///
/// ```toml
/// [lowering]
/// scope_mode = "shadow"
/// optimize = false
/// trace_stages = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoweringOptions {
    pub scope_mode: ScopeMode,
    /// Run the block-flattening cleanup after the rewriting stages.
    pub optimize: bool,
    /// Emit the full tree after every stage at trace level.
    pub trace_stages: bool,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self { scope_mode: ScopeMode::Alias, optimize: true, trace_stages: false }
    }
}

// ---- TOML deserialization types ----

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    #[serde(default)]
    lowering: LoweringOptions,
}

impl LoweringOptions {
    pub fn from_toml_str(content: &str) -> Result<Self, LowerError> {
        Self::parse(content, Path::new("<string>"))
    }

    pub fn from_path(path: &Path) -> Result<Self, LowerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LowerError::config(format!("could not read file: {e}"), path.to_path_buf()))?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, LowerError> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| LowerError::config(format!("invalid configuration: {e}"), path.to_path_buf()))?;
        Ok(config.lowering)
    }

    pub fn with_scope_mode(mut self, scope_mode: ScopeMode) -> Self {
        self.scope_mode = scope_mode;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_trace_stages(mut self, trace_stages: bool) -> Self {
        self.trace_stages = trace_stages;
        self
    }
}
