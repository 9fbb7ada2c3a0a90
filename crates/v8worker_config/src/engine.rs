use serde::{Deserialize, Serialize};

/// Process-wide script engine settings.
///
/// Flags use the engine's command line syntax, e.g. `--max-old-space-size=64`.
/// They take effect only if applied before the first worker is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl EngineConfig {
    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }
}
