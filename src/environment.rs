use serde::{Deserialize, Serialize};

/// Deployment target for a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Live,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Live => "live",
        }
    }

    /// The environment whose marker file must never be published with this one.
    pub fn other(self) -> Self {
        match self {
            Environment::Dev => Environment::Live,
            Environment::Live => Environment::Dev,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
