//! Run mode of a project.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a project is run.
///
/// `development` watches and live-reloads; `preview` and `production`
/// build once. Only `production` writes into the assembled app root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Preview,
    Production,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Preview => "preview",
            Mode::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Mode::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }

    /// Environment files for this mode, lowest precedence first.
    pub fn env_files(&self) -> &'static [&'static str] {
        match self {
            Mode::Development => &[
                ".env",
                ".env.local",
                ".env.dev",
                ".env.dev.local",
                ".env.development",
                ".env.development.local",
            ],
            Mode::Preview | Mode::Production => &[
                ".env",
                ".env.local",
                ".env.prod",
                ".env.prod.local",
                ".env.production",
                ".env.production.local",
            ],
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "preview" => Ok(Mode::Preview),
            "production" | "prod" => Ok(Mode::Production),
            _ => Err(format!(
                "invalid mode '{}'; expected 'development', 'preview', or 'production'",
                s
            )),
        }
    }
}
