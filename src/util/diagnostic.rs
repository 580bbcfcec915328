//! User-facing diagnostic messages.
//!
//! Every fatal error is rendered as a single `error:` line; context lines
//! and suggestions are appended only when they carry information.

use std::fmt;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when no project configuration is found.
    pub const NO_CONFIG: &str = "create a `Triad.toml` at the project root";

    /// Suggestion when a target package cannot be located.
    pub const PACKAGE_NOT_FOUND: &str =
        "check the `package` field; it is a path relative to the project root or an installed package name";

    /// Suggestion when an entry file is missing.
    pub const NO_ENTRY: &str = "set `entry` for the target or a `main` field in its package.json";

    /// Suggestion when bridge/UI ids collide.
    pub const DUPLICATE_ID: &str = "give every bridge and every UI target a distinct `id`";

    /// Suggestion when the framework runtime is shipped as a runtime dependency.
    pub const FRAMEWORK_IN_DEPENDENCIES: &str =
        "move the framework runtime to `devDependencies`";

    /// Suggestion for more output.
    pub const DEBUG: &str = "rerun with `--debug` for the full error chain";
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let error_prefix = if color {
            "\x1b[1;31merror\x1b[0m"
        } else {
            "error"
        };

        output.push_str(&format!("{}: {}\n", error_prefix, self.message));

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            for suggestion in &self.suggestions {
                output.push_str(&format!("{}: {}\n", help_prefix, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
