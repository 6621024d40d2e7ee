//! Logging configuration and weave diagnostics
//!
//! Every event this crate emits uses the `autodi` target. The subscriber
//! setup here needs one of the `logging-json` / `logging-pretty` features;
//! without them `init` is a no-op and events go to whatever subscriber the
//! host installed.
//!
//! [`Diagnostics`] is the weave-side collector: warnings and errors raised
//! while weaving are kept for the [`WeaveReport`](crate::weave::WeaveReport)
//! and mirrored to tracing as they are recorded.
//!
//! # Example
//!
//! ```rust,ignore
//! use autodi::logging;
//!
//! logging::builder()
//!     .with_level(tracing::Level::DEBUG)
//!     .di_only()
//!     .pretty()
//!     .init();
//! ```

use serde::{Deserialize, Serialize};
use tracing::Level;

/// Target used by every event this crate emits
pub const TARGET: &str = "autodi";

/// Logging format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured logging (production default)
    #[default]
    Json,
    /// Pretty colorful output (development)
    Pretty,
    /// Compact single-line output
    Compact,
}

/// Builder for logging configuration
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Filter to only show logs from a specific target
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show this crate's logs
    pub fn di_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    fn filter_directive(&self) -> String {
        match self.target {
            Some(target) => format!("{}={}", target, self.level),
            None => self.level.to_string(),
        }
    }

    /// Install the subscriber.
    ///
    /// Ignores the request if a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = EnvFilter::new(self.filter_directive());
        let registry = tracing_subscriber::registry().with(filter);

        let result = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_file(self.with_file)
                        .with_line_number(self.with_line_number)
                        .with_thread_ids(self.with_thread_ids),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_file(self.with_file)
                        .with_line_number(self.with_line_number)
                        .with_thread_ids(self.with_thread_ids),
                )
                .try_init(),
            // Compact, and JSON when the json layer is not compiled in
            #[allow(unreachable_patterns)]
            _ => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_file(self.with_file)
                        .with_line_number(self.with_line_number)
                        .with_thread_ids(self.with_thread_ids),
                )
                .try_init(),
        };

        if result.is_err() {
            tracing::debug!(target: TARGET, "Subscriber already installed");
        }
    }

    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

/// Create a new logging builder
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize logging with default settings.
///
/// JSON when `logging-json` is enabled, pretty otherwise.
pub fn init() {
    #[cfg(feature = "logging-json")]
    builder().json().init();
    #[cfg(not(feature = "logging-json"))]
    builder().pretty().init();
}

/// Initialize logging for this crate only
pub fn init_di_only() {
    builder().di_only().init();
}

// =============================================================================
// Weave diagnostics
// =============================================================================

/// Verbosity of weave diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DebugLogLevel {
    #[default]
    Default,
    /// Also record mapping rejections
    Verbose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.severity, self.message)
    }
}

/// Diagnostics collected during one weave.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    level: DebugLogLevel,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(level: DebugLogLevel) -> Self {
        Self {
            level,
            entries: Vec::new(),
        }
    }

    #[inline]
    pub fn level(&self) -> DebugLogLevel {
        self.level
    }

    /// Whether verbose messages are kept
    #[inline]
    pub fn is_verbose(&self) -> bool {
        self.level == DebugLogLevel::Verbose
    }

    /// Record a verbose message; dropped unless the level is `Verbose`
    pub fn verbose(&mut self, message: impl Into<String>) {
        if self.is_verbose() {
            let message = message.into();
            tracing::debug!(target: TARGET, "{message}");
            self.push(Severity::Verbose, message);
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: TARGET, "{message}");
        self.push(Severity::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: TARGET, "{message}");
        self.push(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(target: TARGET, "{message}");
        self.push(Severity::Error, message);
    }

    fn push(&mut self, severity: Severity, message: String) {
        self.entries.push(Diagnostic { severity, message });
    }

    #[inline]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Json);
        assert!(builder.target.is_none());
        assert_eq!(builder.filter_directive(), "DEBUG");
    }

    #[test]
    fn test_builder_chain() {
        let builder = LoggingBuilder::new()
            .trace()
            .pretty()
            .with_file()
            .with_line_number()
            .di_only();

        assert_eq!(builder.level, Level::TRACE);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert!(builder.with_file);
        assert!(builder.with_line_number);
        assert_eq!(builder.filter_directive(), "autodi=TRACE");
    }

    #[test]
    fn test_verbose_gated_by_level() {
        let mut quiet = Diagnostics::new(DebugLogLevel::Default);
        quiet.verbose("rejected Foo");
        quiet.warning("missing setter");
        assert_eq!(quiet.entries().len(), 1);

        let mut loud = Diagnostics::new(DebugLogLevel::Verbose);
        loud.verbose("rejected Foo");
        loud.warning("missing setter");
        assert_eq!(loud.entries().len(), 2);
        assert_eq!(loud.warnings().count(), 1);
        assert!(!loud.has_errors());
    }
}
