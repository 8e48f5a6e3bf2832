//! Session configuration and the environment variables that seed it.
//!
//! | Variable              | Effect                                              |
//! |-----------------------|-----------------------------------------------------|
//! | `POV_DISABLE`         | suppress every emission                             |
//! | `POV_KEEP_PRINT`      | leave host printing alone                           |
//! | `POV_KEEP_EXCEPTHOOK` | leave the panic hook alone                          |
//! | `POV_FILE`            | write to this file instead of stderr                |
//! | `POV_ENV`             | comma-separated variables to report at start-up     |
//! | `POV_DEPTH`           | default depth (`-1` = unbounded)                    |
//! | `POV_FULL`            | also show internal attributes                       |
//! | `POV_ID`              | priority-id filter, see [`FilterSet`]               |
//!
//! Malformed values never abort start-up: each one yields a [`ConfigError`]
//! and the default is used instead.

use core::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;

use crate::{FilterError, FilterSet};

/// Default depth budget for a fresh session.
pub const DEFAULT_DEPTH: u32 = 2;

/// How far the walker may descend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Depth {
    /// At most this many levels below the root
    Limited(u32),
    /// No limit. Self-referential values are still caught by the ledger,
    /// but very deep values are walked all the way down.
    Unbounded,
}

impl Depth {
    /// Convert the integer form used on the configuration surface:
    /// `-1` is unbounded, anything else must be non-negative.
    pub fn from_level(level: i64) -> Result<Self, ConfigError> {
        match level {
            -1 => Ok(Depth::Unbounded),
            0.. => u32::try_from(level)
                .map(Depth::Limited)
                .map_err(|_| ConfigError::new("depth", level.to_string(), "too large")),
            _ => Err(ConfigError::new(
                "depth",
                level.to_string(),
                "must be -1 (unbounded) or non-negative",
            )),
        }
    }

    /// The integer form of this depth.
    pub fn level(self) -> i64 {
        match self {
            Depth::Limited(n) => i64::from(n),
            Depth::Unbounded => -1,
        }
    }

    /// Whether no more levels may be entered.
    #[inline]
    pub fn is_exhausted(self) -> bool {
        self == Depth::Limited(0)
    }

    /// The budget one level further down. Unbounded stays unbounded.
    #[inline]
    pub fn descend(self) -> Self {
        match self {
            Depth::Limited(n) => Depth::Limited(n.saturating_sub(1)),
            Depth::Unbounded => Depth::Unbounded,
        }
    }
}

impl Default for Depth {
    fn default() -> Self {
        Depth::Limited(DEFAULT_DEPTH)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Limited(n) => write!(f, "{n}"),
            Depth::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Level of detail used when walking values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Detail {
    /// Depth budget
    pub depth: Depth,
    /// Whether internal attributes are shown
    pub full: bool,
}

impl Detail {
    /// Detail with the given depth and visibility.
    pub const fn new(depth: Depth, full: bool) -> Self {
        Self { depth, full }
    }
}

/// Where a [`Pov::detail`](crate::Pov::detail) change lands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scope {
    /// Only the call-site handle that made the change
    #[default]
    Instance,
    /// The session-wide default read by every handle without an override
    Global,
}

// ============================================================================
// Environment sources
// ============================================================================

/// Source of environment-style variables.
///
/// Lets tests feed configuration without touching the process environment.
pub trait EnvSource {
    /// Value of `name`, if set.
    fn get(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnv;

impl EnvSource for StdEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// An in-memory environment.
#[derive(Debug, Clone, Default)]
pub struct MockEnv {
    vars: IndexMap<String, String, std::hash::RandomState>,
}

impl MockEnv {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }
}

impl EnvSource for MockEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

// ============================================================================
// Options
// ============================================================================

/// Start-up options for a [`Session`](crate::Session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Suppress every emission, whatever the filter says
    pub disable_all: bool,
    /// Leave host printing alone
    pub keep_native_print: bool,
    /// Leave the panic hook alone
    pub keep_native_panic_hook: bool,
    /// Write to this file instead of the console
    pub redirect_output: Option<PathBuf>,
    /// Variables whose values are reported when the session starts
    pub report_env: Vec<String>,
    /// Session-wide default detail
    pub detail: Detail,
    /// Priority-id filter
    pub filter: FilterSet,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            disable_all: false,
            keep_native_print: false,
            keep_native_panic_hook: false,
            redirect_output: None,
            report_env: Vec::new(),
            detail: Detail::default(),
            filter: FilterSet::everything(),
        }
    }
}

impl Options {
    /// Read options from an environment source.
    ///
    /// Every malformed variable is reported in the returned list and replaced
    /// by its default.
    pub fn from_env(env: &impl EnvSource) -> (Self, Vec<ConfigError>) {
        let mut errors = Vec::new();
        let mut options = Options::default();

        if let Some(value) = env.get("POV_DISABLE") {
            options.disable_all = !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "" | "0" | "false"
            );
        }

        options.keep_native_print = read_flag(env, "POV_KEEP_PRINT", &mut errors);
        options.keep_native_panic_hook = read_flag(env, "POV_KEEP_EXCEPTHOOK", &mut errors);

        if let Some(path) = env.get("POV_FILE")
            && !path.trim().is_empty()
        {
            options.redirect_output = Some(PathBuf::from(path.trim()));
        }

        if let Some(names) = env.get("POV_ENV") {
            options.report_env = names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect();
        }

        if let Some(value) = env.get("POV_DEPTH") {
            match value
                .trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::new("POV_DEPTH", &value, "not an integer"))
                .and_then(Depth::from_level)
            {
                Ok(depth) => options.detail.depth = depth,
                Err(err) => errors.push(err.for_option("POV_DEPTH")),
            }
        }

        if let Some(value) = env.get("POV_FULL") {
            match parse_bool(&value) {
                Some(full) => options.detail.full = full,
                None => errors.push(ConfigError::new("POV_FULL", &value, "not a boolean")),
            }
        }

        if let Some(value) = env.get("POV_ID") {
            let (filter, err) = FilterSet::parse_or_default(&value);
            options.filter = filter;
            if let Some(err) = err {
                errors.push(ConfigError::filter("POV_ID", &value, err));
            }
        }

        tracing::debug!(?options, errors = errors.len(), "read pov options");
        (options, errors)
    }

    /// Builder: disable every emission.
    pub fn disabled(mut self) -> Self {
        self.disable_all = true;
        self
    }

    /// Builder: set the default detail.
    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = detail;
        self
    }

    /// Builder: set the id filter.
    pub fn with_filter(mut self, filter: FilterSet) -> Self {
        self.filter = filter;
        self
    }

    /// Builder: redirect output to a file.
    pub fn with_redirect(mut self, path: impl Into<PathBuf>) -> Self {
        self.redirect_output = Some(path.into());
        self
    }

    /// Builder: report these variables at start-up.
    pub fn with_report_env<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.report_env = names.into_iter().map(Into::into).collect();
        self
    }
}

fn read_flag(env: &impl EnvSource, name: &str, errors: &mut Vec<ConfigError>) -> bool {
    let Some(value) = env.get(name) else {
        return false;
    };
    match value.trim().parse::<i64>() {
        Ok(n) => n != 0,
        Err(_) => {
            errors.push(ConfigError::new(name, &value, "not an integer"));
            false
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n > 0);
    }
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A malformed configuration value. Always recovered by using the default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// Option or variable name
    pub option: String,
    /// The rejected value
    pub value: String,
    /// Why it was rejected
    pub reason: String,
}

impl ConfigError {
    /// Create a configuration error.
    pub fn new(option: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            option: option.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    fn filter(option: &str, value: &str, err: FilterError) -> Self {
        Self::new(option, value, err.to_string())
    }

    fn for_option(mut self, option: &str) -> Self {
        self.option = option.to_owned();
        self
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} value {:?}: {} (using the default)",
            self.option, self.value, self.reason
        )
    }
}

impl core::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_levels() {
        assert_eq!(Depth::from_level(-1), Ok(Depth::Unbounded));
        assert_eq!(Depth::from_level(0), Ok(Depth::Limited(0)));
        assert_eq!(Depth::from_level(3), Ok(Depth::Limited(3)));
        assert!(Depth::from_level(-2).is_err());
        assert_eq!(Depth::Unbounded.descend(), Depth::Unbounded);
        assert_eq!(Depth::Limited(1).descend(), Depth::Limited(0));
        assert!(Depth::Limited(0).is_exhausted());
        assert!(!Depth::Unbounded.is_exhausted());
        assert_eq!(Depth::Unbounded.level(), -1);
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let (options, errors) = Options::from_env(&MockEnv::new());
        assert!(errors.is_empty());
        assert_eq!(options, Options::default());
        assert_eq!(options.detail.depth, Depth::Limited(DEFAULT_DEPTH));
        assert!(options.filter.contains(12345));
    }

    #[test]
    fn every_variable_is_read() {
        let env = MockEnv::new()
            .with("POV_DISABLE", "1")
            .with("POV_KEEP_PRINT", "1")
            .with("POV_KEEP_EXCEPTHOOK", "0")
            .with("POV_FILE", "/tmp/pov.log")
            .with("POV_ENV", "HOME, USER,,")
            .with("POV_DEPTH", "-1")
            .with("POV_FULL", "true")
            .with("POV_ID", "3-");
        let (options, errors) = Options::from_env(&env);
        assert!(errors.is_empty(), "{errors:?}");
        assert!(options.disable_all);
        assert!(options.keep_native_print);
        assert!(!options.keep_native_panic_hook);
        assert_eq!(options.redirect_output, Some(PathBuf::from("/tmp/pov.log")));
        assert_eq!(options.report_env, vec!["HOME", "USER"]);
        assert_eq!(options.detail, Detail::new(Depth::Unbounded, true));
        assert!(!options.filter.contains(2));
        assert!(options.filter.contains(3));
    }

    #[test]
    fn disable_accepts_false_spellings() {
        for value in ["0", "false", "FALSE", ""] {
            let (options, _) = Options::from_env(&MockEnv::new().with("POV_DISABLE", value));
            assert!(!options.disable_all, "{value:?}");
        }
    }

    #[test]
    fn malformed_values_fall_back_with_one_error_each() {
        let env = MockEnv::new()
            .with("POV_DEPTH", "-7")
            .with("POV_FULL", "maybe")
            .with("POV_ID", "1,,2")
            .with("POV_KEEP_PRINT", "yes please");
        let (options, errors) = Options::from_env(&env);
        assert_eq!(errors.len(), 4);
        assert_eq!(options.detail, Detail::default());
        assert_eq!(options.filter, FilterSet::everything());
        assert!(!options.keep_native_print);
        assert!(errors.iter().any(|e| e.option == "POV_DEPTH"));
        assert!(errors.iter().any(|e| e.option == "POV_ID"));
    }
}
