//! Repository configuration (`.arcland.toml`).
//!
//! Defines the typed configuration read from `.arcland.toml` at the working
//! copy root: the review server, land policy, and submit-queue settings.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// File name looked up at the working-copy root.
pub const CONFIG_FILE: &str = ".arcland.toml";

/// Environment variable that overrides `[review].token`.
pub const TOKEN_ENV: &str = "ARCLAND_CONDUIT_TOKEN";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level arcland repository configuration.
///
/// Missing fields use defaults. Missing file → all defaults (no error).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArcConfig {
    /// Review server connection.
    #[serde(default)]
    pub review: ReviewConfig,

    /// Land policy.
    #[serde(default)]
    pub land: LandConfig,

    /// Submit-queue delegation.
    #[serde(default)]
    pub submit_queue: SubmitQueueConfig,
}

// ---------------------------------------------------------------------------
// ReviewConfig
// ---------------------------------------------------------------------------

/// Review server connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewConfig {
    /// Base URI of the review server, e.g. `https://review.example.com/`.
    #[serde(default)]
    pub uri: Option<String>,

    /// API token. [`TOKEN_ENV`] takes precedence.
    #[serde(default)]
    pub token: Option<String>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_review_timeout")]
    pub timeout_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            uri: None,
            token: None,
            timeout_secs: default_review_timeout(),
        }
    }
}

const fn default_review_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// LandConfig
// ---------------------------------------------------------------------------

/// How the source is brought up to date with the target before landing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStrategy {
    /// Merge the target into the source.
    #[default]
    Merge,
    /// Rebase the source onto the target.
    Rebase,
}

impl fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

/// What a policy gate does when its check fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatePolicy {
    /// Ask whether to continue.
    #[default]
    Prompt,
    /// Refuse to land.
    Block,
}

/// Land policy settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LandConfig {
    /// Target used when neither `--onto` nor the upstream chain names one.
    #[serde(default)]
    pub onto_default: Option<String>,

    /// Update strategy when no `--update-with-*` flag is given.
    #[serde(default)]
    pub update_default: UpdateStrategy,

    /// The repository forbids rewriting published history; land with a
    /// merge commit instead of squashing.
    #[serde(default)]
    pub history_immutable: bool,

    /// Refuse to land revisions that are not accepted.
    #[serde(default)]
    pub prevent_unaccepted: bool,

    /// Compare the local diff with the reviewed diff before landing.
    #[serde(default)]
    pub review_check: bool,

    /// Refuse to land while builds are running or failing.
    #[serde(default)]
    pub buildables_check: bool,

    /// Per-gate policies.
    #[serde(default)]
    pub gates: GateConfig,

    /// Unit-test gate.
    #[serde(default)]
    pub unit: UnitConfig,
}

/// Policies for the prompting revision gates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    /// The revision belongs to someone else.
    #[serde(default)]
    pub author: GatePolicy,

    /// The local diff differs from the reviewed diff.
    #[serde(default)]
    pub content: GatePolicy,

    /// The revision depends on revisions still open.
    #[serde(default)]
    pub dependencies: GatePolicy,
}

/// Unit-test gate settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitConfig {
    /// Shell command run in the working copy root (via `sh -c`).
    #[serde(default)]
    pub command: Option<String>,

    /// Kill the command after this many seconds.
    #[serde(default = "default_unit_timeout")]
    pub timeout_secs: u32,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_unit_timeout(),
        }
    }
}

const fn default_unit_timeout() -> u32 {
    600
}

// ---------------------------------------------------------------------------
// SubmitQueueConfig
// ---------------------------------------------------------------------------

/// Submit-queue delegation settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitQueueConfig {
    /// Land through the queue instead of pushing locally.
    #[serde(default)]
    pub enable: bool,

    /// Queue service base URI.
    #[serde(default)]
    pub uri: Option<String>,

    /// Also send a shadow request when landing locally.
    #[serde(default)]
    pub shadow: bool,

    /// Only queue revisions touching a path matching this regex.
    #[serde(default)]
    pub regex: Option<String>,

    /// Project tags for tasks filed when the queue is bypassed.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Users CC'd on those tasks.
    #[serde(default)]
    pub owners: Vec<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_queue_timeout")]
    pub timeout_secs: u64,

    /// Stage diffs under `refs/<prefix>/` instead of `refs/tags/<prefix>/`.
    #[serde(default)]
    pub custom_refs: bool,

    /// Staging ref namespace.
    #[serde(default = "default_ref_prefix")]
    pub ref_prefix: String,
}

impl Default for SubmitQueueConfig {
    fn default() -> Self {
        Self {
            enable: false,
            uri: None,
            shadow: false,
            regex: None,
            tags: Vec::new(),
            owners: Vec::new(),
            timeout_secs: default_queue_timeout(),
            custom_refs: false,
            ref_prefix: default_ref_prefix(),
        }
    }
}

const fn default_queue_timeout() -> u64 {
    60
}

fn default_ref_prefix() -> String {
    "phabricator".to_owned()
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error loading or validating configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl ArcConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML, unknown fields, or an
    ///   invalid queue regex, returns a [`ConfigError`].
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Load `.arcland.toml` from `root` and apply environment overrides.
    ///
    /// # Errors
    /// See [`ArcConfig::load`].
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(&root.join(CONFIG_FILE))?;
        config.apply_env(std::env::var(TOKEN_ENV).ok());
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, unknown fields, or an invalid
    /// queue regex.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Take the token from the environment when set.
    pub fn apply_env(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.review.token = Some(token);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pattern) = self.submit_queue.regex.as_deref()
            && let Err(e) = regex::Regex::new(pattern)
        {
            return Err(ConfigError {
                path: None,
                message: format!("submit_queue.regex is not a valid regex: {e}"),
            });
        }
        if self.submit_queue.enable && self.submit_queue.uri.is_none() {
            return Err(ConfigError {
                path: None,
                message: "submit_queue.enable is set but submit_queue.uri is missing".to_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = ArcConfig::default();
        assert_eq!(cfg.review.timeout_secs, 30);
        assert_eq!(cfg.land.update_default, UpdateStrategy::Merge);
        assert!(!cfg.land.history_immutable);
        assert!(!cfg.land.prevent_unaccepted);
        assert_eq!(cfg.land.gates.author, GatePolicy::Prompt);
        assert_eq!(cfg.land.unit.command, None);
        assert!(!cfg.submit_queue.enable);
        assert_eq!(cfg.submit_queue.ref_prefix, "phabricator");
        assert_eq!(cfg.submit_queue.timeout_secs, 60);
    }

    #[test]
    fn parse_empty_string() {
        assert_eq!(ArcConfig::parse("").unwrap(), ArcConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[review]
uri = "https://review.example.com/"
timeout_secs = 10

[land]
onto_default = "develop"
update_default = "rebase"
history_immutable = true
prevent_unaccepted = true
review_check = true
buildables_check = true

[land.gates]
dependencies = "block"

[land.unit]
command = "make test"

[submit_queue]
enable = true
uri = "https://sq.example.com"
shadow = true
regex = "^services/"
tags = ["infra"]
owners = ["alice"]
custom_refs = true
ref_prefix = "sq"
"#;
        let cfg = ArcConfig::parse(toml).unwrap();
        assert_eq!(cfg.review.uri.as_deref(), Some("https://review.example.com/"));
        assert_eq!(cfg.land.onto_default.as_deref(), Some("develop"));
        assert_eq!(cfg.land.update_default, UpdateStrategy::Rebase);
        assert!(cfg.land.history_immutable);
        assert_eq!(cfg.land.gates.dependencies, GatePolicy::Block);
        assert_eq!(cfg.land.gates.content, GatePolicy::Prompt);
        assert_eq!(cfg.land.unit.command.as_deref(), Some("make test"));
        assert!(cfg.submit_queue.enable);
        assert_eq!(cfg.submit_queue.tags, vec!["infra"]);
        assert_eq!(cfg.submit_queue.ref_prefix, "sq");
    }

    #[test]
    fn unknown_field_is_rejected_with_line() {
        let err = ArcConfig::parse("[land]\nonto = \"x\"\n").unwrap_err();
        assert!(err.message.contains("line 2"), "{}", err.message);
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = ArcConfig::parse("[submit_queue]\nregex = \"(\"\n").unwrap_err();
        assert!(err.message.contains("submit_queue.regex"));
    }

    #[test]
    fn enabled_queue_requires_uri() {
        let err = ArcConfig::parse("[submit_queue]\nenable = true\n").unwrap_err();
        assert!(err.message.contains("submit_queue.uri"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ArcConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg, ArcConfig::default());
    }

    #[test]
    fn load_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[land\n").unwrap();
        let err = ArcConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(err.to_string().starts_with(&path.display().to_string()));
    }

    #[test]
    fn env_token_overrides_file() {
        let mut cfg = ArcConfig::parse("[review]\ntoken = \"file-token\"\n").unwrap();
        cfg.apply_env(Some("env-token".to_owned()));
        assert_eq!(cfg.review.token.as_deref(), Some("env-token"));
        cfg.apply_env(Some(String::new()));
        assert_eq!(cfg.review.token.as_deref(), Some("env-token"));
    }
}
