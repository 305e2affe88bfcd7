//! Layered configuration.
//!
//! Sources, highest priority first:
//! 1. Local: `<git-dir>/stackit/config.toml` (per-repo, per-user; holds the
//!    trunk list and any personal overrides)
//! 2. User: `~/.config/stackit/config.toml` (personal defaults)
//! 3. Repo shared: `.stackit/config.toml` (committed; supplies `remote`)
//!
//! The trunk set lives in the local layer: which branches are trunks is a
//! property of the clone, not of the user.

use anyhow::{bail, Context, Result};
use chrono::Local;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::state::find_git_root;

fn default_remote() -> String {
    "origin".to_string()
}

fn default_pattern() -> String {
    "{message}".to_string()
}

fn default_undo_depth() -> usize {
    50
}

fn default_true() -> bool {
    true
}

/// Branch naming configuration.
///
/// The pattern accepts `{username}`, `{date}`, `{scope}` and `{message}`
/// placeholders. `{message}` is mandatory; see [`validate_pattern`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
        }
    }
}

/// Undo snapshot retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoConfig {
    /// Number of snapshots kept in the ring before the oldest is evicted.
    #[serde(default = "default_undo_depth")]
    pub depth: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            depth: default_undo_depth(),
        }
    }
}

/// Sync behavior toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delete local branches whose PR was closed without merging.
    #[serde(default = "default_true")]
    pub delete_closed: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { delete_closed: true }
    }
}

/// Repo-shared configuration (`.stackit/config.toml`, committed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default = "default_remote")]
    pub remote: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
        }
    }
}

/// User-level defaults (`~/.config/stackit/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub naming: Option<NamingConfig>,
    #[serde(default)]
    pub undo: Option<UndoConfig>,
    #[serde(default)]
    pub sync: Option<SyncConfig>,
}

/// Local per-clone configuration (`<git-dir>/stackit/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocalConfig {
    /// Trunk branches, primary first. Empty means uninitialized.
    #[serde(default)]
    pub trunks: Vec<String>,
    #[serde(default)]
    pub naming: Option<NamingConfig>,
    #[serde(default)]
    pub undo: Option<UndoConfig>,
    #[serde(default)]
    pub sync: Option<SyncConfig>,
}

/// Merged view of all layers.
#[derive(Debug, Clone)]
pub struct Config {
    pub trunks: Vec<String>,
    pub naming: NamingConfig,
    pub undo: UndoConfig,
    pub sync: SyncConfig,
    pub remote: String,
}

impl Config {
    /// Load and merge all layers: local > user > defaults.
    pub fn load() -> Result<Self> {
        let repo = Self::load_toml::<RepoConfig>(Self::repo_config_path().ok()).unwrap_or_default();
        let user = Self::load_toml::<UserConfig>(Self::user_config_path().ok()).unwrap_or_default();
        let local = Self::load_toml::<LocalConfig>(Self::local_config_path().ok()).unwrap_or_default();

        let mut naming = local.naming.clone().or(user.naming).unwrap_or_default();
        if let Err(e) = validate_pattern(&naming.pattern) {
            eprintln!("Warning: {}; using the default pattern", e);
            naming = NamingConfig::default();
        }

        Ok(Config {
            trunks: local.trunks.clone(),
            naming,
            undo: local.undo.or(user.undo).unwrap_or_default(),
            sync: local.sync.or(user.sync).unwrap_or_default(),
            remote: repo.remote,
        })
    }

    fn load_toml<T: for<'de> Deserialize<'de> + Default>(path: Option<PathBuf>) -> Option<T> {
        let path = path?;
        if !path.exists() {
            return None;
        }
        let content = fs::read_to_string(&path).ok()?;
        match toml::from_str(&content) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                eprintln!("Warning: config file {:?} is invalid ({}), using defaults", path, e);
                None
            }
        }
    }

    pub fn user_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine user config directory")?;
        Ok(config_dir.join("stackit").join("config.toml"))
    }

    pub fn local_config_path() -> Result<PathBuf> {
        let git_root = find_git_root()?;
        Ok(git_root.join(".git").join("stackit").join("config.toml"))
    }

    pub fn repo_config_path() -> Result<PathBuf> {
        let git_root = find_git_root()?;
        Ok(git_root.join(".stackit").join("config.toml"))
    }

    /// The primary trunk, if any trunk is configured.
    pub fn primary_trunk(&self) -> Option<&str> {
        self.trunks.first().map(|s| s.as_str())
    }

    /// The primary trunk, failing with the initialization hint when absent.
    pub fn require_trunk(&self) -> Result<String> {
        match self.primary_trunk() {
            Some(t) => Ok(t.to_string()),
            None => Err(crate::errors::StackError::NotInitialized.into()),
        }
    }

    pub fn is_trunk(&self, branch: &str) -> bool {
        self.trunks.iter().any(|t| t == branch)
    }

    /// Generate a branch name from the configured pattern.
    ///
    /// An empty scope renders `{scope}` as the empty string with the
    /// separators around it collapsed, so `a/{scope}/b` becomes `a/b`.
    pub fn generate_branch_name(&self, message: &str, scope: Option<&str>, username: &str) -> String {
        render_branch_name(&self.naming.pattern, message, scope, username)
    }

    pub fn save_local(config: &LocalConfig) -> Result<()> {
        let path = Self::local_config_path()?;
        write_toml(&path, config)
    }

    pub fn save_user(config: &UserConfig) -> Result<()> {
        let path = Self::user_config_path()?;
        write_toml(&path, config)
    }

    pub fn load_local() -> Result<LocalConfig> {
        let path = Self::local_config_path()?;
        if !path.exists() {
            return Ok(LocalConfig::default());
        }
        let content = fs::read_to_string(&path).context("Failed to read local config")?;
        toml::from_str(&content).context("Local config file is invalid TOML")
    }
}

fn write_toml<T: Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let content = toml::to_string_pretty(value).context("Failed to serialize config")?;
    let temp_path = path.with_extension("toml.tmp");
    fs::write(&temp_path, content).context("Failed to write config file")?;
    fs::rename(&temp_path, path).context("Failed to finalize config file")?;
    Ok(())
}

/// Refuse patterns that omit the `{message}` placeholder.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if !pattern.contains("{message}") {
        bail!(
            "Branch name pattern must contain the {{message}} placeholder (got '{}')",
            pattern
        );
    }
    Ok(())
}

/// Expand a branch name pattern and sanitize the result into a legal ref.
pub fn render_branch_name(pattern: &str, message: &str, scope: Option<&str>, username: &str) -> String {
    let date = Local::now().format("%m-%d").to_string();
    let expanded = pattern
        .replace("{username}", username)
        .replace("{date}", &date)
        .replace("{scope}", scope.unwrap_or(""))
        .replace("{message}", message);

    sanitize_ref_name(&expanded)
}

/// Replace spaces with `-`, strip characters git refuses in ref names, and
/// collapse the separator runs left behind by empty placeholders.
pub fn sanitize_ref_name(raw: &str) -> String {
    let dashed = raw.trim().replace(' ', "-");

    let illegal = Regex::new(r"[^A-Za-z0-9._/-]").unwrap();
    let stripped = illegal.replace_all(&dashed, "").to_string();
    // ".." and "@{" are rejected by git even when each character is legal
    let stripped = stripped.replace("..", ".");

    let collapse_dash = Regex::new(r"-{2,}").unwrap();
    let collapse_slash = Regex::new(r"/{2,}").unwrap();
    let mixed = Regex::new(r"(-/|/-)").unwrap();

    let mut name = collapse_dash.replace_all(&stripped, "-").to_string();
    name = collapse_slash.replace_all(&name, "/").to_string();
    loop {
        let next = mixed.replace_all(&name, "/").to_string();
        let next = collapse_slash.replace_all(&next, "/").to_string();
        if next == name {
            break;
        }
        name = next;
    }

    name.trim_matches(|c| c == '-' || c == '/' || c == '.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pattern_requires_message() {
        assert!(validate_pattern("{message}").is_ok());
        assert!(validate_pattern("{username}/{date}-{message}").is_ok());
        assert!(validate_pattern("{username}/{date}").is_err());
    }

    #[test]
    fn test_render_replaces_spaces() {
        let name = render_branch_name("{message}", "add login flow", None, "alice");
        assert_eq!(name, "add-login-flow");
    }

    #[test]
    fn test_render_with_all_placeholders() {
        let name = render_branch_name("{username}/{scope}/{message}", "fix bug", Some("AUTH"), "alice");
        assert_eq!(name, "alice/AUTH/fix-bug");
    }

    #[test]
    fn test_empty_scope_collapses_separators() {
        let name = render_branch_name("{username}/{scope}/{message}", "fix bug", None, "alice");
        assert_eq!(name, "alice/fix-bug");

        let name = render_branch_name("{date}-{scope}-{message}", "fix bug", None, "alice");
        let date = Local::now().format("%m-%d").to_string();
        assert_eq!(name, format!("{}-fix-bug", date));
    }

    #[test]
    fn test_sanitize_strips_illegal_chars() {
        assert_eq!(sanitize_ref_name("a b~c^d:e?f*g[h"), "a-bcdefgh");
        assert_eq!(sanitize_ref_name("feat..ure"), "feat.ure");
        assert_eq!(sanitize_ref_name("/leading/and/trailing/"), "leading/and/trailing");
    }

    #[test]
    fn test_merge_prefers_local_layer() {
        // Merge logic is Option::or; exercised directly on the layers.
        let local = LocalConfig {
            trunks: vec!["main".into()],
            naming: Some(NamingConfig {
                pattern: "{username}/{message}".into(),
            }),
            undo: None,
            sync: None,
        };
        let user = UserConfig {
            naming: Some(NamingConfig {
                pattern: "{date}-{message}".into(),
            }),
            undo: Some(UndoConfig { depth: 10 }),
            sync: None,
        };

        let naming = local.naming.or(user.naming).unwrap();
        assert_eq!(naming.pattern, "{username}/{message}");
        let undo = local.undo.or(user.undo).unwrap();
        assert_eq!(undo.depth, 10);
    }

    #[test]
    fn test_parse_local_toml() {
        let parsed: LocalConfig = toml::from_str(
            r#"
trunks = ["main", "release-1.x"]

[naming]
pattern = "{username}/{scope}/{message}"

[undo]
depth = 25
"#,
        )
        .unwrap();
        assert_eq!(parsed.trunks, vec!["main", "release-1.x"]);
        assert_eq!(parsed.naming.unwrap().pattern, "{username}/{scope}/{message}");
        assert_eq!(parsed.undo.unwrap().depth, 25);
    }

    #[test]
    fn test_parse_empty_toml_defaults() {
        let parsed: LocalConfig = toml::from_str("").unwrap();
        assert!(parsed.trunks.is_empty());
        assert!(parsed.naming.is_none());
    }
}
