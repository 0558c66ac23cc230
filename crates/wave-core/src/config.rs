//! Project and user configuration.
//!
//! Project settings live in `.wave/config.toml`; per-user settings in the
//! platform config directory. Missing files mean defaults.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::io::{self, IsTerminal};
use std::path::Path;

use crate::error::ErrorCode;
use crate::revision::history::DEFAULT_PAGE_SIZE;

/// Project config path, relative to the project root.
pub const PROJECT_CONFIG: &str = ".wave/config.toml";

/// Environment override for [`HistoryConfig::page_size`].
pub const PAGE_SIZE_ENV: &str = "WAVE_HISTORY_PAGE_SIZE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub undo: UndoConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Deltas requested per history page.
    #[serde(default)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndoConfig {
    /// Undo groups kept per wavelet. Unbounded when absent.
    #[serde(default)]
    pub max_checkpoints: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub history_page_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
    pub page_size: usize,
}

/// Parse a TOML file into `T`, or `T::default()` when the file is absent.
fn read_toml<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    toml::from_str(&content).with_context(|| {
        format!("[{}] Failed to parse {}", ErrorCode::ConfigParseError, path.display())
    })
}

/// `.wave/config.toml` under `project_root`.
///
/// # Errors
///
/// Fails when the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    read_toml(&project_root.join(PROJECT_CONFIG))
}

/// `wave/config.toml` in the platform config directory.
///
/// # Errors
///
/// Fails when the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    dirs::config_dir().map_or_else(|| Ok(UserConfig::default()), |dir| {
        read_toml(&dir.join("wave/config.toml"))
    })
}

/// Load both files and apply environment overrides.
///
/// # Errors
///
/// Fails when either config file is malformed.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let resolved_output = if cli_json {
        "json"
    } else {
        resolve_output(env::var("FORMAT").ok().as_deref(), user.output.as_deref())
    };
    let page_size = resolve_page_size(&project, &user, env::var(PAGE_SIZE_ENV).ok().as_deref());
    tracing::debug!(resolved_output, page_size, "configuration resolved");

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output: resolved_output.to_string(),
        page_size,
    })
}

/// Environment, then project file, then user file, then the built-in
/// default. Zero or unparsable values are ignored.
fn resolve_page_size(project: &ProjectConfig, user: &UserConfig, env_value: Option<&str>) -> usize {
    env_value
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .into_iter()
        .chain(project.history.page_size)
        .chain(user.history_page_size)
        .find(|n| *n > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

fn output_alias(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pretty" | "human" => Some("pretty"),
        "text" | "plain" => Some("text"),
        "json" => Some("json"),
        _ => None,
    }
}

/// `FORMAT`, then the user file, then pretty on a terminal and text otherwise.
fn resolve_output(env_format: Option<&str>, user_output: Option<&str>) -> &'static str {
    env_format
        .and_then(output_alias)
        .or_else(|| user_output.and_then(output_alias))
        .unwrap_or_else(|| {
            if io::stdout().is_terminal() {
                "pretty"
            } else {
                "text"
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.history.page_size, None);
        assert_eq!(cfg.undo.max_checkpoints, None);
    }

    #[test]
    fn project_config_parses_sections() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        std::fs::create_dir_all(root.path().join(".wave")).expect("create .wave");
        std::fs::write(
            root.path().join(".wave/config.toml"),
            "[history]\npage_size = 25\n\n[undo]\nmax_checkpoints = 10\n",
        )
        .expect("write config");

        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.history.page_size, Some(25));
        assert_eq!(cfg.undo.max_checkpoints, Some(10));
    }

    #[test]
    fn malformed_project_config_is_an_error() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        std::fs::create_dir_all(root.path().join(".wave")).expect("create .wave");
        std::fs::write(root.path().join(".wave/config.toml"), "[history\n").expect("write");

        let err = load_project_config(root.path()).expect_err("parse must fail");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn user_config_reads_output_and_page_size() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        let path = root.path().join("config.toml");
        std::fs::write(&path, "output = \"json\"\nhistory_page_size = 50\n").expect("write");

        let cfg: UserConfig = read_toml(&path).expect("load should succeed");
        assert_eq!(cfg.output.as_deref(), Some("json"));
        assert_eq!(cfg.history_page_size, Some(50));
    }

    #[test]
    fn page_size_precedence() {
        let mut project = ProjectConfig::default();
        let user = UserConfig {
            history_page_size: Some(50),
            ..UserConfig::default()
        };
        assert_eq!(resolve_page_size(&project, &user, None), 50);
        assert_eq!(resolve_page_size(&project, &UserConfig::default(), None), 200);

        project.history.page_size = Some(30);
        assert_eq!(resolve_page_size(&project, &user, None), 30);
        assert_eq!(resolve_page_size(&project, &user, Some("7")), 7);
        assert_eq!(resolve_page_size(&project, &user, Some("0")), 30);
        assert_eq!(resolve_page_size(&project, &user, Some("many")), 30);
    }

    #[test]
    fn env_format_beats_user_output() {
        assert_eq!(resolve_output(Some("json"), Some("pretty")), "json");
        assert_eq!(resolve_output(Some("bogus"), Some("pretty")), "pretty");
    }

    #[test]
    fn aliases_are_normalized() {
        assert_eq!(resolve_output(Some("human"), Some("plain")), "pretty");
        assert_eq!(resolve_output(Some("PLAIN"), None), "text");
    }
}
