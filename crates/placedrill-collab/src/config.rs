//! Application configuration and explainer factory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use placedrill_core::config::EngineConfig;
use placedrill_core::model::UiLang;
use placedrill_core::traits::Explainer;

use crate::gemini::GeminiExplainer;
use crate::mock::MockExplainer;

/// Configuration for the explanation collaborator.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExplainerConfig {
    Gemini {
        api_key: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
    },
    /// Deterministic stand-in for offline runs and the simulator.
    Mock {
        #[serde(default)]
        flip: bool,
    },
}

impl std::fmt::Debug for ExplainerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplainerConfig::Gemini {
                api_key: _,
                model,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("model", model)
                .field("base_url", base_url)
                .finish(),
            ExplainerConfig::Mock { flip } => {
                f.debug_struct("Mock").field("flip", flip).finish()
            }
        }
    }
}

/// Top-level placedrill configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedrillConfig {
    /// Directory holding placement.json / exercises.json / rules.json.
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    /// SQLite database path.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Collaborator used for flip evaluation; absent means none.
    #[serde(default)]
    pub explainer: Option<ExplainerConfig>,
    /// UI language offered before the learner picks one.
    #[serde(default)]
    pub default_lang: UiLang,
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("./content")
}
fn default_database() -> PathBuf {
    PathBuf::from("./placedrill.db")
}

impl Default for PlacedrillConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            database: default_database(),
            engine: EngineConfig::default(),
            explainer: None,
            default_lang: UiLang::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_explainer_config(config: &ExplainerConfig) -> ExplainerConfig {
    match config {
        ExplainerConfig::Gemini {
            api_key,
            model,
            base_url,
        } => ExplainerConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            model: model.clone(),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ExplainerConfig::Mock { flip } => ExplainerConfig::Mock { flip: *flip },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `placedrill.toml` in the current directory
/// 2. `~/.config/placedrill/config.toml`
///
/// Environment variable override: `PLACEDRILL_GEMINI_KEY`.
pub fn load_config() -> Result<PlacedrillConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PlacedrillConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("placedrill.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<PlacedrillConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => PlacedrillConfig::default(),
    };

    if let Ok(key) = std::env::var("PLACEDRILL_GEMINI_KEY") {
        match &mut config.explainer {
            Some(ExplainerConfig::Gemini { api_key, .. }) => *api_key = key,
            _ => {
                config.explainer = Some(ExplainerConfig::Gemini {
                    api_key: key,
                    model: None,
                    base_url: None,
                });
            }
        }
    }

    config.explainer = config.explainer.as_ref().map(resolve_explainer_config);
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("placedrill"))
}

/// Create an explainer instance from its configuration.
pub fn create_explainer(config: &ExplainerConfig) -> Box<dyn Explainer> {
    match config {
        ExplainerConfig::Gemini {
            api_key,
            model,
            base_url,
        } => Box::new(GeminiExplainer::new(
            api_key,
            model.clone(),
            base_url.clone(),
        )),
        ExplainerConfig::Mock { flip } => Box::new(MockExplainer::with_fixed_flip(*flip)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_PLACEDRILL_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_PLACEDRILL_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_PLACEDRILL_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        std::env::remove_var("_PLACEDRILL_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = PlacedrillConfig::default();
        assert!(config.explainer.is_none());
        assert_eq!(config.engine.max_regenerations, 2);
        assert_eq!(config.default_lang, UiLang::Uk);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
content_dir = "./data"
database = "./state.db"
default_lang = "en"

[engine]
max_regenerations = 3
batch_max = 5

[explainer]
type = "gemini"
api_key = "test-key"
model = "gemini-2.0-flash"
"#;
        let config: PlacedrillConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.max_regenerations, 3);
        assert_eq!(config.engine.batch_max, 5);
        assert_eq!(config.default_lang, UiLang::En);
        assert!(matches!(
            config.explainer,
            Some(ExplainerConfig::Gemini { .. })
        ));
    }

    #[test]
    fn debug_masks_api_key() {
        let config = ExplainerConfig::Gemini {
            api_key: "secret-key".into(),
            model: None,
            base_url: None,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn explicit_missing_path_errors() {
        assert!(load_config_from(Some(Path::new("/nonexistent/placedrill.toml"))).is_err());
    }
}
