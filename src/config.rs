use crate::semantic::{DEFAULT_MODEL, DEFAULT_RANK_THRESHOLD, DEFAULT_SESSION_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3001";

/// Configuration for semantic search functionality
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Enable or disable semantic search
    #[serde(default = "default_semantic_enabled")]
    pub enabled: bool,

    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Similarity threshold for one-shot corpus ranking [-1.0, 1.0]
    #[serde(default = "default_rank_threshold")]
    pub rank_threshold: f32,

    /// Stricter threshold used when ranking against the precomputed
    /// session embeddings [-1.0, 1.0]
    #[serde(default = "default_session_threshold")]
    pub session_threshold: f32,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DEFAULT_MODEL.to_string(),
            rank_threshold: DEFAULT_RANK_THRESHOLD,
            session_threshold: DEFAULT_SESSION_THRESHOLD,
        }
    }
}

fn default_semantic_enabled() -> bool {
    true
}

fn default_semantic_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_rank_threshold() -> f32 {
    DEFAULT_RANK_THRESHOLD
}

fn default_session_threshold() -> f32 {
    DEFAULT_SESSION_THRESHOLD
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            semantic_search: SemanticSearchConfig::default(),
            base_path: String::new(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

impl Config {
    fn validate(&self) {
        if self.listen_addr.is_empty() {
            panic!("listen_addr must not be empty");
        }

        let sem = &self.semantic_search;
        if !(-1.0..=1.0).contains(&sem.rank_threshold) {
            panic!(
                "semantic_search.rank_threshold must be between -1.0 and 1.0, got {}",
                sem.rank_threshold
            );
        }
        if !(-1.0..=1.0).contains(&sem.session_threshold) {
            panic!(
                "semantic_search.session_threshold must be between -1.0 and 1.0, got {}",
                sem.session_threshold
            );
        }
        if sem.model.is_empty() {
            panic!("semantic_search.model must not be empty");
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn load_with(base_path: &str) -> Self {
        std::fs::create_dir_all(base_path).expect("couldnt create data directory");
        let config_path = Path::new(base_path).join("config.yaml");

        // create new if does not exist
        if !config_path.exists() {
            std::fs::write(
                &config_path,
                serde_yml::to_string(&Self::default()).unwrap(),
            )
            .expect("couldnt write default config");
        }

        let config_str =
            std::fs::read_to_string(&config_path).expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn load() -> Self {
        let base_path = std::env::var("POSTIT_BASE_PATH").unwrap_or(format!(
            "{}/.local/share/postit",
            homedir::my_home()
                .expect("couldnt find home dir")
                .expect("couldnt find home dir")
                .to_string_lossy()
        ));

        Self::load_with(&base_path)
    }

    pub fn save(&self) {
        let config_path = Path::new(&self.base_path).join("config.yaml");
        let temp_path = format!("{}-tmp", config_path.display());

        let config_str = serde_yml::to_string(&self).unwrap();
        std::fs::write(&temp_path, config_str).unwrap();
        std::fs::rename(&temp_path, &config_path).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_load_writes_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let base_path = tmp.path().to_str().unwrap();

        let config = Config::load_with(base_path);
        assert!(config.semantic_search.enabled);
        assert_eq!(config.semantic_search.model, DEFAULT_MODEL);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert!(tmp.path().join("config.yaml").exists());
    }

    #[test]
    fn load_roundtrips_saved_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let base_path = tmp.path().to_str().unwrap();

        let mut config = Config::load_with(base_path);
        config.semantic_search.session_threshold = 0.5;
        config.save();

        let reloaded = Config::load_with(base_path);
        assert_eq!(reloaded.semantic_search.session_threshold, 0.5);
    }

    #[test]
    #[should_panic(expected = "rank_threshold")]
    fn out_of_range_threshold_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let base_path = tmp.path().to_str().unwrap();

        std::fs::write(
            tmp.path().join("config.yaml"),
            "semantic_search:\n  rank_threshold: 3.0\n",
        )
        .unwrap();

        Config::load_with(base_path);
    }
}
