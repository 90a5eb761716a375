use crate::{
    app::local::AppLocal,
    config::Config,
    contacts::Sheet,
    semantic::SemanticSearchService,
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::sync::Arc;

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Create the local application with its semantic search service.
    pub fn create_local_app(paths: &AppPaths, config: &Config) -> Result<AppLocal> {
        let semantic = Arc::new(SemanticSearchService::new(config.semantic_search.clone()));

        AppLocal::new(&paths.primary_path, &paths.repeating_path, semantic)
    }

    /// Get application paths, creating the base directory if needed
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;
        let paths = AppPaths::new(&base_path);

        std::fs::create_dir_all(&paths.base_path)
            .context("Failed to create application base directory")?;

        Ok(paths)
    }

    pub fn load_config(paths: &AppPaths) -> Result<Config> {
        Config::load_with(&paths.base_path)
    }

    /// `$CM_BASE_PATH`, falling back to `~/.local/share/cm`
    fn get_base_path() -> Result<String> {
        if let Ok(base_path) = std::env::var("CM_BASE_PATH") {
            return Ok(base_path);
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;

        Ok(format!("{}/.local/share/cm", home.to_string_lossy()))
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: String,
    pub primary_path: String,
    pub repeating_path: String,
}

impl AppPaths {
    pub fn new(base_path: &str) -> Self {
        let base_path = base_path.strip_suffix('/').unwrap_or(base_path).to_string();
        Self {
            primary_path: format!("{base_path}/{}", Sheet::Primary.file_name()),
            repeating_path: format!("{base_path}/{}", Sheet::Repeating.file_name()),
            base_path,
        }
    }
}
