pub mod check;
pub mod filters;
pub mod render;
pub mod validate;

use std::path::PathBuf;

use framefx_common::config::AppConfig;
use framefx_composition_model::FilterCatalog;

/// The catalog named on the command line, else the configured one, else
/// the built-in catalog.
pub(crate) fn load_catalog(
    config: &AppConfig,
    path: Option<PathBuf>,
) -> anyhow::Result<FilterCatalog> {
    match path.or_else(|| config.catalog_path.clone()) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading filter catalog");
            FilterCatalog::load(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load catalog {}: {e}", path.display()))
        }
        None => Ok(FilterCatalog::builtin()),
    }
}
