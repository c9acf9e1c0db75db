//! Filter catalog: maps filter ids to backend filter names and defaults.
//!
//! The catalog is data, not code. The built-in table can be replaced by
//! loading another JSON table; the engine only ever reads it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::params::{ParamMap, ParamValue, Point2D, Rgba};

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    /// Identifier referenced by composition instructions.
    pub id: String,

    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,

    /// Filter name understood by the rendering backend.
    pub backend_name: String,

    /// Parameters bound before instruction overrides.
    #[serde(default)]
    pub defaults: ParamMap,
}

impl FilterDescriptor {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        backend_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            backend_name: backend_name.into(),
            defaults: ParamMap::new(),
        }
    }

    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }
}

/// Read-only lookup table of filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCatalog {
    entries: BTreeMap<String, FilterDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    filters: Vec<FilterDescriptor>,
}

impl FilterCatalog {
    /// Build a catalog, rejecting duplicate ids.
    pub fn new(filters: Vec<FilterDescriptor>) -> Result<Self, CatalogError> {
        let mut entries = BTreeMap::new();
        for filter in filters {
            if filter.id.trim().is_empty() {
                return Err(CatalogError::EmptyId {
                    backend_name: filter.backend_name,
                });
            }
            if entries.contains_key(&filter.id) {
                return Err(CatalogError::DuplicateId(filter.id));
            }
            entries.insert(filter.id.clone(), filter);
        }
        Ok(Self { entries })
    }

    /// The default table, backed by the software kernels.
    pub fn builtin() -> Self {
        let filters = vec![
            FilterDescriptor::new("sepia", "Sepia", "sepia_tone").with_default("intensity", 1.0),
            FilterDescriptor::new("mono", "Mono", "color_monochrome")
                .with_default("color", Rgba::new(0.6, 0.45, 0.3, 1.0))
                .with_default("intensity", 1.0),
            FilterDescriptor::new("noir", "Noir", "photo_noir"),
            FilterDescriptor::new("invert", "Invert", "color_invert"),
            FilterDescriptor::new("vivid", "Vivid", "color_controls")
                .with_default("brightness", 0.0)
                .with_default("contrast", 1.1)
                .with_default("saturation", 1.4),
            FilterDescriptor::new("fade", "Fade", "color_controls")
                .with_default("brightness", 0.05)
                .with_default("contrast", 0.85)
                .with_default("saturation", 0.6),
            FilterDescriptor::new("chrome", "Chrome", "color_controls")
                .with_default("brightness", 0.02)
                .with_default("contrast", 1.2)
                .with_default("saturation", 1.2),
            FilterDescriptor::new("vignette", "Vignette", "vignette")
                .with_default("intensity", 0.8)
                .with_default("radius", 0.75)
                .with_default("center", Point2D::new(0.5, 0.5)),
            FilterDescriptor::new("exposure", "Exposure", "exposure_adjust").with_default("ev", 0.5),
            FilterDescriptor::new("gamma", "Gamma", "gamma_adjust").with_default("power", 0.8),
        ];
        Self {
            entries: filters.into_iter().map(|f| (f.id.clone(), f)).collect(),
        }
    }

    /// Parse a catalog table (`{"filters": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json).map_err(CatalogError::Parse)?;
        Self::new(file.filters)
    }

    /// Load a catalog table from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: &str) -> Option<&FilterDescriptor> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterDescriptor> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Errors raised while building or loading a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Duplicate filter id: {0}")]
    DuplicateId(String),

    #[error("Filter with backend name {backend_name:?} has an empty id")]
    EmptyId { backend_name: String },

    #[error("Invalid catalog file: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<CatalogError> for framefx_common::FramefxError {
    fn from(err: CatalogError) -> Self {
        framefx_common::FramefxError::catalog(err.to_string())
    }
}
