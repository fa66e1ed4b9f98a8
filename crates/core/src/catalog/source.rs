use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::catalog::rows::CatalogRows;
use crate::catalog::CatalogError;

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Human readable location for logs.
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<CatalogRows, CatalogError>;
}

/// Reads a JSON or TOML export of the shop sheets. The format follows the file
/// extension; anything other than `.toml` is parsed as JSON.
#[derive(Clone, Debug)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(&self, raw: &str) -> Result<CatalogRows, CatalogError> {
        let is_toml =
            self.path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            CatalogRows::from_toml(raw).map_err(|error| error.to_string())
        } else {
            CatalogRows::from_json(raw).map_err(|error| error.to_string())
        };
        parsed.map_err(|message| CatalogError::Parse { location: self.describe(), message })
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self) -> Result<CatalogRows, CatalogError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|error| {
            CatalogError::Source { location: self.describe(), message: error.to_string() }
        })?;
        self.parse(&raw)
    }
}

/// Serves rows held in memory; used by tests and the local chat command.
#[derive(Debug, Default)]
pub struct StaticCatalogSource {
    rows: Mutex<CatalogRows>,
}

impl StaticCatalogSource {
    pub fn new(rows: CatalogRows) -> Self {
        Self { rows: Mutex::new(rows) }
    }

    pub fn set(&self, rows: CatalogRows) {
        match self.rows.lock() {
            Ok(mut guard) => *guard = rows,
            Err(poisoned) => *poisoned.into_inner() = rows,
        }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    fn describe(&self) -> String {
        "static".to_owned()
    }

    async fn fetch(&self) -> Result<CatalogRows, CatalogError> {
        let rows = match self.rows.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Ok(rows)
    }
}
