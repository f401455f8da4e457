//! Package catalog loading and validation

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use strap_errors::{EngineError, Error};
use strap_types::Package;

/// Ordered set of packages the engine operates on
///
/// Declaration order is the order every phase visits packages in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    packages: Vec<Package>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "package")]
    packages: Vec<Package>,
}

impl Catalog {
    /// Build a catalog, rejecting empty or duplicate ids
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CatalogCorrupted` naming the offending id.
    pub fn new(packages: Vec<Package>) -> Result<Self, Error> {
        let mut seen = HashSet::with_capacity(packages.len());
        for package in &packages {
            if package.id.trim().is_empty() {
                return Err(EngineError::CatalogCorrupted {
                    message: "package with empty id".to_string(),
                }
                .into());
            }
            if !seen.insert(package.id.as_str()) {
                return Err(EngineError::CatalogCorrupted {
                    message: format!("duplicate package id '{}'", package.id),
                }
                .into());
            }
        }
        Ok(Self { packages })
    }

    /// Parse a catalog from TOML with one `[[package]]` table per package
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CatalogCorrupted` if the document does not parse
    /// or fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self, Error> {
        let file: CatalogFile =
            toml::from_str(contents).map_err(|e| EngineError::CatalogCorrupted {
                message: e.to_string(),
            })?;
        Self::new(file.packages)
    }

    /// Load a catalog file
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CatalogUnreadable` if the file cannot be read,
    /// otherwise as [`Catalog::from_toml_str`].
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| EngineError::CatalogUnreadable {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
        let catalog = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), packages = catalog.len(), "loaded catalog");
        Ok(catalog)
    }

    #[must_use]
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strap_types::{PackageKind, Version};

    #[test]
    fn parses_packages_in_declaration_order() {
        let catalog = Catalog::from_toml_str(
            r#"
            [[package]]
            id = "runtime"
            kind = "msi"
            version = "2.1.0"
            per_machine = true

            [[package]]
            id = "hotfix"
            kind = "msp"

            [package.properties]
            patch = "apply-hotfix"
            "#,
        )
        .unwrap();

        let ids: Vec<_> = catalog.packages().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["runtime", "hotfix"]);
        assert_eq!(
            catalog.get("runtime").unwrap().version,
            Some(Version::new(2, 1, 0))
        );
        let hotfix = catalog.get("hotfix").unwrap();
        assert_eq!(hotfix.kind, PackageKind::Msp);
        assert_eq!(hotfix.property("patch"), Some("apply-hotfix"));
    }

    #[test]
    fn duplicate_and_empty_ids_are_structural() {
        let dup = Catalog::new(vec![
            Package::new("a", PackageKind::Msi),
            Package::new("a", PackageKind::Exe),
        ])
        .unwrap_err();
        assert!(matches!(
            dup,
            Error::Engine(EngineError::CatalogCorrupted { .. })
        ));
        assert!(dup.to_string().contains("duplicate package id 'a'"));

        let empty = Catalog::new(vec![Package::new(" ", PackageKind::Msi)]).unwrap_err();
        assert!(matches!(
            empty,
            Error::Engine(EngineError::CatalogCorrupted { .. })
        ));
    }

    #[test]
    fn empty_document_is_an_empty_catalog() {
        assert!(Catalog::from_toml_str("").unwrap().is_empty());
        assert!(Catalog::from_toml_str("[[package]]\nid = 3").is_err());
    }
}
