//! Curated identity tables.
//!
//! The alias, canonical-name, role and principal tables are supplied
//! alongside the engine, never learned. They are loaded once into an
//! immutable [`CuratedTables`] value and handed explicitly to the resolver
//! and the profile builder.
//!
//! Tables are read from a TOML file; when the file does not exist the
//! built-in seed shipped with the crate is used instead.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::GraphError;

const BUILTIN: &str = include_str!("../curated.toml");

/// Role assigned to identities without a curated role.
pub const DEFAULT_ROLE: &str = "unknown";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CuratedTables {
    /// One-hop `raw -> next` mappings. May chain.
    #[serde(default)]
    pub aliases: HashMap<String, String>,

    /// Preferred display name per canonical address.
    #[serde(default)]
    pub canonical_names: HashMap<String, String>,

    /// Free-form role tag per canonical address.
    #[serde(default)]
    pub roles: HashMap<String, String>,

    /// Canonical addresses treated as the central subjects.
    #[serde(default)]
    pub principals: BTreeSet<String>,
}

impl CuratedTables {
    /// Load tables from a TOML file, falling back to the built-in seed when
    /// the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Self::builtin();
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read curation file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse curation file: {}", path.display()))
    }

    /// The curated seed compiled into the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN).context("Built-in curation tables are malformed")
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let tables: Self = toml::from_str(contents)?;
        tables.validate()?;
        Ok(tables)
    }

    fn validate(&self) -> Result<(), GraphError> {
        if let Some((alias, _)) = self
            .aliases
            .iter()
            .find(|(alias, target)| alias.is_empty() || target.is_empty())
        {
            return Err(GraphError::InvalidCuration(format!(
                "alias entry {:?} has an empty side",
                alias
            )));
        }
        if self.principals.iter().any(|p| p.is_empty()) {
            return Err(GraphError::InvalidCuration(
                "principal set contains an empty address".to_string(),
            ));
        }
        Ok(())
    }

    pub fn canonical_name(&self, canonical: &str) -> Option<&str> {
        self.canonical_names
            .get(canonical)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn role(&self, canonical: &str) -> &str {
        self.roles
            .get(canonical)
            .map(String::as_str)
            .unwrap_or(DEFAULT_ROLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_tables_parse() {
        let tables = CuratedTables::builtin().unwrap();
        assert!(tables.principals.contains("jeevacation@gmail.com"));
        assert_eq!(
            tables.aliases.get("jeffrey epstein").map(String::as_str),
            Some("jeevacation@gmail.com")
        );
        assert_eq!(tables.canonical_name("gmax1@ellmax.com"), Some("Ghislaine Maxwell"));
        assert_eq!(tables.role("dkiesq@aol.com"), "legal");
        assert_eq!(tables.role("nobody@example.com"), DEFAULT_ROLE);
    }

    #[test]
    fn test_builtin_keeps_redaction_glyphs() {
        let tables = CuratedTables::builtin().unwrap();
        assert!(tables
            .aliases
            .contains_key("jeevacation@gmail.com\u{2588}"));
    }

    #[test]
    fn test_empty_alias_rejected() {
        let err = CuratedTables::from_toml("[aliases]\n\"\" = \"a@x.com\"\n").unwrap_err();
        assert!(err.to_string().contains("empty side"));
    }

    #[test]
    fn test_load_missing_file_uses_builtin() {
        let dir = tempfile::TempDir::new().unwrap();
        let tables = CuratedTables::load(&dir.path().join("absent.toml")).unwrap();
        assert!(!tables.aliases.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("curation.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "principals = [\"boss@corp.com\"]\n\n[aliases]\n\"b\" = \"boss@corp.com\"\n\n[roles]\n\"boss@corp.com\" = \"principal\""
        )
        .unwrap();

        let tables = CuratedTables::load(&path).unwrap();
        assert_eq!(tables.aliases.len(), 1);
        assert_eq!(tables.role("boss@corp.com"), "principal");
        assert!(tables.canonical_names.is_empty());
    }
}
