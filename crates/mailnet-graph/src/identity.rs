//! Identity resolution.
//!
//! Maps every raw address spelling onto a single canonical identity by
//! following the curated alias chain. Resolution is a pure function of the
//! alias table; the resolver holds no other state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;

use crate::curation::CuratedTables;

/// Resolves raw addresses to canonical identities.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    aliases: HashMap<String, String>,
    principals: BTreeSet<String>,
}

impl IdentityResolver {
    pub fn new(tables: &CuratedTables) -> Self {
        Self {
            aliases: tables.aliases.clone(),
            principals: tables.principals.clone(),
        }
    }

    /// Follow the alias chain from `address` until a value that is not an
    /// alias key is reached.
    ///
    /// A chain that runs into a cycle stops there and resolves to the
    /// smallest member of the cycle, so every entry point into the same cycle
    /// lands on the same identity and resolving that identity again is a
    /// no-op. This departs on purpose from stopping at the value held when
    /// the repeat is seen, which would give different answers per entry point.
    pub fn resolve(&self, address: &str) -> String {
        let mut path: Vec<&str> = vec![address];
        let mut position: HashMap<&str, usize> = HashMap::new();
        position.insert(address, 0);

        let mut current = address;
        while let Some(next) = self.aliases.get(current) {
            if let Some(&start) = position.get(next.as_str()) {
                let cycle = &path[start..];
                if cycle.len() > 1 {
                    warn!("Alias cycle detected through {:?}", cycle);
                }
                return cycle.iter().min().copied().unwrap_or(current).to_string();
            }
            position.insert(next.as_str(), path.len());
            path.push(next.as_str());
            current = next.as_str();
        }

        current.to_string()
    }

    /// Whether `address` resolves into the principal set.
    pub fn is_principal(&self, address: &str) -> bool {
        let canonical = self.resolve(address);
        self.principals.contains(&canonical)
    }

    /// Every curated alias key paired with its fully resolved target.
    pub fn resolved_aliases(&self) -> BTreeMap<String, String> {
        self.aliases
            .keys()
            .map(|alias| (alias.clone(), self.resolve(alias)))
            .collect()
    }

    pub fn principals(&self) -> &BTreeSet<String> {
        &self.principals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(aliases: &[(&str, &str)], principals: &[&str]) -> CuratedTables {
        CuratedTables {
            aliases: aliases
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            principals: principals.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_follows_chain() {
        let resolver = IdentityResolver::new(&tables(
            &[("raw", "raw2"), ("raw2", "canon@x.com")],
            &[],
        ));
        assert_eq!(resolver.resolve("raw"), "canon@x.com");
        assert_eq!(resolver.resolve("raw2"), "canon@x.com");
        assert_eq!(resolver.resolve("canon@x.com"), "canon@x.com");
        assert_eq!(resolver.resolve("stranger@y.com"), "stranger@y.com");
    }

    #[test]
    fn test_resolve_terminates_on_cycle() {
        let resolver = IdentityResolver::new(&tables(&[("b", "c"), ("c", "d"), ("d", "b")], &[]));
        assert_eq!(resolver.resolve("b"), "b");
        assert_eq!(resolver.resolve("c"), "b");
        assert_eq!(resolver.resolve("d"), "b");
    }

    #[test]
    fn test_chain_into_cycle() {
        let resolver = IdentityResolver::new(&tables(&[("a", "c"), ("c", "d"), ("d", "c")], &[]));
        assert_eq!(resolver.resolve("a"), "c");
        assert_eq!(resolver.resolve("d"), "c");
    }

    #[test]
    fn test_resolve_self_mapping() {
        let resolver = IdentityResolver::new(&tables(&[("lawkrauss", "lawkrauss")], &[]));
        assert_eq!(resolver.resolve("lawkrauss"), "lawkrauss");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let resolver = IdentityResolver::new(&CuratedTables::builtin().unwrap());
        let mut probes: Vec<String> = resolver.resolved_aliases().into_keys().collect();
        probes.push("someone@else.org".to_string());
        probes.push(String::new());
        for probe in probes {
            let once = resolver.resolve(&probe);
            assert_eq!(resolver.resolve(&once), once, "not idempotent for {:?}", probe);
        }
    }

    #[test]
    fn test_idempotent_with_cycle() {
        let resolver = IdentityResolver::new(&tables(&[("x", "y"), ("y", "z"), ("z", "x"), ("w", "y")], &[]));
        for probe in ["w", "x", "y", "z"] {
            let once = resolver.resolve(probe);
            assert_eq!(once, "x");
            assert_eq!(resolver.resolve(&once), once);
        }
    }

    #[test]
    fn test_builtin_alias_folding() {
        let resolver = IdentityResolver::new(&CuratedTables::builtin().unwrap());
        assert_eq!(
            resolver.resolve("jeffrey epstein"),
            resolver.resolve("jeevacation")
        );
        assert!(resolver.is_principal("jeffrey epstein"));
        assert!(resolver.is_principal("jeeproject@yahoo.com"));
        assert!(!resolver.is_principal("gmax"));
    }
}
