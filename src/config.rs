//! Centralized configuration and builder for FerryStore.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - StoreConfig::from_env() reads the FERRY_* variables; the builder overrides them.
//!
//! Env:
//! - FERRY_DELETE_IF_EXPIRED=0|1 (default 1): initial expiration policy flag.
//! - FERRY_MAX_POOLED_ITERATORS=<n> (default unbounded; 0 disables pooling).
//! - FERRY_LOG_SNAPSHOTS=0|1 (default 1): info lines on snapshot create/release.

use std::fmt;

use crate::engine::Engine;
use crate::store::Store;

fn parse_bool(s: &str) -> bool {
    let s = s.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

/// Top-level configuration for a store handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Whether collaborators delete expired keys on access.
    /// Env: FERRY_DELETE_IF_EXPIRED (default true)
    pub delete_if_expired: bool,

    /// Upper bound on idle pooled iterators; a valid iterator returned to a full
    /// pool is closed instead. None = unbounded.
    /// Env: FERRY_MAX_POOLED_ITERATORS
    pub max_pooled_iterators: Option<usize>,

    /// Log snapshot create/release at info level (debug otherwise).
    /// Env: FERRY_LOG_SNAPSHOTS (default true)
    pub log_snapshots: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            delete_if_expired: true,
            max_pooled_iterators: None,
            log_snapshots: true,
        }
    }
}

impl StoreConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as from_env, with an explicit variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("FERRY_DELETE_IF_EXPIRED") {
            cfg.delete_if_expired = parse_bool(&v);
        }

        if let Some(v) = lookup("FERRY_MAX_POOLED_ITERATORS") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.max_pooled_iterators = Some(n);
            }
        }

        if let Some(v) = lookup("FERRY_LOG_SNAPSHOTS") {
            cfg.log_snapshots = parse_bool(&v);
        }

        cfg
    }

    pub fn with_delete_if_expired(mut self, on: bool) -> Self {
        self.delete_if_expired = on;
        self
    }

    pub fn with_max_pooled_iterators(mut self, max: Option<usize>) -> Self {
        self.max_pooled_iterators = max;
        self
    }

    pub fn with_log_snapshots(mut self, on: bool) -> Self {
        self.log_snapshots = on;
        self
    }
}

impl fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreConfig {{ delete_if_expired: {}, max_pooled_iterators: {}, log_snapshots: {} }}",
            self.delete_if_expired,
            self.max_pooled_iterators
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unbounded".to_string()),
            self.log_snapshots,
        )
    }
}

/// Builder that produces a StoreConfig (or opens a Store directly).
#[derive(Clone, Debug)]
pub struct StoreBuilder {
    cfg: StoreConfig,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: StoreConfig::from_env(),
        }
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: StoreConfig::default(),
        }
    }

    pub fn delete_if_expired(mut self, on: bool) -> Self {
        self.cfg.delete_if_expired = on;
        self
    }

    pub fn max_pooled_iterators(mut self, max: Option<usize>) -> Self {
        self.cfg.max_pooled_iterators = max;
        self
    }

    pub fn log_snapshots(mut self, on: bool) -> Self {
        self.cfg.log_snapshots = on;
        self
    }

    pub fn build(self) -> StoreConfig {
        self.cfg
    }

    /// Wrap an already-open engine with the built configuration.
    pub fn open<E: Engine>(self, engine: E) -> Store<E> {
        Store::open_with_config(engine, self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let cfg = StoreConfig::default();
        assert!(cfg.delete_if_expired);
        assert_eq!(cfg.max_pooled_iterators, None);
        assert!(cfg.log_snapshots);
        assert!(cfg.to_string().contains("unbounded"));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("FERRY_DELETE_IF_EXPIRED", "off"),
            ("FERRY_MAX_POOLED_ITERATORS", " 8 "),
            ("FERRY_LOG_SNAPSHOTS", "0"),
        ]
        .into_iter()
        .collect();
        let cfg = StoreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert!(!cfg.delete_if_expired);
        assert_eq!(cfg.max_pooled_iterators, Some(8));
        assert!(!cfg.log_snapshots);
    }

    #[test]
    fn bad_numbers_are_ignored() {
        let cfg = StoreConfig::from_lookup(|k| {
            (k == "FERRY_MAX_POOLED_ITERATORS").then(|| "many".to_string())
        });
        assert_eq!(cfg, StoreConfig::default());
    }

    #[test]
    fn builder_from_default() {
        let cfg = StoreBuilder::from_default()
            .delete_if_expired(false)
            .max_pooled_iterators(Some(2))
            .build();
        assert_eq!(
            cfg,
            StoreConfig::default()
                .with_delete_if_expired(false)
                .with_max_pooled_iterators(Some(2))
        );
    }
}
