//! PMode and MPC lookups
//!
//! The exchange engine only reads through these traits. The in-memory
//! registries are populated administratively or from configuration.

use super::mpc::Mpc;
use super::pmode::PMode;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("PMode not found: {0}")]
    PModeNotFound(String),

    #[error("MPC not found: {0}")]
    MpcNotFound(String),

    #[error("Lookup backend failure: {0}")]
    Backend(String),
}

fn handle_poison<T>(_err: PoisonError<T>) -> LookupError {
    LookupError::Backend("Lock poisoned: a thread panicked while holding the lock".to_string())
}

pub trait PModeResolver: Send + Sync {
    fn resolve_pmode(&self, id: &str) -> Result<Arc<PMode>, LookupError>;
}

pub trait MpcResolver: Send + Sync {
    fn resolve_mpc(&self, id: &str) -> Result<Arc<Mpc>, LookupError>;
}

/// In-memory PMode store
#[derive(Debug, Clone, Default)]
pub struct PModeRegistry {
    pmodes: Arc<RwLock<HashMap<String, Arc<PMode>>>>,
}

impl PModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pmodes(pmodes: impl IntoIterator<Item = PMode>) -> Result<Self, LookupError> {
        let registry = Self::new();
        for pmode in pmodes {
            registry.register(pmode)?;
        }
        Ok(registry)
    }

    /// Add or replace a PMode, returning the one it replaced
    pub fn register(&self, pmode: PMode) -> Result<Option<Arc<PMode>>, LookupError> {
        let mut pmodes = self.pmodes.write().map_err(handle_poison)?;
        Ok(pmodes.insert(pmode.id.clone(), Arc::new(pmode)))
    }

    pub fn remove(&self, id: &str) -> Result<Option<Arc<PMode>>, LookupError> {
        Ok(self.pmodes.write().map_err(handle_poison)?.remove(id))
    }

    pub fn len(&self) -> usize {
        self.pmodes.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PModeResolver for PModeRegistry {
    fn resolve_pmode(&self, id: &str) -> Result<Arc<PMode>, LookupError> {
        self.pmodes
            .read()
            .map_err(handle_poison)?
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::PModeNotFound(id.to_string()))
    }
}

/// In-memory MPC store; always knows the default MPC
#[derive(Debug, Clone)]
pub struct MpcRegistry {
    mpcs: Arc<RwLock<HashMap<String, Arc<Mpc>>>>,
}

impl Default for MpcRegistry {
    fn default() -> Self {
        let default = Mpc::default_mpc();
        let mpcs = HashMap::from([(default.id().to_string(), Arc::new(default))]);
        Self {
            mpcs: Arc::new(RwLock::new(mpcs)),
        }
    }
}

impl MpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Result<Self, LookupError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for id in ids {
            registry.register(Mpc::new(id))?;
        }
        Ok(registry)
    }

    pub fn register(&self, mpc: Mpc) -> Result<Arc<Mpc>, LookupError> {
        let mpc = Arc::new(mpc);
        self.mpcs
            .write()
            .map_err(handle_poison)?
            .insert(mpc.id().to_string(), Arc::clone(&mpc));
        Ok(mpc)
    }
}

impl MpcResolver for MpcRegistry {
    fn resolve_mpc(&self, id: &str) -> Result<Arc<Mpc>, LookupError> {
        self.mpcs
            .read()
            .map_err(handle_poison)?
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::MpcNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_message::envelope::DEFAULT_MPC;

    #[test]
    fn test_pmode_lookup() {
        let registry = PModeRegistry::from_pmodes([PMode::new("a"), PMode::new("b")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve_pmode("a").unwrap().id, "a");
        assert!(matches!(
            registry.resolve_pmode("missing"),
            Err(LookupError::PModeNotFound(id)) if id == "missing"
        ));
    }

    #[test]
    fn test_pmode_replacement() {
        let registry = PModeRegistry::new();
        assert!(registry.register(PMode::new("a")).unwrap().is_none());
        let mut updated = PMode::new("a");
        updated.action = Some("Deliver".to_string());
        assert!(registry.register(updated).unwrap().is_some());
        assert_eq!(
            registry.resolve_pmode("a").unwrap().action.as_deref(),
            Some("Deliver")
        );
        registry.remove("a").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mpc_registry_knows_default() {
        let registry = MpcRegistry::from_ids(["urn:mpc:default"]).unwrap();
        assert!(registry.resolve_mpc(DEFAULT_MPC).unwrap().is_default());
        assert_eq!(registry.resolve_mpc("urn:mpc:default").unwrap().id(), "urn:mpc:default");
        assert!(matches!(
            registry.resolve_mpc("urn:mpc:other"),
            Err(LookupError::MpcNotFound(_))
        ));
    }
}
