//! A read-write-locked handle to a `PackageDefinition` (spec §5): lets an
//! embedding application fan schema generation or info queries out across
//! threads once a definition is built. The launcher core itself never
//! spawns threads; this type exists purely so callers can share one safely.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::model::PackageDefinition;

#[derive(Clone)]
pub struct SharedDefinition(Arc<RwLock<PackageDefinition>>);

impl SharedDefinition {
    pub fn new(def: PackageDefinition) -> Self {
        SharedDefinition(Arc::new(RwLock::new(def)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PackageDefinition> {
        self.0.read().expect("PackageDefinition lock poisoned")
    }
}
