//! Extensions - context に載せる型ごとの ambient state
//!
//! 型そのものを key にします（`TypeId`）。fork した context は親の
//! snapshot を読めますが、書き込みは自分の層にだけ入ります。

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Extensions {
    local: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    parent: Option<Arc<Extensions>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Send + Sync>(&mut self, value: T) {
        self.local.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self.local.get(&TypeId::of::<T>()) {
            Some(value) => value.downcast_ref::<T>(),
            None => self.parent.as_deref().and_then(|parent| parent.get::<T>()),
        }
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// New layer on top of a snapshot of `self`.
    pub fn fork(&self) -> Extensions {
        Extensions {
            local: HashMap::new(),
            parent: Some(Arc::new(self.clone())),
        }
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("local", &self.local.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
