//! Logical endpoints and their physical instances.

use std::collections::BTreeMap;

use crate::domain::Address;

/// One physical instance of a logical endpoint.
///
/// Without a discriminator the instance listens on the shared endpoint
/// queue; with one it gets its own `endpoint-discriminator` queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointInstance {
    endpoint: String,
    discriminator: Option<String>,
}

impl EndpointInstance {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            discriminator: None,
        }
    }

    pub fn with_discriminator(mut self, discriminator: impl Into<String>) -> Self {
        self.discriminator = Some(discriminator.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    pub fn transport_address(&self) -> Address {
        match &self.discriminator {
            Some(d) => Address::new(format!("{}-{d}", self.endpoint)),
            None => Address::new(self.endpoint.clone()),
        }
    }
}

/// Known instances, grouped by the source that declared them.
#[derive(Debug, Clone, Default)]
pub struct EndpointInstances {
    by_source: BTreeMap<String, Vec<EndpointInstance>>,
}

impl EndpointInstances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every instance previously declared by `source`.
    pub fn add_or_replace_instances(&mut self, source: impl Into<String>, instances: Vec<EndpointInstance>) {
        self.by_source.insert(source.into(), instances);
    }

    /// Instances of `endpoint`. An endpoint nobody declared has exactly
    /// one implicit instance on its shared queue.
    pub fn instances_of(&self, endpoint: &str) -> Vec<EndpointInstance> {
        let mut found: Vec<EndpointInstance> = Vec::new();
        for instance in self.by_source.values().flatten() {
            if instance.endpoint == endpoint && !found.contains(instance) {
                found.push(instance.clone());
            }
        }
        if found.is_empty() {
            found.push(EndpointInstance::new(endpoint));
        }
        found
    }
}
