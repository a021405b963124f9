//! Unicast routing table: message type -> route.

use std::collections::BTreeMap;

use super::instances::EndpointInstance;
use crate::domain::{Address, MessageType};

/// Where a point-to-point message goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnicastRoute {
    /// A logical endpoint; the distribution strategy picks the instance.
    Endpoint(String),
    Instance(EndpointInstance),
    Address(Address),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableEntry {
    pub message_type: MessageType,
    pub route: UnicastRoute,
}

impl RouteTableEntry {
    pub fn new(message_type: MessageType, route: UnicastRoute) -> Self {
        Self { message_type, route }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UnicastRoutingTable {
    by_source: BTreeMap<String, Vec<RouteTableEntry>>,
}

impl UnicastRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every route previously declared by `source`.
    pub fn add_or_replace_routes(&mut self, source: impl Into<String>, entries: Vec<RouteTableEntry>) {
        self.by_source.insert(source.into(), entries);
    }

    /// Distinct routes for `message_type` across all sources.
    pub fn routes_for(&self, message_type: &MessageType) -> Vec<UnicastRoute> {
        let mut routes: Vec<UnicastRoute> = Vec::new();
        for entry in self.by_source.values().flatten() {
            if &entry.message_type == message_type && !routes.contains(&entry.route) {
                routes.push(entry.route.clone());
            }
        }
        routes
    }
}
