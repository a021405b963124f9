//! Routing - 論理的な宛先の解決と物理 instance の選択

pub mod distribution;
pub mod error;
pub mod instances;
pub mod resolver;
pub mod table;

pub use self::distribution::{
    DistributionContext, DistributionPolicy, DistributionScope, DistributionStrategy, PinnedDistribution,
    UniformDistribution,
};
pub use self::error::RoutingError;
pub use self::instances::{EndpointInstance, EndpointInstances};
pub use self::resolver::Router;
pub use self::table::{RouteTableEntry, UnicastRoute, UnicastRoutingTable};
