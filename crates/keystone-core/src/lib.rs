//! Keystone Core Library
//!
//! Declarative, dependency-ordered provisioning of on-chain contract
//! instances: spec loading, per-type provisioning, persistence and reuse of
//! results, activation and cross-group wiring.

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod group;
pub mod orchestrator;
pub mod session;
pub mod spec;
pub mod status;
pub mod store;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigOverrides, DeployConfig, load_config};

    // Spec
    pub use crate::spec::{DeploySpec, SpecEntry, TokenPlan};

    // Catalog
    pub use crate::catalog::{Blueprint, InstanceRecord, InstanceType, blueprint};

    // Network
    pub use crate::gateway::http::{HttpGateway, HttpTokenIndex};
    pub use crate::gateway::simulated::SimulatedNetwork;
    pub use crate::gateway::{NetworkGateway, TokenIndex};

    // Orchestration
    pub use crate::group::{InstanceTypeGroup, Origin};
    pub use crate::orchestrator::Orchestrator;
    pub use crate::status::{RunSummary, StoreStatus, store_status};
    pub use crate::store::RecordStore;

    // Errors
    pub use crate::error::{GatewayError, ProvisionError, SpecLoadError, SpecMismatchError};

    // Types
    pub use crate::types::{Address, InstanceKind, TokenId};
}
