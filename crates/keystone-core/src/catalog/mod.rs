//! Instance-type catalog.
//!
//! Each instance type is a unit struct implementing [`Blueprint`]: typed
//! parameters, a typed instance record and the provisioning/activation
//! sequences. The orchestrator only sees the object-safe [`InstanceType`]
//! returned by [`blueprint`], so it never branches on the concrete type.

pub mod farm;
pub mod fees_collector;
pub mod metastaking;
pub mod pair;
pub mod price_discovery;
pub mod proxy_dex;
pub mod router;
pub mod simple_lock;
pub mod staking;

use std::collections::BTreeMap;
use std::fmt::Debug;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ProvisionError;
use crate::session::Session;
use crate::spec::SpecEntry;
use crate::types::{Address, DependencyRef, InstanceKind, TokenRef, is_valid_ticker};

use farm::{Farm, FarmInstance};
use fees_collector::{FeesCollector, FeesCollectorInstance};
use metastaking::{Metastaking, MetastakingInstance};
use pair::{Pair, PairInstance};
use price_discovery::{PriceDiscovery, PriceDiscoveryInstance};
use proxy_dex::{ProxyDex, ProxyDexInstance};
use router::{Router, RouterInstance};
use simple_lock::{SimpleLock, SimpleLockInstance};
use staking::{Staking, StakingInstance};

/// A provisioned instance of any catalog type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceRecord {
    Router(RouterInstance),
    Pair(PairInstance),
    SimpleLock(SimpleLockInstance),
    FeesCollector(FeesCollectorInstance),
    Farm(FarmInstance),
    Staking(StakingInstance),
    ProxyDex(ProxyDexInstance),
    Metastaking(MetastakingInstance),
    PriceDiscovery(PriceDiscoveryInstance),
}

impl InstanceRecord {
    pub fn kind(&self) -> InstanceKind {
        match self {
            InstanceRecord::Router(_) => InstanceKind::Router,
            InstanceRecord::Pair(_) => InstanceKind::Pair,
            InstanceRecord::SimpleLock(_) => InstanceKind::SimpleLock,
            InstanceRecord::FeesCollector(_) => InstanceKind::FeesCollector,
            InstanceRecord::Farm(_) => InstanceKind::Farm,
            InstanceRecord::Staking(_) => InstanceKind::Staking,
            InstanceRecord::ProxyDex(_) => InstanceKind::ProxyDex,
            InstanceRecord::Metastaking(_) => InstanceKind::Metastaking,
            InstanceRecord::PriceDiscovery(_) => InstanceKind::PriceDiscovery,
        }
    }

    pub fn address(&self) -> Address {
        match self {
            InstanceRecord::Router(i) => i.address,
            InstanceRecord::Pair(i) => i.address,
            InstanceRecord::SimpleLock(i) => i.address,
            InstanceRecord::FeesCollector(i) => i.address,
            InstanceRecord::Farm(i) => i.address,
            InstanceRecord::Staking(i) => i.address,
            InstanceRecord::ProxyDex(i) => i.address,
            InstanceRecord::Metastaking(i) => i.address,
            InstanceRecord::PriceDiscovery(i) => i.address,
        }
    }
}

/// Dependencies named by one spec entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    pub instances: Vec<DependencyRef>,
    /// Positions into the token phase's list
    pub tokens: Vec<usize>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instance(mut self, kind: InstanceKind, index: usize) -> Self {
        self.instances.push(DependencyRef::new(kind, index));
        self
    }

    pub fn instances(mut self, kind: InstanceKind, indices: &[usize]) -> Self {
        self.instances
            .extend(indices.iter().map(|i| DependencyRef::new(kind, *i)));
        self
    }

    pub fn token(mut self, token: &TokenRef) -> Self {
        if let Some(index) = token.index() {
            self.tokens.push(index);
        }
        self
    }
}

/// Dependency records resolved for one entry, read-only.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    records: BTreeMap<DependencyRef, InstanceRecord>,
}

impl Resolved {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: DependencyRef, record: InstanceRecord) {
        self.records.insert(reference, record);
    }

    pub fn address(&self, reference: DependencyRef) -> Result<Address, ProvisionError> {
        self.records
            .get(&reference)
            .map(InstanceRecord::address)
            .ok_or_else(|| unresolved(reference))
    }

    /// Typed view of a resolved dependency.
    pub fn instance<B: Blueprint>(&self, index: usize) -> Result<&B::Instance, ProvisionError> {
        let reference = DependencyRef::new(B::KIND, index);
        self.records
            .get(&reference)
            .and_then(B::unwrap)
            .ok_or_else(|| unresolved(reference))
    }
}

fn unresolved(reference: DependencyRef) -> ProvisionError {
    ProvisionError::DependencyUnresolved {
        reference: reference.to_string(),
        reason: "not resolved for this entry".to_string(),
    }
}

/// A failed provisioning attempt, carrying the deployed but incompletely
/// initialized instance when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure<I> {
    pub error: ProvisionError,
    pub orphan: Option<I>,
}

impl<I> Failure<I> {
    pub fn orphaned(error: ProvisionError, instance: I) -> Self {
        Self {
            error,
            orphan: Some(instance),
        }
    }

    pub fn map<J>(self, f: impl FnOnce(I) -> J) -> Failure<J> {
        Failure {
            error: self.error,
            orphan: self.orphan.map(f),
        }
    }
}

impl<I> From<ProvisionError> for Failure<I> {
    fn from(error: ProvisionError) -> Self {
        Self {
            error,
            orphan: None,
        }
    }
}

/// Attach a partially initialized instance to an initialization error.
pub trait OrOrphan<T> {
    fn or_orphan<I: Clone>(self, instance: &I) -> Result<T, Failure<I>>;
}

impl<T> OrOrphan<T> for Result<T, ProvisionError> {
    fn or_orphan<I: Clone>(self, instance: &I) -> Result<T, Failure<I>> {
        self.map_err(|error| Failure::orphaned(error, instance.clone()))
    }
}

/// Typed definition of one instance type.
pub trait Blueprint {
    const KIND: InstanceKind;

    type Params: DeserializeOwned;
    type Instance: Serialize + DeserializeOwned + Clone + PartialEq + Debug;

    fn references(params: &Self::Params) -> References;

    /// Checks that need more than deserialization, e.g. ticker syntax.
    fn validate(_params: &Self::Params) -> Result<(), String> {
        Ok(())
    }

    /// Deploy and initialize one instance.
    fn provision(
        params: &Self::Params,
        deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<Self::Instance, Failure<Self::Instance>>;

    fn activate(_instance: &Self::Instance, _session: &mut Session<'_>) -> Result<(), ProvisionError> {
        Ok(())
    }

    fn wrap(instance: Self::Instance) -> InstanceRecord;

    fn unwrap(record: &InstanceRecord) -> Option<&Self::Instance>;
}

/// Object-safe view of a [`Blueprint`], looked up by kind.
pub trait InstanceType {
    fn kind(&self) -> InstanceKind;

    /// Parse and validate an entry, returning the dependencies it names.
    fn references(&self, entry: &SpecEntry) -> Result<References, String>;

    fn provision(
        &self,
        entry: &SpecEntry,
        deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<InstanceRecord, Failure<InstanceRecord>>;

    fn activate(&self, record: &InstanceRecord, session: &mut Session<'_>) -> Result<(), ProvisionError>;

    fn to_record(&self, record: &InstanceRecord) -> anyhow::Result<Value>;

    fn from_record(&self, value: Value) -> anyhow::Result<InstanceRecord>;
}

fn parse_params<B: Blueprint>(entry: &SpecEntry) -> Result<B::Params, String> {
    let params: B::Params =
        serde_json::from_value(Value::Object(entry.clone())).map_err(|e| e.to_string())?;
    B::validate(&params)?;
    Ok(params)
}

impl<B: Blueprint> InstanceType for B {
    fn kind(&self) -> InstanceKind {
        B::KIND
    }

    fn references(&self, entry: &SpecEntry) -> Result<References, String> {
        parse_params::<B>(entry).map(|params| <B as Blueprint>::references(&params))
    }

    fn provision(
        &self,
        entry: &SpecEntry,
        deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<InstanceRecord, Failure<InstanceRecord>> {
        let params = parse_params::<B>(entry).map_err(ProvisionError::InvalidEntry)?;
        <B as Blueprint>::provision(&params, deps, session)
            .map(B::wrap)
            .map_err(|failure| failure.map(B::wrap))
    }

    fn activate(&self, record: &InstanceRecord, session: &mut Session<'_>) -> Result<(), ProvisionError> {
        let instance = B::unwrap(record).ok_or_else(|| {
            ProvisionError::InvalidEntry(format!("{} record passed to {}", record.kind(), B::KIND))
        })?;
        <B as Blueprint>::activate(instance, session)
    }

    fn to_record(&self, record: &InstanceRecord) -> anyhow::Result<Value> {
        let instance = B::unwrap(record)
            .ok_or_else(|| anyhow::anyhow!("{} record passed to {}", record.kind(), B::KIND))?;
        serde_json::to_value(instance).with_context(|| format!("Failed to serialize {} record", B::KIND))
    }

    fn from_record(&self, value: Value) -> anyhow::Result<InstanceRecord> {
        let instance: B::Instance = serde_json::from_value(value)
            .with_context(|| format!("Failed to decode {} record", B::KIND))?;
        Ok(B::wrap(instance))
    }
}

/// Capability lookup by kind.
pub fn blueprint(kind: InstanceKind) -> &'static dyn InstanceType {
    match kind {
        InstanceKind::Router => &Router,
        InstanceKind::Pair => &Pair,
        InstanceKind::SimpleLock => &SimpleLock,
        InstanceKind::FeesCollector => &FeesCollector,
        InstanceKind::Farm => &Farm,
        InstanceKind::Staking => &Staking,
        InstanceKind::ProxyDex => &ProxyDex,
        InstanceKind::Metastaking => &Metastaking,
        InstanceKind::PriceDiscovery => &PriceDiscovery,
    }
}

/// Shared ticker check for blueprint parameters.
pub(crate) fn check_ticker(field: &str, ticker: &str) -> Result<(), String> {
    if is_valid_ticker(ticker) {
        Ok(())
    } else {
        Err(format!(
            "{}: '{}' is not a valid ticker (3-10 uppercase alphanumerics)",
            field, ticker
        ))
    }
}
