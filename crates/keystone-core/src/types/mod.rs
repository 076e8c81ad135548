//! Shared core types used across the spec, catalog and persistence layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Instance-type labels in fixed catalog order.
///
/// The declaration order of the variants IS the provisioning order: a group may
/// only reference groups declared before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    Router,
    Pair,
    SimpleLock,
    FeesCollector,
    Farm,
    Staking,
    ProxyDex,
    Metastaking,
    PriceDiscovery,
}

impl InstanceKind {
    /// Every kind, in catalog order.
    pub const CATALOG: [InstanceKind; 9] = [
        InstanceKind::Router,
        InstanceKind::Pair,
        InstanceKind::SimpleLock,
        InstanceKind::FeesCollector,
        InstanceKind::Farm,
        InstanceKind::Staking,
        InstanceKind::ProxyDex,
        InstanceKind::Metastaking,
        InstanceKind::PriceDiscovery,
    ];

    /// Stable label used as the spec key and the persistence key.
    pub fn label(self) -> &'static str {
        match self {
            InstanceKind::Router => "router",
            InstanceKind::Pair => "pair",
            InstanceKind::SimpleLock => "simple_lock",
            InstanceKind::FeesCollector => "fees_collector",
            InstanceKind::Farm => "farm",
            InstanceKind::Staking => "staking",
            InstanceKind::ProxyDex => "proxy_dex",
            InstanceKind::Metastaking => "metastaking",
            InstanceKind::PriceDiscovery => "price_discovery",
        }
    }

    /// Zero-based position in the catalog.
    pub fn position(self) -> usize {
        Self::CATALOG
            .iter()
            .position(|k| *k == self)
            .unwrap_or(Self::CATALOG.len())
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::CATALOG.into_iter().find(|k| k.label() == label)
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for InstanceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        Self::from_label(&normalized).ok_or_else(|| {
            let known: Vec<&str> = Self::CATALOG.iter().map(|k| k.label()).collect();
            anyhow::anyhow!(
                "Unknown instance-type label '{}' (known: {})",
                s,
                known.join(", ")
            )
        })
    }
}

/// Positional reference to an instance of another group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyRef {
    pub kind: InstanceKind,
    pub index: usize,
}

impl DependencyRef {
    pub fn new(kind: InstanceKind, index: usize) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.index)
    }
}

/// 32-byte account or contract address.
///
/// Rendered as `0x` followed by 64 lowercase hex digits. The all-zero address
/// is the "empty" address: nothing has been assigned yet.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Deterministic address derived from arbitrary seed bytes.
    pub fn derive(seed: &[u8]) -> Self {
        Self(*blake3::hash(seed).as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; 32]
    }

    /// Partition (shard) the address lives in.
    pub fn partition(&self, partitions: u8) -> u8 {
        if partitions <= 1 {
            return 0;
        }
        self.0[31] % partitions
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", encode_hex(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if hex.len() != 64 {
            anyhow::bail!(
                "Invalid address '{}': expected 64 hex digits, got {}",
                s,
                hex.len()
            );
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = hex
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| anyhow::anyhow!("Invalid address '{}'", s))?;
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| anyhow::anyhow!("Invalid address '{}': non-hex digit", s))?;
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

/// Fungible or semi-fungible resource identifier, e.g. `WEGLD-bd4d79`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

impl TokenId {
    pub fn new(ticker: &str, suffix: u32) -> anyhow::Result<Self> {
        format!("{}-{:06x}", ticker, suffix & 0x00ff_ffff).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ticker part before the random suffix.
    pub fn ticker(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

/// Tickers are 3 to 10 uppercase alphanumeric characters.
pub fn is_valid_ticker(ticker: &str) -> bool {
    (3..=10).contains(&ticker.len())
        && ticker
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

impl FromStr for TokenId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ticker, suffix) = s
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("Invalid token identifier '{}': missing '-'", s))?;
        if !is_valid_ticker(ticker) {
            anyhow::bail!("Invalid token identifier '{}': bad ticker", s);
        }
        if suffix.len() != 6 || !suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Invalid token identifier '{}': bad suffix", s);
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for TokenId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TokenId> for String {
    fn from(value: TokenId) -> Self {
        value.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A spec field naming a token: either a literal identifier or the position of
/// a token produced by the token phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenRef {
    Index(usize),
    Identifier(TokenId),
}

impl TokenRef {
    pub fn index(&self) -> Option<usize> {
        match self {
            TokenRef::Index(i) => Some(*i),
            TokenRef::Identifier(_) => None,
        }
    }
}

/// Unsigned token amount. Accepts JSON numbers or decimal strings so values
/// above `u64::MAX` survive the round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "AmountRepr", into = "String")]
pub struct Amount(pub u128);

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
    Number(u64),
    Text(String),
}

impl TryFrom<AmountRepr> for Amount {
    type Error = anyhow::Error;

    fn try_from(value: AmountRepr) -> Result<Self, Self::Error> {
        match value {
            AmountRepr::Number(n) => Ok(Amount(u128::from(n))),
            AmountRepr::Text(s) => s
                .trim()
                .parse::<u128>()
                .map(Amount)
                .map_err(|_| anyhow::anyhow!("Invalid amount '{}'", s)),
        }
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.0.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token roles granted to deployed instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    LocalMint,
    LocalBurn,
    NftCreate,
    NftAddQuantity,
    NftBurn,
    Transfer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::LocalMint => "RoleLocalMint",
            Role::LocalBurn => "RoleLocalBurn",
            Role::NftCreate => "RoleNftCreate",
            Role::NftAddQuantity => "RoleNftAddQuantity",
            Role::NftBurn => "RoleNftBurn",
            Role::Transfer => "RoleTransfer",
        }
    }
}

/// Contract generation marker for types with more than one code version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractVersion {
    V1,
    #[default]
    V2,
}

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
