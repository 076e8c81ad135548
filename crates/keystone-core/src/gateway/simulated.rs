//! Deterministic in-memory network.
//!
//! Behaves like a gateway with strict nonces: a submission carrying the wrong
//! nonce is rejected and does not consume one, an accepted submission always
//! does (even if it later fails on-chain). Faults can be injected per
//! submission, per deployment or per endpoint call.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use crate::error::GatewayError;
use crate::gateway::{Action, ActionHandle, ActionKind, ActionStatus, NetworkGateway, Outcome, TokenIndex};
use crate::types::{Address, TokenId, is_valid_ticker};

/// Which action a fault applies to. Occurrences are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// The n-th submission of any kind
    Submission(usize),
    /// The n-th deployment
    Deploy(usize),
    /// The n-th call to the named endpoint
    Endpoint(String, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Refuse the submission outright
    Reject,
    /// Accept, then report an on-chain failure
    FailExecution,
    /// Accept, then stay pending forever
    NeverInclude,
}

#[derive(Debug, Default)]
struct State {
    nonces: HashMap<Address, u64>,
    initial_nonce: u64,
    pending_polls: u32,
    faults: Vec<(Selector, Fault)>,
    submissions: usize,
    deploys: usize,
    endpoint_calls: HashMap<String, usize>,
    accepted: Vec<Action>,
    rejected: Vec<Action>,
    actions: HashMap<String, Tracked>,
    holdings: BTreeMap<Address, Vec<TokenId>>,
    issued: u32,
    requests: usize,
}

#[derive(Debug)]
struct Tracked {
    polls: u32,
    fault: Option<Fault>,
    outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct SimulatedNetwork {
    state: Mutex<State>,
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nonce reported for accounts the network has not seen yet.
    pub fn with_initial_nonce(self, nonce: u64) -> Self {
        self.with_state(|s| s.initial_nonce = nonce);
        self
    }

    /// Number of `Pending` answers before an action is included.
    pub fn with_pending_polls(self, polls: u32) -> Self {
        self.with_state(|s| s.pending_polls = polls);
        self
    }

    pub fn inject(&self, selector: Selector, fault: Fault) {
        self.with_state(|s| s.faults.push((selector, fault)));
    }

    pub fn clear_faults(&self) {
        self.with_state(|s| s.faults.clear());
    }

    /// Every accepted action, in submission order.
    pub fn accepted(&self) -> Vec<Action> {
        self.with_state(|s| s.accepted.clone())
    }

    pub fn rejected(&self) -> Vec<Action> {
        self.with_state(|s| s.rejected.clone())
    }

    /// Total requests served (submit, poll, sync and index calls).
    pub fn request_count(&self) -> usize {
        self.with_state(|s| s.requests)
    }

    pub fn nonce_of(&self, account: &Address) -> u64 {
        self.with_state(|s| s.nonces.get(account).copied().unwrap_or(s.initial_nonce))
    }

    /// Seed an account with tokens it already holds.
    pub fn grant_tokens(&self, account: Address, tokens: Vec<TokenId>) {
        self.with_state(|s| s.holdings.entry(account).or_default().extend(tokens));
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl State {
    fn next_token(&mut self, ticker: &str) -> Result<TokenId, GatewayError> {
        self.issued += 1;
        let suffix = u32::from_be_bytes(
            blake3::hash(format!("{}:{}", ticker, self.issued).as_bytes()).as_bytes()[..4]
                .try_into()
                .unwrap_or([0; 4]),
        );
        TokenId::new(ticker, suffix).map_err(|e| GatewayError::Rejected(e.to_string()))
    }

    fn fault_for(&self, action: &Action) -> Option<Fault> {
        self.faults.iter().find_map(|(selector, fault)| {
            let hit = match selector {
                Selector::Submission(n) => *n == self.submissions,
                Selector::Deploy(n) => {
                    matches!(action.kind, ActionKind::Deploy { .. }) && *n == self.deploys
                }
                Selector::Endpoint(name, n) => {
                    action.kind.endpoint() == Some(name.as_str())
                        && self.endpoint_calls.get(name).copied() == Some(*n)
                }
            };
            hit.then_some(*fault)
        })
    }

    fn execute(&mut self, action: &Action) -> Result<Outcome, GatewayError> {
        match &action.kind {
            ActionKind::Deploy { .. } => {
                let mut seed = action.sender.as_bytes().to_vec();
                seed.extend_from_slice(&action.nonce.to_be_bytes());
                let mut bytes = *Address::derive(&seed).as_bytes();
                // Contracts land in the deployer's partition.
                bytes[31] = action.sender.as_bytes()[31];
                Ok(Outcome {
                    created: Some(Address::from_bytes(bytes)),
                    return_data: Vec::new(),
                })
            }
            ActionKind::Call {
                endpoint,
                arguments,
                ..
            } => {
                let issues = endpoint.starts_with("issue") || endpoint.starts_with("register");
                let ticker = arguments.get(1).filter(|t| is_valid_ticker(t)).cloned();
                let return_data = match (issues, ticker) {
                    (true, Some(ticker)) => vec![self.next_token(&ticker)?.to_string()],
                    _ => Vec::new(),
                };
                Ok(Outcome {
                    created: None,
                    return_data,
                })
            }
            ActionKind::IssueFungible { ticker, .. } => {
                let token = self.next_token(ticker)?;
                self.holdings
                    .entry(action.sender)
                    .or_default()
                    .push(token.clone());
                Ok(Outcome {
                    created: None,
                    return_data: vec![token.to_string()],
                })
            }
        }
    }
}

impl NetworkGateway for SimulatedNetwork {
    fn submit(&self, action: &Action) -> Result<ActionHandle, GatewayError> {
        self.with_state(|s| {
            s.requests += 1;
            s.submissions += 1;
            if matches!(action.kind, ActionKind::Deploy { .. }) {
                s.deploys += 1;
            }
            if let Some(endpoint) = action.kind.endpoint() {
                *s.endpoint_calls.entry(endpoint.to_string()).or_default() += 1;
            }

            let expected = s.nonces.get(&action.sender).copied().unwrap_or(s.initial_nonce);
            if action.nonce != expected {
                s.rejected.push(action.clone());
                return Err(GatewayError::Rejected(format!(
                    "invalid nonce {} (expected {})",
                    action.nonce, expected
                )));
            }

            let fault = s.fault_for(action);
            if fault == Some(Fault::Reject) {
                s.rejected.push(action.clone());
                return Err(GatewayError::Rejected("injected rejection".to_string()));
            }

            s.nonces.insert(action.sender, expected + 1);
            let outcome = match fault {
                Some(_) => Outcome::default(),
                None => s.execute(action)?,
            };

            let mut seed = action.sender.as_bytes().to_vec();
            seed.extend_from_slice(&action.nonce.to_be_bytes());
            let handle = crate::types::encode_hex(blake3::hash(&seed).as_bytes());
            s.actions.insert(
                handle.clone(),
                Tracked {
                    polls: 0,
                    fault,
                    outcome,
                },
            );
            s.accepted.push(action.clone());
            Ok(ActionHandle(handle))
        })
    }

    fn poll_status(&self, handle: &ActionHandle) -> Result<ActionStatus, GatewayError> {
        self.with_state(|s| {
            s.requests += 1;
            let pending_polls = s.pending_polls;
            let tracked = s
                .actions
                .get_mut(&handle.0)
                .ok_or_else(|| GatewayError::Protocol(format!("unknown handle {}", handle)))?;
            tracked.polls += 1;
            if tracked.fault == Some(Fault::NeverInclude) || tracked.polls <= pending_polls {
                return Ok(ActionStatus::Pending);
            }
            if tracked.fault == Some(Fault::FailExecution) {
                return Ok(ActionStatus::Failed("injected execution failure".to_string()));
            }
            Ok(ActionStatus::Included(tracked.outcome.clone()))
        })
    }

    fn sync_sequence_number(&self, account: &Address) -> Result<u64, GatewayError> {
        self.with_state(|s| {
            s.requests += 1;
            Ok(s.nonces.get(account).copied().unwrap_or(s.initial_nonce))
        })
    }
}

impl TokenIndex for SimulatedNetwork {
    fn fungible_tokens(&self, account: &Address) -> Result<Vec<TokenId>, GatewayError> {
        self.with_state(|s| {
            s.requests += 1;
            Ok(s.holdings.get(account).cloned().unwrap_or_default())
        })
    }
}
