//! Submit-then-poll execution of single actions on behalf of the deployer.
//!
//! Every accepted submission advances the deployer's sequence number by one,
//! whatever happens to the action afterwards. The number is read from the
//! network once, when the account is connected, and never re-synchronised.

use std::time::Duration;

use serde::Serialize;

use crate::artifact::ArtifactCache;
use crate::config::PollingConfig;
use crate::error::{GatewayError, ProvisionError};
use crate::gateway::{Action, ActionKind, ActionStatus, NetworkGateway, Outcome};
use crate::types::{Address, Amount, InstanceKind, TokenId, TokenRef};

/// Locally tracked sequence number of the deploying account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployerAccount {
    pub address: Address,
    initial: u64,
    current: u64,
    accepted: u64,
    rejected: u64,
}

impl DeployerAccount {
    /// Read the account's sequence number from the network.
    pub fn connect(gateway: &dyn NetworkGateway, address: Address) -> Result<Self, GatewayError> {
        let nonce = gateway.sync_sequence_number(&address)?;
        tracing::info!(account = %address, nonce, "Synchronised deployer sequence number");
        Ok(Self::with_nonce(address, nonce))
    }

    pub fn with_nonce(address: Address, nonce: u64) -> Self {
        Self {
            address,
            initial: nonce,
            current: nonce,
            accepted: 0,
            rejected: 0,
        }
    }

    pub fn initial(&self) -> u64 {
        self.initial
    }

    /// Sequence number the next submission will carry.
    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Everything an instance type needs to provision or activate an instance.
pub struct Session<'a> {
    gateway: &'a dyn NetworkGateway,
    polling: &'a PollingConfig,
    partitions: u8,
    account: &'a mut DeployerAccount,
    tokens: &'a [TokenId],
    artifacts: &'a mut ArtifactCache,
}

impl<'a> Session<'a> {
    pub fn new(
        gateway: &'a dyn NetworkGateway,
        polling: &'a PollingConfig,
        partitions: u8,
        account: &'a mut DeployerAccount,
        tokens: &'a [TokenId],
        artifacts: &'a mut ArtifactCache,
    ) -> Self {
        Self {
            gateway,
            polling,
            partitions,
            account,
            tokens,
            artifacts,
        }
    }

    pub fn deployer(&self) -> Address {
        self.account.address
    }

    /// Resolve a spec token field against the token phase's list.
    pub fn token(&self, token: &TokenRef) -> Result<TokenId, ProvisionError> {
        match token {
            TokenRef::Identifier(id) => Ok(id.clone()),
            TokenRef::Index(i) => {
                self.tokens
                    .get(*i)
                    .cloned()
                    .ok_or_else(|| ProvisionError::DependencyUnresolved {
                        reference: format!("token #{}", i),
                        reason: format!("token phase provided only {}", self.tokens.len()),
                    })
            }
        }
    }

    /// Deploy `kind`'s artifact and return the created address.
    pub fn deploy(
        &mut self,
        kind: InstanceKind,
        arguments: Vec<String>,
    ) -> Result<Address, ProvisionError> {
        let artifact = self
            .artifacts
            .get(kind)
            .map_err(|e| ProvisionError::Artifact {
                kind,
                reason: format!("{:#}", e),
            })?;
        let action = ActionKind::Deploy {
            code_hash: artifact.digest.clone(),
            code: artifact.code_hex(),
            arguments,
        };
        let label = format!("deploy {}", kind);
        let outcome = self.execute(action, &label)?;
        match outcome.created {
            Some(address) if !address.is_empty() => {
                tracing::info!(kind = %kind, address = %address, "Deployed");
                Ok(address)
            }
            _ => Err(ProvisionError::ExecutionFailed {
                action: label,
                reason: "inclusion reported no contract address".to_string(),
            }),
        }
    }

    pub fn call(
        &mut self,
        contract: Address,
        endpoint: &str,
        arguments: Vec<String>,
    ) -> Result<Outcome, ProvisionError> {
        let label = format!("{} on {}", endpoint, contract);
        self.execute(
            ActionKind::Call {
                contract,
                endpoint: endpoint.to_string(),
                arguments,
            },
            &label,
        )
    }

    /// Call an endpoint that issues a sub-resource and return its identifier.
    pub fn issue(
        &mut self,
        contract: Address,
        endpoint: &str,
        display_name: &str,
        ticker: &str,
        decimals: u8,
    ) -> Result<TokenId, ProvisionError> {
        let outcome = self.call(
            contract,
            endpoint,
            vec![
                display_name.to_string(),
                ticker.to_string(),
                decimals.to_string(),
            ],
        )?;
        outcome
            .issued_token()
            .map_err(|reason| ProvisionError::ExecutionFailed {
                action: format!("{} on {}", endpoint, contract),
                reason,
            })
    }

    pub fn issue_fungible(
        &mut self,
        ticker: &str,
        supply: Amount,
        decimals: u8,
    ) -> Result<Outcome, ProvisionError> {
        self.execute(
            ActionKind::IssueFungible {
                ticker: ticker.to_string(),
                supply,
                decimals,
            },
            &format!("issue {}", ticker),
        )
    }

    fn poll_delay(&self, action: &ActionKind) -> Duration {
        let same = match action {
            ActionKind::Deploy { .. } => true,
            ActionKind::IssueFungible { .. } => false,
            ActionKind::Call { contract, .. } => {
                contract.partition(self.partitions) == self.account.address.partition(self.partitions)
            }
        };
        let ms = if same {
            self.polling.same_partition_delay_ms
        } else {
            self.polling.cross_partition_delay_ms
        };
        Duration::from_millis(ms)
    }

    fn execute(&mut self, kind: ActionKind, label: &str) -> Result<Outcome, ProvisionError> {
        let delay = self.poll_delay(&kind);
        let action = Action {
            sender: self.account.address,
            nonce: self.account.current,
            kind,
        };

        let handle = match self.gateway.submit(&action) {
            Ok(handle) => handle,
            Err(e) => {
                self.account.rejected += 1;
                return Err(ProvisionError::Submission {
                    action: label.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        self.account.current += 1;
        self.account.accepted += 1;
        tracing::debug!(action = label, nonce = action.nonce, handle = %handle, "Accepted");

        let max_attempts = self.polling.max_attempts;
        for attempt in 1..=max_attempts {
            std::thread::sleep(delay);
            match self.gateway.poll_status(&handle) {
                Ok(ActionStatus::Pending) => {
                    tracing::debug!(action = label, attempt, "Pending");
                }
                Ok(ActionStatus::Included(outcome)) => return Ok(outcome),
                Ok(ActionStatus::Failed(reason)) => {
                    return Err(ProvisionError::ExecutionFailed {
                        action: label.to_string(),
                        reason,
                    });
                }
                Err(e) => {
                    tracing::warn!(action = label, attempt, error = %e, "Status poll failed");
                }
            }
        }

        Err(ProvisionError::InclusionTimeout {
            action: label.to_string(),
            handle: handle.to_string(),
            attempts: max_attempts,
        })
    }
}
