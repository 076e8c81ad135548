//! Token phase: make sure the fungible tokens later groups use exist.

use crate::session::Session;
use crate::status::{TokenOrigin, TokenReport};
use crate::types::TokenId;

use super::Orchestrator;

impl Orchestrator<'_> {
    /// Ensure `tokens.count` fungible tokens are available.
    ///
    /// Makes no network call when the persisted list is already long enough.
    /// Otherwise mints the shortfall, re-reads the deployer's holdings from the
    /// index and persists the combined list straight away. Minting failures
    /// and shortfalls are reported, not fatal: groups that need a missing
    /// token fail on their own. So is a failure to persist the list, which
    /// makes the run incomplete.
    pub fn provision_tokens(&mut self) {
        let plan = self.spec.tokens().clone();
        let persisted = match self.store.load_tokens() {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!("Persisted token list unusable, re-reading from index: {:#}", e);
                Vec::new()
            }
        };

        if persisted.len() >= plan.count {
            tracing::info!(available = persisted.len(), declared = plan.count, "Reusing persisted tokens");
            self.token_report = TokenReport {
                declared: plan.count,
                available: persisted.len(),
                minted: 0,
                origin: TokenOrigin::Reused,
                error: None,
                save_error: None,
            };
            self.tokens = persisted;
            return;
        }

        tracing::info!(
            have = persisted.len(),
            declared = plan.count,
            prefix = %plan.ticker_prefix,
            "Minting missing tokens"
        );
        let mut minted = 0;
        let mut error = None;
        {
            let mut session = Session::new(
                self.gateway,
                &self.config.polling,
                self.config.network.partitions,
                &mut self.account,
                &[],
                &mut self.artifacts,
            );
            for n in persisted.len()..plan.count {
                let ticker = plan.ticker(n);
                match session.issue_fungible(&ticker, plan.supply, plan.decimals) {
                    Ok(_) => minted += 1,
                    Err(e) => {
                        tracing::error!(ticker = %ticker, error = %e, "Token mint failed");
                        error = Some(e.to_string());
                        break;
                    }
                }
            }
        }

        let held = match self.index.fungible_tokens(&self.account.address) {
            Ok(held) => held,
            Err(e) => {
                tracing::error!(error = %e, "Token index lookup failed");
                error.get_or_insert_with(|| e.to_string());
                Vec::new()
            }
        };
        let tokens = merge_tokens(persisted, held, &plan.ticker_prefix);
        if tokens.len() < plan.count {
            tracing::warn!(available = tokens.len(), declared = plan.count, "Token shortfall");
        }
        let save_error = self.store.save_tokens(&tokens).err().map(|e| {
            tracing::error!("Failed to save token list: {:#}", e);
            format!("{:#}", e)
        });

        self.token_report = TokenReport {
            declared: plan.count,
            available: tokens.len(),
            minted,
            origin: TokenOrigin::Fresh,
            error,
            save_error,
        };
        self.tokens = tokens;
    }
}

/// Persisted tokens keep their positions; newly found tokens carrying the
/// plan's prefix follow, ordered by the number in their ticker.
fn merge_tokens(persisted: Vec<TokenId>, held: Vec<TokenId>, prefix: &str) -> Vec<TokenId> {
    let mut found: Vec<TokenId> = held
        .into_iter()
        .filter(|t| t.ticker().starts_with(prefix) && !persisted.contains(t))
        .collect();
    found.sort_by_key(|t| {
        let number = t
            .ticker()
            .strip_prefix(prefix)
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(u64::MAX);
        (number, t.clone())
    });
    found.dedup();

    let mut tokens = persisted;
    tokens.extend(found);
    tokens
}
