use std::collections::BTreeSet;

use futures::future::join_all;
use futures::join;
use log::{debug, warn};
use serde::Serialize;

use super::delegation::{DelegationChain, DelegationResolver};
use super::voting_power::{VotingPower, VotingPowerAggregator};
use crate::error::GatewayResult;
use crate::gateway::{ContractGateway, LogFilter, TypedGateway};
use crate::types::{Address, TokenAmount};

/// Everything a dashboard shows about one account's delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelegationOverview {
    pub account: Address,
    pub balance: TokenAmount,
    pub delegate: Option<Address>,
    pub self_delegated: bool,
    pub delegators: Vec<Address>,
    /// Tokens delegated directly to `account`.
    pub delegated_to_account: TokenAmount,
    pub chain: DelegationChain,
    pub voting_power: VotingPower,
    pub snapshot_id: Option<u64>,
}

impl DelegationOverview {
    pub fn empty(account: Address, reason: &str) -> Self {
        Self {
            account,
            balance: TokenAmount::zero(),
            delegate: None,
            self_delegated: false,
            delegators: Vec::new(),
            delegated_to_account: TokenAmount::zero(),
            chain: DelegationChain::unresolved(account, reason),
            voting_power: VotingPower::unavailable(None),
            snapshot_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolderEstimate {
    pub holders: u64,
    pub from_block: u64,
    pub to_block: u64,
    /// False when some balance checks failed and the count may be low.
    pub complete: bool,
}

impl HolderEstimate {
    pub fn unavailable() -> Self {
        Self { holders: 0, from_block: 0, to_block: 0, complete: false }
    }
}

pub struct OverviewReader<'a, 'g, G: ?Sized> {
    gateway: &'a TypedGateway<'g, G>,
    max_depth: usize,
    transitive_levels: usize,
}

impl<'a, 'g, G: ContractGateway + ?Sized> OverviewReader<'a, 'g, G> {
    pub fn new(gateway: &'a TypedGateway<'g, G>, max_depth: usize, transitive_levels: usize) -> Self {
        Self { gateway, max_depth, transitive_levels }
    }

    pub async fn delegation_overview(&self, account: Address) -> DelegationOverview {
        let (balance, delegate, delegators, delegated, snapshot_id) = join!(
            self.gateway.balance_of(account, None),
            self.gateway.delegate_of(account),
            self.gateway.delegators_of(account),
            self.gateway.delegated_to(account),
            self.gateway.current_snapshot_id()
        );

        let balance = balance.unwrap_or_else(|e| {
            warn!("Balance of {} unavailable: {}", account.short(), e);
            TokenAmount::zero()
        });
        let delegate = delegate.unwrap_or_else(|e| {
            warn!("Delegate of {} unavailable: {}", account.short(), e);
            None
        });
        let delegators = delegators.unwrap_or_else(|e| {
            warn!("Delegators of {} unavailable: {}", account.short(), e);
            Vec::new()
        });
        let delegated_to_account = match delegated {
            Ok(amount) => amount,
            Err(e) => {
                debug!("getDelegatedToAddress failed ({}), summing delegator balances", e);
                self.sum_balances(&delegators).await
            }
        };
        let snapshot_id = snapshot_id
            .map_err(|e| warn!("Current snapshot id unavailable: {}", e))
            .ok()
            .filter(|id| *id > 0);

        let chain = DelegationResolver::new(self.gateway).resolve_chain(account, self.max_depth).await;
        let voting_power = match snapshot_id {
            Some(id) => {
                VotingPowerAggregator::new(self.gateway, self.transitive_levels)
                    .compute_voting_power(account, id)
                    .await
            }
            None => VotingPower::unavailable(None),
        };

        DelegationOverview {
            account,
            balance,
            // A null delegate keeps the weight with the account.
            self_delegated: delegate.map_or(true, |delegate| delegate == account),
            delegate,
            delegators,
            delegated_to_account,
            chain,
            voting_power,
            snapshot_id,
        }
    }

    async fn sum_balances(&self, accounts: &[Address]) -> TokenAmount {
        join_all(accounts.iter().map(|account| self.gateway.balance_of(*account, None)))
            .await
            .into_iter()
            .filter_map(|balance| balance.map_err(|e| warn!("Delegator balance unavailable: {}", e)).ok())
            .sum()
    }

    /// Counts current holders among transfer recipients of the last
    /// `lookback_blocks` blocks. Holders who received nothing in that window
    /// are not seen.
    pub async fn estimate_holder_count(&self, lookback_blocks: u64) -> GatewayResult<HolderEstimate> {
        let to_block = self.gateway.block_number().await?;
        let from_block = to_block.saturating_sub(lookback_blocks);
        let transfers = self
            .gateway
            .transfer_events(&LogFilter::transfers(from_block, to_block))
            .await?;

        let recipients: BTreeSet<Address> =
            transfers.iter().map(|t| t.to).filter(|to| !to.is_zero()).collect();
        debug!("{} distinct recipients in blocks {}..={}", recipients.len(), from_block, to_block);

        let balances = join_all(recipients.iter().map(|holder| self.gateway.balance_of(*holder, None))).await;
        let mut holders = 0;
        let mut complete = true;
        for balance in balances {
            match balance {
                Ok(balance) if !balance.is_zero() => holders += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!("Holder balance check failed: {}", e);
                    complete = false;
                }
            }
        }

        Ok(HolderEstimate { holders, from_block, to_block, complete })
    }
}
