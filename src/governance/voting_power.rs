use std::collections::HashSet;

use futures::future::join_all;
use futures::join;
use log::{debug, warn};
use serde::Serialize;

use super::cancel::CancelToken;
use super::delegation::DelegationResolver;
use super::strategy::{FallbackChain, Resolved, StrategyError, StrategyResult};
use crate::error::Result;
use crate::gateway::{ContractGateway, TypedGateway};
use crate::types::{Address, TokenAmount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PowerSource {
    /// Effective voting power reported by the token contract.
    OnChain,
    /// Re-derived from balances and delegation edges.
    LocalFallback,
    /// Neither path produced a value; the amount is zero.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VotingPower {
    pub amount: TokenAmount,
    pub source: PowerSource,
    pub snapshot_id: Option<u64>,
}

impl VotingPower {
    pub fn unavailable(snapshot_id: Option<u64>) -> Self {
        Self { amount: TokenAmount::zero(), source: PowerSource::Unavailable, snapshot_id }
    }
}

/// Both computation paths side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerCrossCheck {
    pub address: Address,
    pub snapshot_id: u64,
    pub on_chain: Option<TokenAmount>,
    pub local: Option<TokenAmount>,
    /// True when both paths answered and agree.
    pub consistent: bool,
}

/// Computes voting power at a snapshot, preferring the contract's own figure.
pub struct VotingPowerAggregator<'a, 'g, G: ?Sized> {
    gateway: &'a TypedGateway<'g, G>,
    transitive_levels: usize,
    cancel: Option<&'a CancelToken>,
}

impl<'a, 'g, G: ContractGateway + ?Sized> VotingPowerAggregator<'a, 'g, G> {
    pub fn new(gateway: &'a TypedGateway<'g, G>, transitive_levels: usize) -> Self {
        Self { gateway, transitive_levels, cancel: None }
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn resolve(&self, address: Address, snapshot_id: u64) -> Result<Resolved<VotingPower>> {
        FallbackChain::new("voting_power")
            .then("on_chain", || self.on_chain(address, snapshot_id))
            .then("local", || self.local(address, snapshot_id))
            .run(self.cancel)
            .await
    }

    /// Never fails; a fully failed lookup yields zero with [`PowerSource::Unavailable`].
    pub async fn compute_voting_power(&self, address: Address, snapshot_id: u64) -> VotingPower {
        match self.resolve(address, snapshot_id).await {
            Ok(resolved) => resolved.value,
            Err(e) => {
                warn!("Voting power of {} at snapshot {} unavailable: {}", address.short(), snapshot_id, e);
                VotingPower::unavailable(Some(snapshot_id))
            }
        }
    }

    pub async fn cross_check(&self, address: Address, snapshot_id: u64) -> PowerCrossCheck {
        let (on_chain, local) = join!(
            self.gateway.effective_voting_power(address, snapshot_id),
            self.local_voting_power(address, snapshot_id)
        );
        let on_chain = on_chain.map_err(|e| warn!("On-chain voting power failed: {}", e)).ok();
        let local = local.map_err(|e| warn!("Local voting power failed: {}", e)).ok();
        let consistent = matches!((on_chain, local), (Some(a), Some(b)) if a == b);
        if let (Some(a), Some(b), false) = (on_chain, local, consistent) {
            warn!(
                "Voting power mismatch for {} at snapshot {}: on-chain {} vs local {}",
                address.short(),
                snapshot_id,
                a,
                b
            );
        }
        PowerCrossCheck { address, snapshot_id, on_chain, local, consistent }
    }

    async fn on_chain(&self, address: Address, snapshot_id: u64) -> StrategyResult<VotingPower> {
        let amount = self.gateway.effective_voting_power(address, snapshot_id).await?;
        Ok(VotingPower { amount, source: PowerSource::OnChain, snapshot_id: Some(snapshot_id) })
    }

    async fn local(&self, address: Address, snapshot_id: u64) -> StrategyResult<VotingPower> {
        let amount = self.local_voting_power(address, snapshot_id).await?;
        Ok(VotingPower { amount, source: PowerSource::LocalFallback, snapshot_id: Some(snapshot_id) })
    }

    /// Local re-derivation of voting power.
    ///
    /// An address that delegates away holds nothing. A terminal address gets
    /// its own balance plus the balances of delegators whose delegate is
    /// confirmed to be it, walking `transitive_levels` further levels of
    /// delegators-of-delegators. Balances are read at `snapshot_id`; the
    /// delegator lists are current.
    pub async fn local_voting_power(&self, address: Address, snapshot_id: u64) -> StrategyResult<TokenAmount> {
        // One hop is enough to tell whether `address` still holds its weight.
        let chain = DelegationResolver::new(self.gateway).resolve_chain(address, 1).await;
        if chain.depth() > 0 {
            debug!("{} delegates to {}, no local voting power", address.short(), chain.addresses[1].short());
            return Ok(TokenAmount::zero());
        }
        if !chain.is_authoritative() {
            return Err(StrategyError::NotApplicable(format!(
                "could not confirm {} is self-delegated: {}",
                address.short(),
                chain.error.unwrap_or_default()
            )));
        }

        let mut total = self.gateway.balance_of(address, Some(snapshot_id)).await?;
        let mut counted = HashSet::from([address]);
        let mut frontier = vec![address];

        for level in 0..=self.transitive_levels {
            if frontier.is_empty() {
                break;
            }

            let listings = join_all(frontier.iter().map(|target| {
                let target = *target;
                async move { (target, self.gateway.delegators_of(target).await) }
            }))
            .await;

            let mut candidates = Vec::new();
            for (target, listing) in listings {
                match listing {
                    Ok(delegators) => {
                        for delegator in delegators {
                            if !counted.contains(&delegator) && !candidates.iter().any(|(d, _)| *d == delegator) {
                                candidates.push((delegator, target));
                            }
                        }
                    }
                    // The root's delegators are the bulk of the result; without them there is no answer.
                    Err(e) if level == 0 => return Err(e.into()),
                    Err(e) => warn!("Delegators of {} unavailable: {}", target.short(), e),
                }
            }

            let verified = join_all(candidates.into_iter().map(|(delegator, target)| async move {
                let (delegate, balance) = join!(
                    self.gateway.delegate_of(delegator),
                    self.gateway.balance_of(delegator, Some(snapshot_id))
                );
                (delegator, target, delegate, balance)
            }))
            .await;

            let mut next_frontier = Vec::new();
            for (delegator, target, delegate, balance) in verified {
                match (delegate, balance) {
                    (Ok(Some(actual)), Ok(balance)) if actual == target => {
                        if counted.insert(delegator) {
                            total = total.saturating_add(balance);
                            next_frontier.push(delegator);
                        }
                    }
                    (Ok(actual), Ok(_)) => debug!(
                        "Skipping {}: listed as delegator of {} but delegates to {:?}",
                        delegator.short(),
                        target.short(),
                        actual
                    ),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("Skipping delegator {} after failed lookup: {}", delegator.short(), e)
                    }
                }
            }
            frontier = next_frontier;
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GovernanceConfig;
    use crate::gateway::MemoryGateway;
    use pretty_assertions::assert_eq;

    fn addr(n: u8) -> Address {
        Address::new([n; 20])
    }

    fn tokens(n: u64) -> TokenAmount {
        TokenAmount::from_tokens(n, 18)
    }

    #[tokio::test]
    async fn test_local_power_sums_direct_delegators() {
        let gateway = MemoryGateway::new(1);
        gateway.set_balance(addr(1), tokens(100));
        gateway.set_balance(addr(2), tokens(20));
        gateway.set_balance(addr(3), tokens(5));
        gateway.set_delegate(addr(2), addr(1));
        gateway.set_delegate(addr(3), addr(1));
        let snapshot = gateway.take_snapshot();

        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let aggregator = VotingPowerAggregator::new(&typed, 1);
        let local = aggregator.local_voting_power(addr(1), snapshot).await.unwrap();
        assert_eq!(local, tokens(125));
    }

    #[tokio::test]
    async fn test_delegating_address_has_zero_power() {
        let gateway = MemoryGateway::new(1);
        gateway.set_balance(addr(1), tokens(100));
        gateway.set_balance(addr(2), tokens(20));
        gateway.set_delegate(addr(2), addr(1));
        let snapshot = gateway.take_snapshot();

        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let aggregator = VotingPowerAggregator::new(&typed, 1);
        assert_eq!(aggregator.local_voting_power(addr(2), snapshot).await.unwrap(), TokenAmount::zero());
        assert_eq!(aggregator.compute_voting_power(addr(2), snapshot).await.amount, TokenAmount::zero());
    }

    #[tokio::test]
    async fn test_fallback_used_when_effective_power_fails() {
        let gateway = MemoryGateway::new(1);
        gateway.set_balance(addr(1), tokens(10));
        gateway.set_balance(addr(2), tokens(7));
        gateway.set_delegate(addr(2), addr(1));
        let snapshot = gateway.take_snapshot();
        gateway.fail_method("getEffectiveVotingPower");

        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let power = VotingPowerAggregator::new(&typed, 1).compute_voting_power(addr(1), snapshot).await;
        assert_eq!(power.amount, tokens(17));
        assert_eq!(power.source, PowerSource::LocalFallback);
    }

    #[tokio::test]
    async fn test_one_extra_level_is_counted_but_not_two() {
        // 4 -> 3 -> 2 -> 1
        let gateway = MemoryGateway::new(1);
        for n in 1..=4 {
            gateway.set_balance(addr(n), tokens(1));
        }
        gateway.set_delegate(addr(2), addr(1));
        gateway.set_delegate(addr(3), addr(2));
        gateway.set_delegate(addr(4), addr(3));
        let snapshot = gateway.take_snapshot();

        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let one_level = VotingPowerAggregator::new(&typed, 1);
        assert_eq!(one_level.local_voting_power(addr(1), snapshot).await.unwrap(), tokens(3));

        let check = one_level.cross_check(addr(1), snapshot).await;
        assert_eq!(check.on_chain, Some(tokens(4)));
        assert!(!check.consistent);

        let two_levels = VotingPowerAggregator::new(&typed, 2);
        assert_eq!(two_levels.local_voting_power(addr(1), snapshot).await.unwrap(), tokens(4));
        assert!(two_levels.cross_check(addr(1), snapshot).await.consistent);
    }

    #[tokio::test]
    async fn test_unresolvable_delegate_yields_unavailable() {
        let gateway = MemoryGateway::new(1);
        gateway.set_balance(addr(1), tokens(10));
        let snapshot = gateway.take_snapshot();
        gateway.fail_method("getEffectiveVotingPower");
        gateway.fail_method("getDelegate");

        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let power = VotingPowerAggregator::new(&typed, 1).compute_voting_power(addr(1), snapshot).await;
        assert_eq!(power, VotingPower::unavailable(Some(snapshot)));
    }

    #[tokio::test]
    async fn test_zero_balance_without_delegators_is_zero() {
        let gateway = MemoryGateway::new(1);
        let snapshot = gateway.take_snapshot();
        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let aggregator = VotingPowerAggregator::new(&typed, 1);
        assert_eq!(aggregator.local_voting_power(addr(9), snapshot).await.unwrap(), TokenAmount::zero());
        assert_eq!(aggregator.compute_voting_power(addr(9), snapshot).await.source, PowerSource::OnChain);
    }
}
