use std::collections::HashSet;

use log::{debug, warn};
use serde::Serialize;

use crate::error::{GatewayError, GovernanceError, Result};
use crate::gateway::{ContractGateway, TypedGateway};
use crate::types::Address;

/// Why a delegation walk stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChainTermination {
    /// The last address delegates to itself.
    SelfDelegated,
    /// The last address has no delegate (null address).
    Undelegated,
    /// The next hop was already visited; `repeated` is that address.
    Cycle { repeated: Address },
    /// `max_depth` lookups were made without reaching a terminal address.
    DepthExhausted,
    /// A lookup failed; the chain holds what was resolved before it.
    LookupFailed,
}

/// Ordered walk of the "delegate of" relation starting at `addresses[0]`.
///
/// No address appears twice in `addresses`. A detected cycle is recorded in
/// `termination` instead of repeating the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelegationChain {
    pub addresses: Vec<Address>,
    pub termination: ChainTermination,
    pub error: Option<String>,
}

impl DelegationChain {
    /// Chain that could not be walked at all.
    pub fn unresolved(start: Address, error: impl Into<String>) -> Self {
        Self {
            addresses: vec![start],
            termination: ChainTermination::LookupFailed,
            error: Some(error.into()),
        }
    }

    /// Number of delegation hops walked.
    pub fn depth(&self) -> usize {
        self.addresses.len().saturating_sub(1)
    }

    /// Address holding the voting weight, when the walk reached one.
    pub fn terminal(&self) -> Option<Address> {
        match self.termination {
            ChainTermination::SelfDelegated | ChainTermination::Undelegated => self.addresses.last().copied(),
            _ => None,
        }
    }

    /// Only complete walks may be used to attribute voting power.
    pub fn is_authoritative(&self) -> bool {
        self.terminal().is_some()
    }

    pub fn has_cycle(&self) -> bool {
        matches!(self.termination, ChainTermination::Cycle { .. })
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    /// `0xaaaa…aaaa -> 0xbbbb…bbbb -> (cycle: 0xaaaa…aaaa)`
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = self.addresses.iter().map(Address::short).collect();
        match &self.termination {
            ChainTermination::Cycle { repeated } => parts.push(format!("(cycle: {})", repeated.short())),
            ChainTermination::DepthExhausted => parts.push("(max depth)".to_string()),
            ChainTermination::LookupFailed => parts.push("(lookup failed)".to_string()),
            ChainTermination::SelfDelegated | ChainTermination::Undelegated => {}
        }
        parts.join(" -> ")
    }
}

/// Walks delegation edges through the token contract.
pub struct DelegationResolver<'a, 'g, G: ?Sized> {
    gateway: &'a TypedGateway<'g, G>,
}

impl<'a, 'g, G: ContractGateway + ?Sized> DelegationResolver<'a, 'g, G> {
    pub fn new(gateway: &'a TypedGateway<'g, G>) -> Self {
        Self { gateway }
    }

    /// Follows "delegate of" from `start` for at most `max_depth` lookups.
    ///
    /// Lookups are sequential since each hop depends on the previous answer.
    /// Never fails: a lookup error ends the walk with
    /// [`ChainTermination::LookupFailed`].
    pub async fn resolve_chain(&self, start: Address, max_depth: usize) -> DelegationChain {
        let mut addresses = vec![start];
        let mut visited = HashSet::from([start]);
        let mut current = start;

        for _ in 0..max_depth {
            let delegate = match self.gateway.delegate_of(current).await {
                Ok(delegate) => delegate,
                Err(e) => {
                    warn!("Delegate lookup for {} failed: {}", current.short(), e);
                    return DelegationChain {
                        addresses,
                        termination: ChainTermination::LookupFailed,
                        error: Some(e.to_string()),
                    };
                }
            };

            let next = match delegate {
                None => {
                    return DelegationChain { addresses, termination: ChainTermination::Undelegated, error: None };
                }
                Some(next) if next == current => {
                    return DelegationChain { addresses, termination: ChainTermination::SelfDelegated, error: None };
                }
                Some(next) => next,
            };

            if visited.contains(&next) {
                warn!("Delegation cycle detected at {} while walking from {}", next.short(), start.short());
                return DelegationChain {
                    addresses,
                    termination: ChainTermination::Cycle { repeated: next },
                    error: None,
                };
            }

            addresses.push(next);
            visited.insert(next);
            current = next;
        }

        debug!("Delegation walk from {} hit max depth {}", start.short(), max_depth);
        DelegationChain { addresses, termination: ChainTermination::DepthExhausted, error: None }
    }

    /// Checks that `from` may delegate to `to` without closing a cycle or
    /// growing a chain beyond `max_depth`. Returns the target's chain.
    pub async fn check_new_delegation(&self, from: Address, to: Address, max_depth: usize) -> Result<DelegationChain> {
        let chain = self.resolve_chain(to, max_depth).await;

        if chain.contains(&from) || chain.has_cycle() {
            return Err(GovernanceError::DelegationCycle { from, to });
        }
        match chain.termination {
            ChainTermination::LookupFailed => {
                let reason = chain.error.clone().unwrap_or_else(|| "delegate lookup failed".to_string());
                Err(GovernanceError::Gateway(GatewayError::Rpc(reason)))
            }
            ChainTermination::DepthExhausted => Err(GovernanceError::DelegationTooDeep {
                depth: chain.depth() + 1,
                max: max_depth,
            }),
            _ if chain.depth() + 1 > max_depth => Err(GovernanceError::DelegationTooDeep {
                depth: chain.depth() + 1,
                max: max_depth,
            }),
            _ => Ok(chain),
        }
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

    fn setup(edges: &[(u8, u8)]) -> MemoryGateway {
        let gateway = MemoryGateway::new(1);
        for (from, to) in edges {
            gateway.set_delegate(addr(*from), addr(*to));
        }
        gateway
    }

    #[tokio::test]
    async fn test_undelegated_address_is_its_own_chain() {
        let gateway = setup(&[]);
        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let chain = DelegationResolver::new(&typed).resolve_chain(addr(1), 10).await;

        assert_eq!(chain.addresses, vec![addr(1)]);
        assert_eq!(chain.termination, ChainTermination::Undelegated);
        assert_eq!(chain.terminal(), Some(addr(1)));
    }

    #[tokio::test]
    async fn test_self_delegation_terminates() {
        let gateway = setup(&[(1, 1)]);
        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let chain = DelegationResolver::new(&typed).resolve_chain(addr(1), 10).await;

        assert_eq!(chain.addresses, vec![addr(1)]);
        assert_eq!(chain.termination, ChainTermination::SelfDelegated);
    }

    #[tokio::test]
    async fn test_linear_chain_reaches_terminal() {
        let gateway = setup(&[(1, 2), (2, 3), (3, 3)]);
        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let chain = DelegationResolver::new(&typed).resolve_chain(addr(1), 10).await;

        assert_eq!(chain.addresses, vec![addr(1), addr(2), addr(3)]);
        assert_eq!(chain.terminal(), Some(addr(3)));
        assert_eq!(chain.depth(), 2);
        assert!(chain.is_authoritative());
    }

    #[tokio::test]
    async fn test_cycle_is_detected_and_bounded() {
        let gateway = setup(&[(1, 2), (2, 3), (3, 1)]);
        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let max_depth = 10;
        let chain = DelegationResolver::new(&typed).resolve_chain(addr(1), max_depth).await;

        assert_eq!(chain.addresses, vec![addr(1), addr(2), addr(3)]);
        assert_eq!(chain.termination, ChainTermination::Cycle { repeated: addr(1) });
        assert!(chain.addresses.len() <= max_depth + 1);
        assert!(!chain.is_authoritative());
        assert!(chain.render().ends_with("(cycle: 0x0101…0101)"));
    }

    #[tokio::test]
    async fn test_depth_bound_stops_long_chains() {
        let gateway = setup(&[(1, 2), (2, 3), (3, 4), (4, 5)]);
        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let chain = DelegationResolver::new(&typed).resolve_chain(addr(1), 2).await;

        assert_eq!(chain.addresses, vec![addr(1), addr(2), addr(3)]);
        assert_eq!(chain.termination, ChainTermination::DepthExhausted);
        assert_eq!(chain.terminal(), None);
    }

    #[tokio::test]
    async fn test_lookup_failure_returns_partial_chain() {
        let gateway = setup(&[(1, 2)]);
        gateway.fail_method("getDelegate");
        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let chain = DelegationResolver::new(&typed).resolve_chain(addr(1), 10).await;

        assert_eq!(chain.addresses, vec![addr(1)]);
        assert_eq!(chain.termination, ChainTermination::LookupFailed);
        assert!(chain.error.is_some());
        assert!(!chain.is_authoritative());
    }

    #[tokio::test]
    async fn test_new_delegation_rejects_cycles() {
        // 2 -> 3 -> 1, so 1 -> 2 would close a loop
        let gateway = setup(&[(2, 3), (3, 1)]);
        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let resolver = DelegationResolver::new(&typed);

        let err = resolver.check_new_delegation(addr(1), addr(2), 10).await.unwrap_err();
        assert!(matches!(err, GovernanceError::DelegationCycle { .. }));

        let ok = resolver.check_new_delegation(addr(4), addr(2), 10).await.unwrap();
        assert_eq!(ok.terminal(), Some(addr(1)));
    }

    #[tokio::test]
    async fn test_new_delegation_rejects_deep_chains() {
        let gateway = setup(&[(2, 3), (3, 4)]);
        let typed = TypedGateway::new(&gateway, &GovernanceConfig::default());
        let resolver = DelegationResolver::new(&typed);

        let err = resolver.check_new_delegation(addr(1), addr(2), 2).await.unwrap_err();
        assert!(matches!(err, GovernanceError::DelegationTooDeep { max: 2, .. }));
        assert!(resolver.check_new_delegation(addr(1), addr(2), 3).await.is_ok());
    }
}
