mod actions_test;

use crate::config::GovernanceConfig;
use crate::gateway::MemoryGateway;
use crate::governance::GovernanceService;
use crate::types::{Address, GovernanceParams, ProposalState, TokenAmount};

pub(crate) fn addr(n: u8) -> Address {
    Address::new([n; 20])
}

pub(crate) fn tokens(n: u64) -> TokenAmount {
    TokenAmount::from_tokens(n, 18)
}

/// Small DAO: 1 is self-delegated with 100, 2 (30) and 3 (20) delegate to 1,
/// 4 holds 50 undelegated. Proposal 1 is active at snapshot 1; quorum 120.
pub(crate) fn dao() -> MemoryGateway {
    let gateway = MemoryGateway::new(1);
    gateway.set_balance(addr(1), tokens(100));
    gateway.set_balance(addr(2), tokens(30));
    gateway.set_balance(addr(3), tokens(20));
    gateway.set_balance(addr(4), tokens(50));
    gateway.set_delegate(addr(1), addr(1));
    gateway.set_delegate(addr(2), addr(1));
    gateway.set_delegate(addr(3), addr(1));
    gateway.set_params(GovernanceParams {
        quorum: tokens(120),
        proposal_threshold: tokens(40),
        voting_delay: 1,
        voting_period: 100,
        timelock_delay: 3600,
    });
    let snapshot = gateway.take_snapshot();
    gateway.add_proposal(1, addr(1), ProposalState::Active, snapshot);
    gateway
}

pub(crate) fn service(gateway: MemoryGateway) -> GovernanceService<MemoryGateway> {
    GovernanceService::new(gateway, GovernanceConfig::default()).unwrap()
}
