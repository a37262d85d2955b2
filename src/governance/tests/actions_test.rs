use pretty_assertions::assert_eq;

use super::{addr, dao, service, tokens};
use crate::error::{GatewayError, GovernanceError};
use crate::governance::ProposalDraft;
use crate::types::{Address, ProposalState, TallySource, VoteSupport};

#[tokio::test]
async fn test_delegate_then_power_moves() {
    let service = service(dao());
    service.delegate(addr(4), addr(1)).await.unwrap();

    assert_eq!(service.resolve_chain(addr(4)).await.terminal(), Some(addr(1)));
    let snapshot = service.gateway().take_snapshot();
    assert_eq!(service.compute_voting_power(addr(1), Some(snapshot)).await.amount, tokens(200));
    assert_eq!(service.compute_voting_power(addr(4), Some(snapshot)).await.amount, tokens(0));
}

#[tokio::test]
async fn test_self_delegation_is_a_reset() {
    let service = service(dao());
    service.delegate(addr(2), addr(2)).await.unwrap();

    assert_eq!(service.gateway().call_count("resetDelegation"), 1);
    assert_eq!(service.gateway().call_count("delegate"), 0);
    assert_eq!(service.resolve_chain(addr(2)).await.addresses, vec![addr(2)]);
}

#[tokio::test]
async fn test_delegate_rejections() {
    let service = service(dao());

    let err = service.delegate(addr(1), Address::ZERO).await.unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidAddress(_)));

    let err = service.delegate(addr(9), addr(1)).await.unwrap_err();
    assert!(matches!(err, GovernanceError::InsufficientBalance(a) if a == addr(9)));

    // 2 -> 1 already, so 1 -> 2 closes a loop
    let err = service.delegate(addr(1), addr(2)).await.unwrap_err();
    assert!(matches!(err, GovernanceError::DelegationCycle { .. }));
    assert_eq!(service.gateway().call_count("delegate"), 0);
}

#[tokio::test]
async fn test_write_on_disconnected_gateway_fails() {
    let gateway = dao();
    gateway.set_ready(false);
    let service = service(gateway);
    let err = service.reset_delegation(addr(1)).await.unwrap_err();
    assert!(matches!(err, GovernanceError::NotConnected));
}

#[tokio::test]
async fn test_vote_is_counted() {
    let service = service(dao());
    service
        .cast_vote(addr(1), 1, VoteSupport::For, Some("ship it".into()))
        .await
        .unwrap();

    assert_eq!(service.gateway().call_count("castVoteWithReason"), 1);
    let totals = service.get_vote_totals(1, Some(addr(1))).await;
    assert_eq!(totals.for_votes, tokens(150));
    assert_eq!(totals.source, TallySource::Aggregate);
}

#[tokio::test]
async fn test_vote_rejections() {
    let gateway = dao();
    gateway.add_proposal(2, addr(1), ProposalState::Defeated, 1);
    let service = service(gateway);

    let err = service.cast_vote(addr(1), 2, VoteSupport::For, None).await.unwrap_err();
    assert!(matches!(err, GovernanceError::ProposalNotActive { proposal_id: 2, state: ProposalState::Defeated }));

    let err = service.cast_vote(addr(2), 1, VoteSupport::Against, None).await.unwrap_err();
    assert!(matches!(err, GovernanceError::NoVotingPower { proposal_id: 1, .. }));

    let err = service.cast_vote(addr(1), 7, VoteSupport::For, None).await.unwrap_err();
    assert!(matches!(err, GovernanceError::Gateway(GatewayError::Reverted(_))));
}

#[tokio::test]
async fn test_propose_creates_active_proposal() {
    let service = service(dao());
    let draft = ProposalDraft {
        targets: vec![addr(4)],
        values: vec![tokens(1)],
        calldatas: vec![Vec::new()],
        description: "Send one token to 4".into(),
    };

    service.propose(addr(1), draft.clone()).await.unwrap();
    assert_eq!(service.gateway().latest_proposal_id(), Some(2));
    assert_eq!(service.proposal_outcome(2, None).await.state, Some(ProposalState::Active));

    // Threshold is 40: 4 holds 50 undelegated, 2 delegates everything away.
    service.propose(addr(4), draft.clone()).await.unwrap();
    let err = service.propose(addr(2), draft).await.unwrap_err();
    assert!(matches!(err, GovernanceError::BelowProposalThreshold { .. }));
}

#[tokio::test]
async fn test_malformed_proposal_is_not_sent() {
    let service = service(dao());
    let draft = ProposalDraft {
        targets: vec![addr(4), addr(5)],
        values: vec![tokens(1)],
        calldatas: vec![Vec::new()],
        description: "broken".into(),
    };
    let err = service.propose(addr(1), draft).await.unwrap_err();
    assert!(matches!(err, GovernanceError::InvalidProposal(_)));
    assert_eq!(service.gateway().call_count("propose"), 0);
}
