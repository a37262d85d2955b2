use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ContractCall, ContractGateway, ContractWrite, EventKind, LogFilter, RawLog, TxHash};
use crate::error::{GatewayError, GatewayResult, GovernanceError};
use crate::types::{
    Address, GovernanceParams, ProposalId, ProposalState, TokenAmount, TransferRecord, VoteRecord,
    VoteSupport, VoteTotals,
};

/// How the model encodes responses, mirroring the two shapes wallet
/// providers hand back for contract structs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseShape {
    /// Positional arrays, integers as decimal strings.
    #[default]
    Tuple,
    /// Objects with named members, integers as `{ "hex": … }` big numbers.
    Named,
}

/// Balances and delegation edges at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ledger {
    pub balances: BTreeMap<Address, TokenAmount>,
    pub delegates: BTreeMap<Address, Address>,
}

impl Ledger {
    pub fn balance(&self, account: &Address) -> TokenAmount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// `None` for accounts that never delegated or delegated to the null address.
    pub fn delegate_of(&self, account: &Address) -> Option<Address> {
        self.delegates.get(account).copied().filter(|delegate| !delegate.is_zero())
    }

    pub fn delegators_of(&self, account: &Address) -> Vec<Address> {
        self.delegates
            .iter()
            .filter(|(from, to)| *to == account && *from != account)
            .map(|(from, _)| *from)
            .collect()
    }

    pub fn delegated_to(&self, account: &Address) -> TokenAmount {
        self.delegators_of(account).iter().map(|from| self.balance(from)).sum()
    }

    /// Address where `account`'s weight finally lands, `None` when the walk
    /// runs into a cycle.
    pub fn terminal_of(&self, account: &Address) -> Option<Address> {
        let mut visited = HashSet::new();
        let mut current = *account;
        loop {
            if !visited.insert(current) {
                return None;
            }
            match self.delegate_of(&current) {
                Some(next) if next != current => current = next,
                _ => return Some(current),
            }
        }
    }

    /// Full transitive voting power, the way the token contract computes it.
    pub fn effective_power(&self, account: &Address) -> TokenAmount {
        if matches!(self.delegate_of(account), Some(delegate) if delegate != *account) {
            return TokenAmount::zero();
        }
        self.balances
            .iter()
            .filter(|(holder, _)| self.terminal_of(holder) == Some(*account))
            .map(|(_, balance)| *balance)
            .sum()
    }

}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalFixture {
    pub id: ProposalId,
    pub proposer: Address,
    pub state: ProposalState,
    pub snapshot_id: u64,
    #[serde(default)]
    pub description: String,
}

/// Serializable starting state of a [`MemoryGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub chain_id: u64,
    pub block_number: u64,
    pub params: GovernanceParams,
    pub ledger: Ledger,
    /// Snapshot `n` is `snapshots[n - 1]`.
    pub snapshots: Vec<Ledger>,
    pub proposals: Vec<ProposalFixture>,
    pub votes: Vec<VoteRecord>,
    pub transfers: Vec<TransferRecord>,
    /// Whether the governor exposes `getProposalVoteTotals`.
    pub supports_vote_totals: bool,
    pub response_shape: ResponseShape,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            chain_id: 1,
            block_number: 1,
            params: GovernanceParams::default(),
            ledger: Ledger::default(),
            snapshots: Vec::new(),
            proposals: Vec::new(),
            votes: Vec::new(),
            transfers: Vec::new(),
            supports_vote_totals: true,
            response_shape: ResponseShape::Tuple,
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    ready: bool,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: HashMap<String, usize>,
}

/// Complete in-memory model of the token, governor and timelock contracts.
///
/// Backs the CLI's offline mode and every test. Faults (failing or slow
/// methods, a detached provider) can be injected per contract method name.
pub struct MemoryGateway {
    state: RwLock<Fixture>,
    faults: RwLock<Faults>,
    next_tx: RwLock<u64>,
}

impl MemoryGateway {
    pub fn new(chain_id: u64) -> Self {
        Self::from_fixture(Fixture { chain_id, ..Fixture::default() })
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        Self {
            state: RwLock::new(fixture),
            faults: RwLock::new(Faults { ready: true, ..Faults::default() }),
            next_tx: RwLock::new(0),
        }
    }

    pub fn from_fixture_file(path: impl AsRef<Path>) -> Result<Self, GovernanceError> {
        let raw = std::fs::read_to_string(path)?;
        let fixture: Fixture = serde_json::from_str(&raw)?;
        info!(
            "Loaded fixture: chain {}, {} accounts, {} proposals",
            fixture.chain_id,
            fixture.ledger.balances.len(),
            fixture.proposals.len()
        );
        Ok(Self::from_fixture(fixture))
    }

    fn state(&self) -> RwLockReadGuard<'_, Fixture> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, Fixture> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn faults_mut(&self) -> RwLockWriteGuard<'_, Faults> {
        self.faults.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Fixture {
        self.state().clone()
    }

    // Fixture editing

    pub fn set_balance(&self, account: Address, amount: TokenAmount) {
        self.state_mut().ledger.balances.insert(account, amount);
    }

    pub fn set_delegate(&self, from: Address, to: Address) {
        self.state_mut().ledger.delegates.insert(from, to);
    }

    /// Freezes the current ledger and returns the new snapshot id.
    pub fn take_snapshot(&self) -> u64 {
        let mut state = self.state_mut();
        let frozen = state.ledger.clone();
        state.snapshots.push(frozen);
        state.snapshots.len() as u64
    }

    pub fn add_proposal(&self, id: ProposalId, proposer: Address, state: ProposalState, snapshot_id: u64) {
        self.state_mut().proposals.push(ProposalFixture {
            id,
            proposer,
            state,
            snapshot_id,
            description: String::new(),
        });
    }

    /// Appends a vote-cast event with an explicit weight in a new block.
    pub fn record_vote(&self, voter: Address, proposal_id: ProposalId, support: VoteSupport, weight: TokenAmount) {
        let mut state = self.state_mut();
        state.block_number += 1;
        let block_number = state.block_number;
        state.votes.push(VoteRecord { voter, proposal_id, support, weight, block_number, log_index: 0 });
    }

    pub fn record_transfer(&self, from: Address, to: Address, amount: TokenAmount) {
        let mut state = self.state_mut();
        state.block_number += 1;
        let block_number = state.block_number;
        state.transfers.push(TransferRecord { from, to, amount, block_number, log_index: 0 });
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.state_mut().block_number = block_number;
    }

    pub fn set_params(&self, params: GovernanceParams) {
        self.state_mut().params = params;
    }

    pub fn set_supports_vote_totals(&self, supported: bool) {
        self.state_mut().supports_vote_totals = supported;
    }

    pub fn set_response_shape(&self, shape: ResponseShape) {
        self.state_mut().response_shape = shape;
    }

    pub fn latest_proposal_id(&self) -> Option<ProposalId> {
        self.state().proposals.iter().map(|p| p.id).max()
    }

    // Fault injection

    pub fn set_ready(&self, ready: bool) {
        self.faults_mut().ready = ready;
    }

    pub fn fail_method(&self, method: &str) {
        self.faults_mut().failing.insert(method.to_string());
    }

    pub fn delay_method(&self, method: &str, delay: Duration) {
        self.faults_mut().delays.insert(method.to_string(), delay);
    }

    /// Number of times `method` reached the gateway.
    pub fn call_count(&self, method: &str) -> usize {
        self.faults
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .calls
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    async fn enter(&self, method: &'static str) -> GatewayResult<()> {
        let delay = {
            let mut faults = self.faults_mut();
            if !faults.ready {
                return Err(GatewayError::NotInitialized);
            }
            *faults.calls.entry(method.to_string()).or_insert(0) += 1;
            if faults.failing.contains(method) {
                return Err(GatewayError::Rpc(format!("{} failed (injected)", method)));
            }
            faults.delays.get(method).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

fn snapshot_ledger(state: &Fixture, snapshot_id: u64) -> GatewayResult<&Ledger> {
    snapshot_id
        .checked_sub(1)
        .and_then(|index| state.snapshots.get(index as usize))
        .ok_or_else(|| GatewayError::Reverted(format!("unknown snapshot {}", snapshot_id)))
}

fn find_proposal(state: &Fixture, proposal_id: ProposalId) -> GatewayResult<&ProposalFixture> {
    state
        .proposals
        .iter()
        .find(|p| p.id == proposal_id)
        .ok_or_else(|| GatewayError::Reverted(format!("unknown proposal {}", proposal_id)))
}

/// Latest vote per voter, in chain order.
fn latest_votes(state: &Fixture, proposal_id: ProposalId) -> BTreeMap<Address, VoteRecord> {
    let mut votes: Vec<&VoteRecord> = state.votes.iter().filter(|v| v.proposal_id == proposal_id).collect();
    votes.sort_by_key(|v| v.ordering_key());
    votes.into_iter().map(|v| (v.voter, v.clone())).collect()
}

fn encode_amount(shape: ResponseShape, amount: TokenAmount) -> Value {
    match shape {
        ResponseShape::Tuple => Value::String(amount.to_string()),
        ResponseShape::Named => json!({ "type": "BigNumber", "hex": format!("0x{:x}", amount.raw()) }),
    }
}

fn encode_totals(shape: ResponseShape, totals: &VoteTotals) -> Value {
    match shape {
        ResponseShape::Tuple => json!([
            totals.for_votes.to_string(),
            totals.against_votes.to_string(),
            totals.abstain_votes.to_string(),
            totals.total_voters,
        ]),
        ResponseShape::Named => json!({
            "forVotes": encode_amount(shape, totals.for_votes),
            "againstVotes": encode_amount(shape, totals.against_votes),
            "abstainVotes": encode_amount(shape, totals.abstain_votes),
            "totalVoters": totals.total_voters,
        }),
    }
}

fn encode_vote(shape: ResponseShape, vote: &VoteRecord) -> Value {
    match shape {
        ResponseShape::Tuple => json!([
            vote.voter.to_string(),
            vote.proposal_id.to_string(),
            vote.support.as_u8(),
            vote.weight.to_string(),
            "",
        ]),
        ResponseShape::Named => json!({
            "voter": vote.voter.to_string(),
            "proposalId": vote.proposal_id,
            "support": vote.support.as_u8(),
            "votes": encode_amount(shape, vote.weight),
        }),
    }
}

fn encode_transfer(shape: ResponseShape, transfer: &TransferRecord) -> Value {
    match shape {
        ResponseShape::Tuple => json!([transfer.from.to_string(), transfer.to.to_string(), transfer.amount.to_string()]),
        ResponseShape::Named => json!({
            "from": transfer.from.to_string(),
            "to": transfer.to.to_string(),
            "value": encode_amount(shape, transfer.amount),
        }),
    }
}

#[async_trait(?Send)]
impl ContractGateway for MemoryGateway {
    fn is_ready(&self) -> bool {
        self.faults.read().map(|faults| faults.ready).unwrap_or(false)
    }

    fn chain_id(&self) -> u64 {
        self.state().chain_id
    }

    async fn block_number(&self) -> GatewayResult<u64> {
        self.enter("blockNumber").await?;
        Ok(self.state().block_number)
    }

    async fn call(&self, call: &ContractCall) -> GatewayResult<Value> {
        self.enter(call.method()).await?;
        let state = self.state();
        let shape = state.response_shape;
        let ledger = &state.ledger;

        let value = match call {
            ContractCall::BalanceOf { account, snapshot_id: None } => encode_amount(shape, ledger.balance(account)),
            ContractCall::BalanceOf { account, snapshot_id: Some(id) } => {
                encode_amount(shape, snapshot_ledger(&state, *id)?.balance(account))
            }
            ContractCall::Delegates { account } => {
                Value::String(ledger.delegate_of(account).unwrap_or(Address::ZERO).to_string())
            }
            ContractCall::DelegatorsOf { account } => {
                Value::Array(ledger.delegators_of(account).iter().map(|a| Value::String(a.to_string())).collect())
            }
            ContractCall::DelegatedTo { account } => encode_amount(shape, ledger.delegated_to(account)),
            ContractCall::CurrentSnapshotId => json!(state.snapshots.len()),
            ContractCall::EffectiveVotingPower { account, snapshot_id } => {
                encode_amount(shape, snapshot_ledger(&state, *snapshot_id)?.effective_power(account))
            }
            ContractCall::ProposalState { proposal_id } => json!(find_proposal(&state, *proposal_id)?.state.as_u8()),
            ContractCall::ProposalSnapshot { proposal_id } => json!(find_proposal(&state, *proposal_id)?.snapshot_id),
            ContractCall::ProposalVoteTotals { proposal_id } => {
                if !state.supports_vote_totals {
                    return Err(GatewayError::Unsupported("getProposalVoteTotals"));
                }
                find_proposal(&state, *proposal_id)?;
                let mut totals = VoteTotals::no_data();
                let latest = latest_votes(&state, *proposal_id);
                for vote in latest.values() {
                    totals.add_vote(vote.support, vote.weight);
                }
                totals.total_voters = latest.len() as u64;
                encode_totals(shape, &totals)
            }
            ContractCall::VoteReceipt { proposal_id, voter } => {
                let latest = latest_votes(&state, *proposal_id);
                match (latest.get(voter), shape) {
                    (Some(vote), ResponseShape::Tuple) => json!([true, vote.support.as_u8(), vote.weight.to_string()]),
                    (Some(vote), ResponseShape::Named) => json!({
                        "hasVoted": true,
                        "support": vote.support.as_u8(),
                        "votes": encode_amount(shape, vote.weight),
                    }),
                    (None, ResponseShape::Tuple) => json!([false, 0, "0"]),
                    (None, ResponseShape::Named) => json!({ "hasVoted": false, "support": 0, "votes": "0" }),
                }
            }
            ContractCall::GovernanceParams => {
                let params = &state.params;
                match shape {
                    // Older governors do not report the timelock delay themselves.
                    ResponseShape::Tuple => json!([
                        params.quorum.to_string(),
                        params.proposal_threshold.to_string(),
                        params.voting_delay,
                        params.voting_period,
                    ]),
                    ResponseShape::Named => json!({
                        "quorum": encode_amount(shape, params.quorum),
                        "proposalThreshold": encode_amount(shape, params.proposal_threshold),
                        "votingDelay": params.voting_delay,
                        "votingPeriod": params.voting_period,
                        "timelockDelay": params.timelock_delay,
                    }),
                }
            }
            ContractCall::TimelockDelay => json!(state.params.timelock_delay),
        };
        Ok(value)
    }

    async fn logs(&self, filter: &LogFilter) -> GatewayResult<Vec<RawLog>> {
        self.enter(filter.event.name()).await?;
        let state = self.state();
        let shape = state.response_shape;
        let in_range = |block: u64| block >= filter.from_block && block <= filter.to_block;

        let logs = match filter.event {
            EventKind::VoteCast => state
                .votes
                .iter()
                .filter(|v| in_range(v.block_number))
                .filter(|v| filter.proposal_id.map_or(true, |id| v.proposal_id == id))
                .filter(|v| filter.voter.map_or(true, |voter| v.voter == voter))
                .map(|v| RawLog { block_number: v.block_number, log_index: v.log_index, fields: encode_vote(shape, v) })
                .collect(),
            EventKind::Transfer => state
                .transfers
                .iter()
                .filter(|t| in_range(t.block_number))
                .map(|t| RawLog {
                    block_number: t.block_number,
                    log_index: t.log_index,
                    fields: encode_transfer(shape, t),
                })
                .collect(),
        };
        Ok(logs)
    }

    async fn send(&self, from: Address, write: &ContractWrite) -> GatewayResult<TxHash> {
        self.enter(write.method()).await?;
        let mut state = self.state_mut();

        match write {
            ContractWrite::Delegate { to } => {
                if *to == from || to.is_zero() {
                    state.ledger.delegates.remove(&from);
                } else {
                    let previous = state.ledger.delegates.insert(from, *to);
                    if state.ledger.terminal_of(&from).is_none() {
                        match previous {
                            Some(previous) => state.ledger.delegates.insert(from, previous),
                            None => state.ledger.delegates.remove(&from),
                        };
                        return Err(GatewayError::Reverted("delegation cycle".into()));
                    }
                }
            }
            ContractWrite::ResetDelegation => {
                state.ledger.delegates.remove(&from);
            }
            ContractWrite::CastVote { proposal_id, support, .. } => {
                let proposal = find_proposal(&state, *proposal_id)?;
                if !proposal.state.is_open_for_voting() {
                    return Err(GatewayError::Reverted(format!("proposal {} is not active", proposal_id)));
                }
                let weight = snapshot_ledger(&state, proposal.snapshot_id)?.effective_power(&from);
                if weight.is_zero() {
                    return Err(GatewayError::Reverted("no voting power".into()));
                }
                state.block_number += 1;
                let block_number = state.block_number;
                state.votes.push(VoteRecord {
                    voter: from,
                    proposal_id: *proposal_id,
                    support: *support,
                    weight,
                    block_number,
                    log_index: 0,
                });
            }
            ContractWrite::Propose { targets, values, calldatas, description } => {
                if targets.len() != values.len() || targets.len() != calldatas.len() {
                    return Err(GatewayError::Reverted("invalid proposal length".into()));
                }
                let frozen = state.ledger.clone();
                state.snapshots.push(frozen);
                let snapshot_id = state.snapshots.len() as u64;
                let id = state.proposals.iter().map(|p| p.id).max().unwrap_or(0) + 1;
                state.proposals.push(ProposalFixture {
                    id,
                    proposer: from,
                    state: ProposalState::Active,
                    snapshot_id,
                    description: description.clone(),
                });
            }
        }
        state.block_number += 1;
        drop(state);

        let mut nonce = self.next_tx.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *nonce += 1;
        let hash = TxHash(format!("0x{:064x}", *nonce));
        debug!("{} from {} mined as {}", write.method(), from.short(), hash);
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 20])
    }

    #[test]
    fn test_effective_power_follows_full_chain() {
        let mut ledger = Ledger::default();
        for n in 1..=4 {
            ledger.balances.insert(addr(n), TokenAmount::from(10u64 * n as u64));
        }
        // 1 -> 2 -> 3, 4 undelegated
        ledger.delegates.insert(addr(1), addr(2));
        ledger.delegates.insert(addr(2), addr(3));

        assert_eq!(ledger.effective_power(&addr(3)), TokenAmount::from(60u64));
        assert_eq!(ledger.effective_power(&addr(2)), TokenAmount::zero());
        assert_eq!(ledger.effective_power(&addr(4)), TokenAmount::from(40u64));
        assert_eq!(ledger.delegators_of(&addr(3)), vec![addr(2)]);
        assert_eq!(ledger.delegated_to(&addr(2)), TokenAmount::from(10u64));
    }

    #[test]
    fn test_terminal_of_cycle_is_none() {
        let mut ledger = Ledger::default();
        ledger.delegates.insert(addr(1), addr(2));
        ledger.delegates.insert(addr(2), addr(1));
        assert_eq!(ledger.terminal_of(&addr(1)), None);
        assert_eq!(ledger.terminal_of(&addr(3)), Some(addr(3)));
    }

    #[test]
    fn test_fixture_json_defaults() {
        let fixture: Fixture = serde_json::from_str(r#"{ "block_number": 99 }"#).unwrap();
        assert_eq!(fixture.chain_id, 1);
        assert_eq!(fixture.block_number, 99);
        assert!(fixture.supports_vote_totals);
    }

    #[tokio::test]
    async fn test_injected_failure_and_readiness() {
        let gateway = MemoryGateway::new(1);
        gateway.fail_method("getCurrentSnapshotId");
        let err = gateway.call(&ContractCall::CurrentSnapshotId).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rpc(_)));
        assert_eq!(gateway.call_count("getCurrentSnapshotId"), 1);

        gateway.set_ready(false);
        assert!(!gateway.is_ready());
        let err = gateway.block_number().await.unwrap_err();
        assert_eq!(err, GatewayError::NotInitialized);
    }

    #[tokio::test]
    async fn test_delegation_closing_a_loop_reverts() {
        let gateway = MemoryGateway::new(1);
        // 1 -> 2 -> 3, so 3 -> 1 would close a loop
        gateway.set_delegate(addr(1), addr(2));
        gateway.set_delegate(addr(2), addr(3));

        let err = gateway.send(addr(3), &ContractWrite::Delegate { to: addr(1) }).await.unwrap_err();
        assert!(matches!(err, GatewayError::Reverted(_)));
        assert_eq!(gateway.snapshot().ledger.delegate_of(&addr(3)), None);

        gateway.send(addr(3), &ContractWrite::Delegate { to: addr(4) }).await.unwrap();
        assert_eq!(gateway.snapshot().ledger.terminal_of(&addr(1)), Some(addr(4)));
    }

    #[tokio::test]
    async fn test_vote_requires_power_at_snapshot() {
        let gateway = MemoryGateway::new(1);
        gateway.set_balance(addr(1), TokenAmount::from(5u64));
        let snapshot = gateway.take_snapshot();
        gateway.add_proposal(1, addr(1), ProposalState::Active, snapshot);

        let write = ContractWrite::CastVote { proposal_id: 1, support: VoteSupport::For, reason: None };
        assert!(gateway.send(addr(1), &write).await.is_ok());
        let err = gateway.send(addr(2), &write).await.unwrap_err();
        assert!(matches!(err, GatewayError::Reverted(_)));
    }
}
