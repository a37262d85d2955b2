//! Boundary to the deployed token, governor and timelock contracts.
//!
//! A [`ContractGateway`] speaks in raw, loosely-shaped JSON values the way a
//! wallet provider returns them. [`adapter::TypedGateway`] is the only place
//! those values are decoded into the typed schema in [`crate::types`].

pub mod adapter;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayResult;
use crate::types::{Address, ProposalId, TokenAmount, VoteSupport};

pub use adapter::TypedGateway;
pub use memory::{Fixture, Ledger, MemoryGateway, ResponseShape};

/// Which deployed contract a call is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    Token,
    Governor,
    Timelock,
}

/// Read calls understood by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// Current balance, or the balance at a snapshot when one is given.
    BalanceOf { account: Address, snapshot_id: Option<u64> },
    Delegates { account: Address },
    DelegatorsOf { account: Address },
    DelegatedTo { account: Address },
    CurrentSnapshotId,
    EffectiveVotingPower { account: Address, snapshot_id: u64 },
    ProposalState { proposal_id: ProposalId },
    ProposalSnapshot { proposal_id: ProposalId },
    ProposalVoteTotals { proposal_id: ProposalId },
    VoteReceipt { proposal_id: ProposalId, voter: Address },
    GovernanceParams,
    TimelockDelay,
}

impl ContractCall {
    pub fn target(&self) -> ContractKind {
        match self {
            ContractCall::BalanceOf { .. }
            | ContractCall::Delegates { .. }
            | ContractCall::DelegatorsOf { .. }
            | ContractCall::DelegatedTo { .. }
            | ContractCall::CurrentSnapshotId
            | ContractCall::EffectiveVotingPower { .. } => ContractKind::Token,
            ContractCall::TimelockDelay => ContractKind::Timelock,
            _ => ContractKind::Governor,
        }
    }

    /// Contract method name, used for logging and failure injection.
    pub fn method(&self) -> &'static str {
        match self {
            ContractCall::BalanceOf { snapshot_id: None, .. } => "balanceOf",
            ContractCall::BalanceOf { snapshot_id: Some(_), .. } => "balanceOfAt",
            ContractCall::Delegates { .. } => "getDelegate",
            ContractCall::DelegatorsOf { .. } => "getDelegatorsOf",
            ContractCall::DelegatedTo { .. } => "getDelegatedToAddress",
            ContractCall::CurrentSnapshotId => "getCurrentSnapshotId",
            ContractCall::EffectiveVotingPower { .. } => "getEffectiveVotingPower",
            ContractCall::ProposalState { .. } => "state",
            ContractCall::ProposalSnapshot { .. } => "proposalSnapshot",
            ContractCall::ProposalVoteTotals { .. } => "getProposalVoteTotals",
            ContractCall::VoteReceipt { .. } => "getReceipt",
            ContractCall::GovernanceParams => "getGovernanceParams",
            ContractCall::TimelockDelay => "getMinDelay",
        }
    }
}

/// State-changing transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractWrite {
    Delegate { to: Address },
    ResetDelegation,
    CastVote { proposal_id: ProposalId, support: VoteSupport, reason: Option<String> },
    Propose {
        targets: Vec<Address>,
        values: Vec<TokenAmount>,
        calldatas: Vec<Vec<u8>>,
        description: String,
    },
}

impl ContractWrite {
    pub fn method(&self) -> &'static str {
        match self {
            ContractWrite::Delegate { .. } => "delegate",
            ContractWrite::ResetDelegation => "resetDelegation",
            ContractWrite::CastVote { reason: None, .. } => "castVote",
            ContractWrite::CastVote { reason: Some(_), .. } => "castVoteWithReason",
            ContractWrite::Propose { .. } => "propose",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    VoteCast,
    Transfer,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::VoteCast => "VoteCast",
            EventKind::Transfer => "Transfer",
        }
    }
}

/// Event log query. Both block bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub event: EventKind,
    pub proposal_id: Option<ProposalId>,
    pub voter: Option<Address>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    pub fn votes(proposal_id: ProposalId, from_block: u64, to_block: u64) -> Self {
        Self {
            event: EventKind::VoteCast,
            proposal_id: Some(proposal_id),
            voter: None,
            from_block,
            to_block,
        }
    }

    pub fn transfers(from_block: u64, to_block: u64) -> Self {
        Self {
            event: EventKind::Transfer,
            proposal_id: None,
            voter: None,
            from_block,
            to_block,
        }
    }
}

/// Undecoded event log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub block_number: u64,
    pub log_index: u64,
    pub fields: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read/write access to the governance contracts of one network.
///
/// The query model is single-threaded and cooperative, so implementations do
/// not need to hand out `Send` futures.
#[async_trait(?Send)]
pub trait ContractGateway {
    /// False while no provider is attached.
    fn is_ready(&self) -> bool;

    fn chain_id(&self) -> u64;

    async fn block_number(&self) -> GatewayResult<u64>;

    async fn call(&self, call: &ContractCall) -> GatewayResult<Value>;

    async fn logs(&self, filter: &LogFilter) -> GatewayResult<Vec<RawLog>>;

    async fn send(&self, from: Address, write: &ContractWrite) -> GatewayResult<TxHash>;
}
