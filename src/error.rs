use thiserror::Error;

use crate::types::{Address, ProposalState, TokenAmount};

/// Failures reported by a single contract gateway round trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("{method} timed out after {millis} ms")]
    Timeout { method: &'static str, millis: u64 },
    #[error("Failed to decode {method} response: {reason}")]
    Decode { method: &'static str, reason: String },
    #[error("Contract gateway is not initialized")]
    NotInitialized,
    #[error("Transaction reverted: {0}")]
    Reverted(String),
    #[error("Method not supported by deployed contract: {0}")]
    Unsupported(&'static str),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Contract gateway is not connected")]
    NotConnected,
    #[error("Wrong network: expected chain {expected}, connected to {actual}")]
    WrongNetwork { expected: u64, actual: u64 },
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Delegating {from} to {to} would create a delegation cycle")]
    DelegationCycle { from: Address, to: Address },
    #[error("Delegation chain of depth {depth} exceeds the maximum of {max}")]
    DelegationTooDeep { depth: usize, max: usize },
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(Address),
    #[error("{voter} has no voting power for proposal {proposal_id}")]
    NoVotingPower { voter: Address, proposal_id: u64 },
    #[error("Proposal {proposal_id} is not open for voting ({state:?})")]
    ProposalNotActive { proposal_id: u64, state: ProposalState },
    #[error("Voting power {power} is below the proposal threshold {threshold}")]
    BelowProposalThreshold { power: TokenAmount, threshold: TokenAmount },
    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),
    #[error("All strategies for {label} failed: {}", .failures.join("; "))]
    Exhausted { label: &'static str, failures: Vec<String> },
    #[error("Query cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
