//! Governance queries and writes over a [`ContractGateway`](crate::gateway::ContractGateway).
//!
//! Each query is a chain of strategies ordered from most to least
//! authoritative (see [`strategy`]). [`GovernanceService`] wires them to an
//! injected gateway, applies the session deadline and records metrics.

pub mod actions;
pub mod cancel;
pub mod delegation;
pub mod metrics;
pub mod outcome;
pub mod overview;
pub mod service;
pub mod strategy;
pub mod tally;
pub mod voting_power;

#[cfg(test)]
mod tests;

pub use actions::ProposalDraft;
pub use cancel::CancelToken;
pub use delegation::{ChainTermination, DelegationChain, DelegationResolver};
pub use metrics::{QueryMetrics, QueryStats};
pub use outcome::{quorum_reached, Percentage, ProposalOutcome, VoteBreakdown};
pub use overview::{DelegationOverview, HolderEstimate};
pub use service::{ConnectionState, GovernanceService};
pub use strategy::{FallbackChain, Resolved, StrategyError};
pub use tally::{replay_votes, TallyReader};
pub use voting_power::{PowerCrossCheck, PowerSource, VotingPower, VotingPowerAggregator};
