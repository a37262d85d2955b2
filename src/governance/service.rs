use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use futures::join;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::timeout;

use super::cancel::{until_cancelled, CancelToken};
use super::delegation::{DelegationChain, DelegationResolver};
use super::metrics::QueryMetrics;
use super::outcome::ProposalOutcome;
use super::overview::{DelegationOverview, HolderEstimate, OverviewReader};
use super::strategy::Resolved;
use super::tally::TallyReader;
use super::voting_power::{PowerCrossCheck, VotingPower, VotingPowerAggregator};
use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, Result};
use crate::gateway::{ContractGateway, TypedGateway};
use crate::types::{Address, GovernanceParams, ProposalId, VoteTotals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Ready,
    NotInitialized,
    WrongNetwork { expected: u64, actual: u64 },
}

/// Entry point for every governance query and write.
///
/// Owns the gateway, the configuration, a session cancellation token and the
/// query metrics. Queries never fail: when the gateway is not connected, the
/// deadline passes or every strategy fails, they answer with an explicitly
/// degraded value. Writes return typed errors instead (see `actions`).
pub struct GovernanceService<G> {
    gateway: G,
    config: GovernanceConfig,
    cancel: CancelToken,
    metrics: Mutex<QueryMetrics>,
}

impl<G: ContractGateway> GovernanceService<G> {
    pub fn new(gateway: G, config: GovernanceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gateway,
            config,
            cancel: CancelToken::new(),
            metrics: Mutex::new(QueryMetrics::new()),
        })
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Token shared with in-flight queries; cancelling it ends the session.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        info!("Cancelling outstanding governance queries");
        self.cancel.cancel();
    }

    pub fn metrics(&self) -> QueryMetrics {
        self.lock_metrics().clone()
    }

    fn lock_metrics(&self) -> MutexGuard<'_, QueryMetrics> {
        self.metrics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn connection_state(&self) -> ConnectionState {
        if !self.gateway.is_ready() {
            return ConnectionState::NotInitialized;
        }
        let actual = self.gateway.chain_id();
        if actual != self.config.chain_id {
            return ConnectionState::WrongNetwork { expected: self.config.chain_id, actual };
        }
        ConnectionState::Ready
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        match self.connection_state() {
            ConnectionState::Ready => Ok(()),
            ConnectionState::NotInitialized => Err(GovernanceError::NotConnected),
            ConnectionState::WrongNetwork { expected, actual } => {
                Err(GovernanceError::WrongNetwork { expected, actual })
            }
        }
    }

    /// Like [`Self::ensure_connected`], logging instead of failing.
    fn connected_for(&self, label: &str) -> bool {
        match self.ensure_connected() {
            Ok(()) => true,
            Err(e) => {
                debug!("Skipping {}: {}", label, e);
                false
            }
        }
    }

    pub(crate) fn typed(&self) -> TypedGateway<'_, G> {
        TypedGateway::new(&self.gateway, &self.config)
    }

    /// Runs `query` under the overall deadline and the session token.
    /// `None` means the caller should answer with its degraded default.
    async fn within_deadline<F: Future>(&self, label: &'static str, query: F) -> Option<F::Output> {
        let started = Instant::now();
        let deadline = self.config.query_deadline();
        match timeout(deadline, until_cancelled(Some(&self.cancel), query)).await {
            Ok(Some(output)) => Some(output),
            Ok(None) => {
                debug!("{} cancelled", label);
                self.lock_metrics().record_degraded(label, started.elapsed());
                None
            }
            Err(_) => {
                warn!("{} did not finish within {:?}, answering with partial data", label, deadline);
                self.lock_metrics().record_degraded(label, started.elapsed());
                None
            }
        }
    }

    fn record<T>(&self, label: &'static str, resolved: &Resolved<T>) {
        self.lock_metrics()
            .record_resolved(label, resolved.strategy, resolved.failures.len(), resolved.elapsed);
    }

    fn record_degraded(&self, label: &'static str, started: Instant) {
        self.lock_metrics().record_degraded(label, started.elapsed());
    }

    pub async fn resolve_chain(&self, start: Address) -> DelegationChain {
        if !self.connected_for("delegation chain") {
            return DelegationChain::unresolved(start, "gateway not connected");
        }
        let started = Instant::now();
        let typed = self.typed();
        let resolver = DelegationResolver::new(&typed);
        match self
            .within_deadline("delegation_chain", resolver.resolve_chain(start, self.config.max_delegation_depth))
            .await
        {
            Some(chain) => {
                let label = if chain.is_authoritative() { "walk" } else { "partial" };
                self.lock_metrics().record_resolved("delegation_chain", label, 0, started.elapsed());
                chain
            }
            None => DelegationChain::unresolved(start, "query deadline exceeded"),
        }
    }

    /// Voting power at `snapshot_id`, or at the current snapshot when `None`.
    pub async fn compute_voting_power(&self, address: Address, snapshot_id: Option<u64>) -> VotingPower {
        if !self.connected_for("voting power") {
            return VotingPower::unavailable(snapshot_id);
        }
        let started = Instant::now();
        let typed = self.typed();

        let snapshot_id = match snapshot_id {
            Some(id) => id,
            None => match typed.current_snapshot_id().await {
                Ok(id) => id,
                Err(e) => {
                    warn!("Current snapshot id unavailable: {}", e);
                    self.record_degraded("voting_power", started);
                    return VotingPower::unavailable(None);
                }
            },
        };

        let aggregator = VotingPowerAggregator::new(&typed, self.config.fallback_transitive_levels)
            .with_cancel(&self.cancel);
        match self.within_deadline("voting_power", aggregator.resolve(address, snapshot_id)).await {
            Some(Ok(resolved)) => {
                self.record("voting_power", &resolved);
                resolved.value
            }
            Some(Err(e)) => {
                warn!("Voting power of {} unavailable: {}", address.short(), e);
                self.record_degraded("voting_power", started);
                VotingPower::unavailable(Some(snapshot_id))
            }
            None => VotingPower::unavailable(Some(snapshot_id)),
        }
    }

    pub async fn cross_check_voting_power(&self, address: Address, snapshot_id: u64) -> Option<PowerCrossCheck> {
        if !self.connected_for("voting power cross-check") {
            return None;
        }
        let typed = self.typed();
        let aggregator = VotingPowerAggregator::new(&typed, self.config.fallback_transitive_levels);
        self.within_deadline("voting_power_cross_check", aggregator.cross_check(address, snapshot_id))
            .await
    }

    pub async fn get_vote_totals(&self, proposal_id: ProposalId, current_user: Option<Address>) -> VoteTotals {
        if !self.connected_for("vote totals") {
            return VoteTotals::no_data();
        }
        let started = Instant::now();
        let typed = self.typed();
        let reader = TallyReader::new(&typed, self.config.vote_log_lookback_blocks).with_cancel(&self.cancel);
        match self
            .within_deadline("vote_totals", reader.resolve_vote_totals(proposal_id, current_user))
            .await
        {
            Some(Ok(resolved)) => {
                self.record("vote_totals", &resolved);
                resolved.value
            }
            Some(Err(e)) => {
                warn!("Vote totals for proposal {} unavailable: {}", proposal_id, e);
                self.record_degraded("vote_totals", started);
                VoteTotals::no_data()
            }
            None => VoteTotals::no_data(),
        }
    }

    /// Governance parameters, or `None` when they cannot be read.
    pub async fn governance_params(&self) -> Option<GovernanceParams> {
        if !self.connected_for("governance params") {
            return None;
        }
        let typed = self.typed();
        match self.within_deadline("governance_params", typed.governance_params()).await? {
            Ok(params) => Some(params),
            Err(e) => {
                warn!("Governance parameters unavailable: {}", e);
                None
            }
        }
    }

    pub async fn proposal_outcome(&self, proposal_id: ProposalId, current_user: Option<Address>) -> ProposalOutcome {
        if !self.connected_for("proposal outcome") {
            return ProposalOutcome::evaluate(proposal_id, None, VoteTotals::no_data(), None);
        }
        let typed = self.typed();
        let (state, params, totals) = join!(
            self.within_deadline("proposal_state", typed.proposal_state(proposal_id)),
            self.governance_params(),
            self.get_vote_totals(proposal_id, current_user)
        );
        let state = match state {
            Some(Ok(state)) => Some(state),
            Some(Err(e)) => {
                warn!("State of proposal {} unavailable: {}", proposal_id, e);
                None
            }
            None => None,
        };

        let outcome = ProposalOutcome::evaluate(proposal_id, state, totals, params.map(|p| p.quorum));
        debug!(
            "Proposal {}: for {} / against {} / abstain {}, quorum reached: {}",
            proposal_id,
            outcome.breakdown.for_pct,
            outcome.breakdown.against_pct,
            outcome.breakdown.abstain_pct,
            outcome.quorum_reached
        );
        outcome
    }

    pub async fn delegation_overview(&self, account: Address) -> DelegationOverview {
        if !self.connected_for("delegation overview") {
            return DelegationOverview::empty(account, "gateway not connected");
        }
        let typed = self.typed();
        let reader = OverviewReader::new(
            &typed,
            self.config.max_delegation_depth,
            self.config.fallback_transitive_levels,
        );
        self.within_deadline("delegation_overview", reader.delegation_overview(account))
            .await
            .unwrap_or_else(|| DelegationOverview::empty(account, "query deadline exceeded"))
    }

    pub async fn estimate_holder_count(&self) -> HolderEstimate {
        if !self.connected_for("holder count") {
            return HolderEstimate::unavailable();
        }
        let typed = self.typed();
        let reader = OverviewReader::new(
            &typed,
            self.config.max_delegation_depth,
            self.config.fallback_transitive_levels,
        );
        match self
            .within_deadline("holder_count", reader.estimate_holder_count(self.config.holder_log_lookback_blocks))
            .await
        {
            Some(Ok(estimate)) => estimate,
            Some(Err(e)) => {
                warn!("Holder count unavailable: {}", e);
                HolderEstimate::unavailable()
            }
            None => HolderEstimate::unavailable(),
        }
    }
}
