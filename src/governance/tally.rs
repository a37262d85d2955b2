use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info, warn};

use super::cancel::CancelToken;
use super::strategy::{FallbackChain, Resolved, StrategyError, StrategyResult};
use crate::error::Result;
use crate::gateway::{ContractGateway, LogFilter, TypedGateway};
use crate::types::{Address, ProposalId, TallySource, VoteRecord, VoteTotals};

/// Rebuilds totals from vote-cast events.
///
/// Records are applied in chain order and a voter's later vote replaces the
/// earlier one, so only the final choice of each voter is counted.
pub fn replay_votes(records: &[VoteRecord]) -> VoteTotals {
    let mut ordered: Vec<&VoteRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.ordering_key());

    let mut latest: BTreeMap<Address, &VoteRecord> = BTreeMap::new();
    for record in ordered {
        latest.insert(record.voter, record);
    }

    let mut totals = VoteTotals { source: TallySource::EventReplay, ..VoteTotals::no_data() };
    for record in latest.values() {
        totals.add_vote(record.support, record.weight);
    }
    totals.total_voters = latest.len() as u64;
    totals
}

/// Inclusive block range scanned by event replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayWindow {
    pub from_block: u64,
    pub to_block: u64,
}

impl ReplayWindow {
    pub fn ending_at(to_block: u64, lookback_blocks: u64) -> Self {
        Self { from_block: to_block.saturating_sub(lookback_blocks), to_block }
    }

    /// True when the window starts after genesis, so older votes are not seen.
    pub fn is_truncated(&self) -> bool {
        self.from_block > 0
    }
}

/// Reads proposal vote totals, falling back from the governor's own
/// aggregate to event replay and finally to the caller's own receipt.
pub struct TallyReader<'a, 'g, G: ?Sized> {
    gateway: &'a TypedGateway<'g, G>,
    lookback_blocks: u64,
    cancel: Option<&'a CancelToken>,
}

impl<'a, 'g, G: ContractGateway + ?Sized> TallyReader<'a, 'g, G> {
    pub fn new(gateway: &'a TypedGateway<'g, G>, lookback_blocks: u64) -> Self {
        Self { gateway, lookback_blocks, cancel: None }
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn resolve_vote_totals(
        &self,
        proposal_id: ProposalId,
        current_user: Option<Address>,
    ) -> Result<Resolved<VoteTotals>> {
        FallbackChain::new("vote_totals")
            .then("aggregate", || self.aggregate(proposal_id))
            .then_within("event_replay", self.replay_budget(), || self.event_replay(proposal_id))
            .then("user_vote", || self.user_vote(proposal_id, current_user))
            .then("no_data", || async { Ok(VoteTotals::no_data()) })
            .run(self.cancel)
            .await
    }

    /// Always answers; the `source` field says how much to trust the numbers.
    pub async fn get_vote_totals(&self, proposal_id: ProposalId, current_user: Option<Address>) -> VoteTotals {
        match self.resolve_vote_totals(proposal_id, current_user).await {
            Ok(resolved) => {
                if !resolved.value.is_authoritative() {
                    info!("Proposal {} totals are partial ({:?})", proposal_id, resolved.value.source);
                }
                resolved.value
            }
            Err(e) => {
                debug!("Proposal {} totals unavailable: {}", proposal_id, e);
                VoteTotals::no_data()
            }
        }
    }

    async fn aggregate(&self, proposal_id: ProposalId) -> StrategyResult<VoteTotals> {
        Ok(self.gateway.proposal_vote_totals(proposal_id).await?)
    }

    /// The head lookup and the log query together share one log timeout.
    fn replay_budget(&self) -> Duration {
        self.gateway.log_timeout()
    }

    async fn event_replay(&self, proposal_id: ProposalId) -> StrategyResult<VoteTotals> {
        let window = ReplayWindow::ending_at(self.gateway.block_number().await?, self.lookback_blocks);
        let records: Vec<VoteRecord> = self
            .gateway
            .vote_cast_events(&LogFilter::votes(proposal_id, window.from_block, window.to_block))
            .await?
            .into_iter()
            .filter(|record| record.proposal_id == proposal_id)
            .collect();
        if records.is_empty() {
            return Err(StrategyError::NotApplicable(format!(
                "no vote events in blocks {}..={}",
                window.from_block, window.to_block
            )));
        }
        if window.is_truncated() {
            warn!(
                "Proposal {} replay starts at block {}; votes cast before it are not counted",
                proposal_id, window.from_block
            );
        }
        debug!("Replaying {} vote events for proposal {}", records.len(), proposal_id);
        Ok(replay_votes(&records))
    }

    async fn user_vote(&self, proposal_id: ProposalId, current_user: Option<Address>) -> StrategyResult<VoteTotals> {
        let user = current_user.ok_or_else(|| StrategyError::NotApplicable("no current user".into()))?;
        let receipt = self.gateway.vote_receipt(proposal_id, user).await?;
        let support = match receipt.support {
            Some(support) if receipt.has_voted => support,
            _ => return Err(StrategyError::NotApplicable(format!("{} has not voted", user.short()))),
        };

        let mut totals = VoteTotals { source: TallySource::UserVoteOnly, ..VoteTotals::no_data() };
        totals.add_vote(support, receipt.weight);
        totals.total_voters = 1;
        Ok(totals)
    }
}
