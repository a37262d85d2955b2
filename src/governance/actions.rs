//! Transactions submitted on behalf of the connected account.
//!
//! Unlike queries, writes report every failure to the caller: the user has
//! to know why a delegation or vote was not submitted.

use log::info;
use serde::{Deserialize, Serialize};

use super::delegation::DelegationResolver;
use super::service::GovernanceService;
use super::voting_power::VotingPowerAggregator;
use crate::error::{GovernanceError, Result};
use crate::gateway::{ContractGateway, ContractWrite, TxHash};
use crate::types::{Address, ProposalId, TokenAmount, VoteSupport};

/// Executable actions plus the human-readable description of a proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub targets: Vec<Address>,
    pub values: Vec<TokenAmount>,
    /// Hex-encoded call data per action.
    #[serde(with = "hex_list")]
    pub calldatas: Vec<Vec<u8>>,
    pub description: String,
}

impl ProposalDraft {
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(GovernanceError::InvalidProposal("no actions".into()));
        }
        if self.values.len() != self.targets.len() || self.calldatas.len() != self.targets.len() {
            return Err(GovernanceError::InvalidProposal(format!(
                "{} targets, {} values, {} calldatas",
                self.targets.len(),
                self.values.len(),
                self.calldatas.len()
            )));
        }
        if self.targets.iter().any(Address::is_zero) {
            return Err(GovernanceError::InvalidProposal("action targets the null address".into()));
        }
        if self.description.trim().is_empty() {
            return Err(GovernanceError::InvalidProposal("empty description".into()));
        }
        Ok(())
    }
}

mod hex_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(data.iter().map(|bytes| format!("0x{}", hex::encode(bytes))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|text| hex::decode(text.trim_start_matches("0x")).map_err(serde::de::Error::custom))
            .collect()
    }
}

impl<G: ContractGateway> GovernanceService<G> {
    /// Delegates `from`'s voting weight to `to`. Delegating to oneself
    /// clears any existing delegation.
    pub async fn delegate(&self, from: Address, to: Address) -> Result<TxHash> {
        self.ensure_connected()?;
        if to.is_zero() {
            return Err(GovernanceError::InvalidAddress("cannot delegate to the null address".into()));
        }
        if to == from {
            return self.reset_delegation(from).await;
        }

        let typed = self.typed();
        if typed.balance_of(from, None).await?.is_zero() {
            return Err(GovernanceError::InsufficientBalance(from));
        }
        let chain = DelegationResolver::new(&typed)
            .check_new_delegation(from, to, self.config().max_delegation_depth)
            .await?;

        let hash = typed.send(from, &ContractWrite::Delegate { to }).await?;
        info!("{} delegated to {} ({}) in {}", from.short(), to.short(), chain.render(), hash);
        Ok(hash)
    }

    pub async fn reset_delegation(&self, from: Address) -> Result<TxHash> {
        self.ensure_connected()?;
        let hash = self.typed().send(from, &ContractWrite::ResetDelegation).await?;
        info!("{} reset its delegation in {}", from.short(), hash);
        Ok(hash)
    }

    pub async fn cast_vote(
        &self,
        voter: Address,
        proposal_id: ProposalId,
        support: VoteSupport,
        reason: Option<String>,
    ) -> Result<TxHash> {
        self.ensure_connected()?;
        let typed = self.typed();

        let state = typed.proposal_state(proposal_id).await?;
        if !state.is_open_for_voting() {
            return Err(GovernanceError::ProposalNotActive { proposal_id, state });
        }

        let snapshot_id = typed.proposal_snapshot(proposal_id).await?;
        let power = VotingPowerAggregator::new(&typed, self.config().fallback_transitive_levels)
            .with_cancel(&self.cancel_token())
            .resolve(voter, snapshot_id)
            .await?
            .value;
        if power.amount.is_zero() {
            return Err(GovernanceError::NoVotingPower { voter, proposal_id });
        }

        let reason = reason.filter(|r| !r.trim().is_empty());
        let write = ContractWrite::CastVote { proposal_id, support, reason };
        let hash = typed.send(voter, &write).await?;
        info!(
            "{} voted {:?} on proposal {} with {} in {}",
            voter.short(),
            support,
            proposal_id,
            power.amount.format_units(self.config().token_decimals),
            hash
        );
        Ok(hash)
    }

    pub async fn propose(&self, proposer: Address, draft: ProposalDraft) -> Result<TxHash> {
        self.ensure_connected()?;
        draft.validate()?;
        let typed = self.typed();

        let params = typed.governance_params().await?;
        if !params.proposal_threshold.is_zero() {
            let snapshot_id = typed.current_snapshot_id().await?;
            // Without any snapshot nobody holds recorded voting power yet.
            let power = if snapshot_id == 0 {
                TokenAmount::zero()
            } else {
                VotingPowerAggregator::new(&typed, self.config().fallback_transitive_levels)
                    .resolve(proposer, snapshot_id)
                    .await?
                    .value
                    .amount
            };
            if power < params.proposal_threshold {
                return Err(GovernanceError::BelowProposalThreshold { power, threshold: params.proposal_threshold });
            }
        }

        let write = ContractWrite::Propose {
            targets: draft.targets,
            values: draft.values,
            calldatas: draft.calldatas,
            description: draft.description,
        };
        let hash = typed.send(proposer, &write).await?;
        info!("{} submitted a proposal in {}", proposer.short(), hash);
        Ok(hash)
    }
}
