use serde::{Deserialize, Serialize};

use super::{Address, TokenAmount};

pub type ProposalId = u64;

/// Vote direction, encoded on chain as `0 = against, 1 = for, 2 = abstain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteSupport {
    Against,
    For,
    Abstain,
}

impl VoteSupport {
    pub fn as_u8(self) -> u8 {
        match self {
            VoteSupport::Against => 0,
            VoteSupport::For => 1,
            VoteSupport::Abstain => 2,
        }
    }
}

impl TryFrom<u8> for VoteSupport {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VoteSupport::Against),
            1 => Ok(VoteSupport::For),
            2 => Ok(VoteSupport::Abstain),
            other => Err(format!("unknown vote support {}", other)),
        }
    }
}

impl std::str::FromStr for VoteSupport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "for" | "yes" | "1" => Ok(VoteSupport::For),
            "against" | "no" | "0" => Ok(VoteSupport::Against),
            "abstain" | "2" => Ok(VoteSupport::Abstain),
            _ => Err(format!("Invalid vote type: {}", s)),
        }
    }
}

/// Governor lifecycle state, numeric values `0..=7` in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    Pending,
    Active,
    Canceled,
    Defeated,
    Succeeded,
    Queued,
    Expired,
    Executed,
}

impl ProposalState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_open_for_voting(self) -> bool {
        self == ProposalState::Active
    }
}

impl TryFrom<u8> for ProposalState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ProposalState::Pending,
            1 => ProposalState::Active,
            2 => ProposalState::Canceled,
            3 => ProposalState::Defeated,
            4 => ProposalState::Succeeded,
            5 => ProposalState::Queued,
            6 => ProposalState::Expired,
            7 => ProposalState::Executed,
            other => return Err(format!("unknown proposal state {}", other)),
        })
    }
}

/// One emitted vote-cast event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: Address,
    pub proposal_id: ProposalId,
    pub support: VoteSupport,
    pub weight: TokenAmount,
    pub block_number: u64,
    pub log_index: u64,
}

impl VoteRecord {
    /// Position of the event in chain order.
    pub fn ordering_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Where a set of vote totals came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TallySource {
    /// Pre-summed totals returned by the governor itself.
    Aggregate,
    /// Rebuilt from vote-cast events, latest vote per voter.
    EventReplay,
    /// Only the connected user's own vote is known.
    UserVoteOnly,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTotals {
    pub for_votes: TokenAmount,
    pub against_votes: TokenAmount,
    pub abstain_votes: TokenAmount,
    pub total_voters: u64,
    pub source: TallySource,
}

impl VoteTotals {
    pub fn no_data() -> Self {
        Self {
            for_votes: TokenAmount::zero(),
            against_votes: TokenAmount::zero(),
            abstain_votes: TokenAmount::zero(),
            total_voters: 0,
            source: TallySource::NoData,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        matches!(self.source, TallySource::Aggregate | TallySource::EventReplay)
    }

    pub fn total_votes(&self) -> TokenAmount {
        self.for_votes
            .saturating_add(self.against_votes)
            .saturating_add(self.abstain_votes)
    }

    pub fn add_vote(&mut self, support: VoteSupport, weight: TokenAmount) {
        let bucket = match support {
            VoteSupport::For => &mut self.for_votes,
            VoteSupport::Against => &mut self.against_votes,
            VoteSupport::Abstain => &mut self.abstain_votes,
        };
        *bucket = bucket.saturating_add(weight);
    }
}

/// Per-voter receipt kept by the governor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub has_voted: bool,
    pub support: Option<VoteSupport>,
    pub weight: TokenAmount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceParams {
    pub quorum: TokenAmount,
    pub proposal_threshold: TokenAmount,
    /// Blocks between proposal creation and the start of voting.
    pub voting_delay: u64,
    /// Blocks during which votes are accepted.
    pub voting_period: u64,
    /// Seconds a queued proposal waits in the timelock.
    pub timelock_delay: u64,
}

/// Token transfer event, used for holder estimation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from: Address,
    pub to: Address,
    pub amount: TokenAmount,
    pub block_number: u64,
    pub log_index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_support_wire_values() {
        for support in [VoteSupport::Against, VoteSupport::For, VoteSupport::Abstain] {
            assert_eq!(VoteSupport::try_from(support.as_u8()).unwrap(), support);
        }
        assert!(VoteSupport::try_from(3).is_err());
        assert_eq!("YES".parse::<VoteSupport>().unwrap(), VoteSupport::For);
    }

    #[test]
    fn test_proposal_state_from_numeric() {
        assert_eq!(ProposalState::try_from(1).unwrap(), ProposalState::Active);
        assert_eq!(ProposalState::try_from(7).unwrap(), ProposalState::Executed);
        assert_eq!(ProposalState::Queued.as_u8(), 5);
        assert!(ProposalState::try_from(8).is_err());
        assert!(ProposalState::Active.is_open_for_voting());
        assert!(!ProposalState::Queued.is_open_for_voting());
    }

    #[test]
    fn test_totals_accumulate() {
        let mut totals = VoteTotals::no_data();
        totals.add_vote(VoteSupport::For, 5u64.into());
        totals.add_vote(VoteSupport::Abstain, 2u64.into());
        assert_eq!(totals.total_votes(), TokenAmount::from(7u64));
        assert!(!totals.is_authoritative());
    }
}
