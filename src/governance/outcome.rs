use std::fmt;

use primitive_types::U256;
use serde::{Serialize, Serializer};

use crate::types::{ProposalId, ProposalState, TokenAmount, VoteTotals};

const BASIS_POINTS: u64 = 10_000;

/// Share of a total with two decimal places of precision, stored in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Percentage(u32);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0);

    pub fn from_basis_points(bps: u32) -> Self {
        Self(bps)
    }

    /// `part / whole`, rounded down. Zero when `whole` is zero.
    pub fn from_ratio(part: TokenAmount, whole: TokenAmount) -> Self {
        if whole.is_zero() {
            return Self::ZERO;
        }
        let part = part.raw().min(whole.raw());
        let whole = whole.raw();
        let scale = U256::from(BASIS_POINTS);
        let bps = match part.checked_mul(scale) {
            Some(scaled) => scaled / whole,
            // Only reachable near U256::MAX; dividing first loses sub-unit precision there.
            None => part / (whole / scale).max(U256::one()),
        };
        Self(bps.min(scale).low_u32())
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Percentage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteBreakdown {
    pub for_pct: Percentage,
    pub against_pct: Percentage,
    pub abstain_pct: Percentage,
}

impl VoteBreakdown {
    pub fn from_totals(totals: &VoteTotals) -> Self {
        let total = totals.total_votes();
        Self {
            for_pct: Percentage::from_ratio(totals.for_votes, total),
            against_pct: Percentage::from_ratio(totals.against_votes, total),
            abstain_pct: Percentage::from_ratio(totals.abstain_votes, total),
        }
    }
}

/// All three support types count towards quorum. Reaching it exactly passes.
pub fn quorum_reached(totals: &VoteTotals, quorum: TokenAmount) -> bool {
    totals.total_votes() >= quorum
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalOutcome {
    pub proposal_id: ProposalId,
    /// `None` when the state could not be read.
    pub state: Option<ProposalState>,
    pub totals: VoteTotals,
    pub breakdown: VoteBreakdown,
    /// `None` when governance parameters could not be read; quorum then counts as not reached.
    pub quorum: Option<TokenAmount>,
    pub quorum_reached: bool,
    pub passing: bool,
}

impl ProposalOutcome {
    pub fn evaluate(
        proposal_id: ProposalId,
        state: Option<ProposalState>,
        totals: VoteTotals,
        quorum: Option<TokenAmount>,
    ) -> Self {
        let breakdown = VoteBreakdown::from_totals(&totals);
        let reached = quorum.map_or(false, |quorum| quorum_reached(&totals, quorum));
        let passing = reached && totals.for_votes > totals.against_votes;
        Self {
            proposal_id,
            state,
            totals,
            breakdown,
            quorum,
            quorum_reached: reached,
            passing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TallySource;
    use pretty_assertions::assert_eq;

    fn totals(for_votes: u64, against_votes: u64, abstain_votes: u64) -> VoteTotals {
        VoteTotals {
            for_votes: TokenAmount::from_tokens(for_votes, 18),
            against_votes: TokenAmount::from_tokens(against_votes, 18),
            abstain_votes: TokenAmount::from_tokens(abstain_votes, 18),
            total_voters: 3,
            source: TallySource::Aggregate,
        }
    }

    #[test]
    fn test_percentages_are_exact() {
        let breakdown = VoteBreakdown::from_totals(&totals(30, 70, 0));
        assert_eq!(breakdown.for_pct.to_string(), "30.00");
        assert_eq!(breakdown.against_pct.to_string(), "70.00");
        assert_eq!(breakdown.abstain_pct, Percentage::ZERO);
    }

    #[test]
    fn test_percentages_round_down() {
        let breakdown = VoteBreakdown::from_totals(&totals(1, 1, 1));
        assert_eq!(breakdown.for_pct.to_string(), "33.33");
        assert_eq!(Percentage::from_basis_points(5).to_string(), "0.05");
    }

    #[test]
    fn test_empty_totals_have_zero_percentages() {
        let breakdown = VoteBreakdown::from_totals(&VoteTotals::no_data());
        assert_eq!(breakdown.for_pct, Percentage::ZERO);
        assert_eq!(breakdown.against_pct, Percentage::ZERO);
    }

    #[test]
    fn test_huge_amounts_do_not_overflow() {
        let max = TokenAmount::from_raw(U256::MAX);
        assert_eq!(Percentage::from_ratio(max, max).to_string(), "100.00");
    }

    #[test]
    fn test_quorum_blocks_passing() {
        let quorum = Some(TokenAmount::from_tokens(100, 18));
        let outcome = ProposalOutcome::evaluate(1, Some(ProposalState::Active), totals(60, 10, 0), quorum);
        assert!(!outcome.quorum_reached);
        assert!(!outcome.passing);

        let outcome = ProposalOutcome::evaluate(1, None, totals(60, 10, 30), quorum);
        assert!(outcome.quorum_reached);
        assert!(outcome.passing);

        let outcome = ProposalOutcome::evaluate(1, None, totals(60, 10, 30), None);
        assert!(!outcome.quorum_reached);
    }

    #[test]
    fn test_tie_does_not_pass() {
        let outcome = ProposalOutcome::evaluate(2, None, totals(50, 50, 0), Some(TokenAmount::zero()));
        assert!(outcome.quorum_reached);
        assert!(!outcome.passing);
    }
}
