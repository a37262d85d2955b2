pub mod address;
pub mod amount;
pub mod proposal;

pub use address::Address;
pub use amount::{TokenAmount, DEFAULT_DECIMALS};
pub use proposal::{
    GovernanceParams, ProposalId, ProposalState, TallySource, TransferRecord, VoteReceipt,
    VoteRecord, VoteSupport, VoteTotals,
};
