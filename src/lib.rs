/*!
dao-lens - DAO governance state, read defensively

This crate answers the questions a governance dashboard asks of a token,
governor and timelock deployment: where an address's voting weight ends up,
how much voting power it carries at a snapshot, and how a proposal is being
voted. Every query prefers the contracts' own aggregate answers and falls back
to re-deriving them from balances, delegation edges and vote-cast events.

# Main Components

- `types`: addresses, fixed-point token amounts, proposal and vote records
- `gateway`: the contract gateway trait, its typed adapter and an in-memory contract model
- `governance`: delegation resolver, voting power aggregator, tally reader and write actions
- `config`: timeouts, look-back windows and delegation limits
- `cli`: command-line interface over a JSON fixture

# Example Usage

```rust,no_run
use dao_lens::config::GovernanceConfig;
use dao_lens::gateway::MemoryGateway;
use dao_lens::governance::GovernanceService;

# async fn run() -> dao_lens::error::Result<()> {
let gateway = MemoryGateway::from_fixture_file("fixture.json")?;
let service = GovernanceService::new(gateway, GovernanceConfig::default())?;
let totals = service.get_vote_totals(1, None).await;
println!("{:?}", totals.source);
# Ok(())
# }
```
*/

/// Strongly-typed governance values.
pub mod types;

/// Errors for gateway calls and governance operations.
pub mod error;

/// Query tunables loaded from JSON.
pub mod config;

/// Contract gateway seam, response adapter and in-memory contract model.
pub mod gateway;

/// Governance queries, fallback strategies and write actions.
pub mod governance;

/// Command-line interface for inspecting a fixture.
pub mod cli;

// Re-export commonly used types
pub use config::GovernanceConfig;
pub use error::{GatewayError, GovernanceError};
pub use gateway::{ContractGateway, MemoryGateway};
pub use governance::{GovernanceService, PowerSource, VotingPower};
pub use types::{Address, TokenAmount, VoteSupport, VoteTotals};
