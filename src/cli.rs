use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;
use serde_json::{json, Value};

use crate::config::GovernanceConfig;
use crate::error::Result;
use crate::gateway::MemoryGateway;
use crate::governance::{GovernanceService, ProposalDraft};
use crate::types::{Address, ProposalId, VoteSupport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and exercise DAO governance state", long_about = None)]
pub struct Cli {
    /// JSON fixture describing the token, governor and timelock state
    #[arg(short, long, global = true, default_value = "fixture.json")]
    pub fixture: PathBuf,

    /// JSON configuration file; defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Save the fixture after a write command
    #[arg(long, global = true)]
    pub write_back: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Delegation chain of an address
    Chain {
        address: Address,
    },

    /// Voting power of an address
    Power {
        address: Address,

        /// Snapshot id (default: current)
        #[arg(short, long)]
        snapshot: Option<u64>,

        /// Also compute the local figure and compare
        #[arg(long)]
        cross_check: bool,
    },

    /// Vote totals of a proposal
    Tally {
        proposal_id: ProposalId,

        /// Connected user, used when only their own vote is known
        #[arg(short, long)]
        user: Option<Address>,
    },

    /// Percentages, quorum and pass/fail of a proposal
    Outcome {
        proposal_id: ProposalId,

        #[arg(short, long)]
        user: Option<Address>,
    },

    /// Balance, delegation and voting power of an address
    Overview {
        address: Address,
    },

    /// Estimated number of token holders
    Holders,

    /// Governance parameters
    Params,

    /// Delegate voting weight (to yourself to reset)
    Delegate {
        #[arg(long)]
        from: Address,

        #[arg(long)]
        to: Address,
    },

    /// Cast a vote (for/against/abstain)
    Vote {
        #[arg(long)]
        voter: Address,

        #[arg(short, long)]
        proposal_id: ProposalId,

        #[arg(short, long)]
        support: VoteSupport,

        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Submit a proposal described by a JSON draft file
    Propose {
        #[arg(long)]
        proposer: Address,

        #[arg(short, long)]
        draft: PathBuf,
    },
}

impl Commands {
    fn is_write(&self) -> bool {
        matches!(self, Commands::Delegate { .. } | Commands::Vote { .. } | Commands::Propose { .. })
    }
}

pub struct CliHandler {
    service: GovernanceService<MemoryGateway>,
    fixture: PathBuf,
    write_back: bool,
}

impl CliHandler {
    pub fn new(service: GovernanceService<MemoryGateway>, fixture: PathBuf, write_back: bool) -> Self {
        Self { service, fixture, write_back }
    }

    /// Loads the configuration and fixture named on the command line.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => GovernanceConfig::from_file(path)?,
            None => GovernanceConfig::default(),
        };
        let gateway = MemoryGateway::from_fixture_file(&cli.fixture)?;
        let service = GovernanceService::new(gateway, config)?;
        Ok(Self::new(service, cli.fixture.clone(), cli.write_back))
    }

    pub fn service(&self) -> &GovernanceService<MemoryGateway> {
        &self.service
    }

    pub async fn handle_command(&self, command: &Commands) -> Result<Value> {
        let decimals = self.service.config().token_decimals;

        let output = match command {
            Commands::Chain { address } => {
                let chain = self.service.resolve_chain(*address).await;
                json!({ "rendered": chain.render(), "chain": chain })
            }

            Commands::Power { address, snapshot, cross_check } => {
                let power = self.service.compute_voting_power(*address, *snapshot).await;
                let mut output = json!({
                    "power": power,
                    "formatted": power.amount.format_units(decimals),
                });
                if let (true, Some(snapshot_id)) = (*cross_check, power.snapshot_id) {
                    output["cross_check"] =
                        serde_json::to_value(self.service.cross_check_voting_power(*address, snapshot_id).await)?;
                }
                output
            }

            Commands::Tally { proposal_id, user } => {
                let totals = self.service.get_vote_totals(*proposal_id, *user).await;
                json!({
                    "totals": totals,
                    "for": totals.for_votes.format_units(decimals),
                    "against": totals.against_votes.format_units(decimals),
                    "abstain": totals.abstain_votes.format_units(decimals),
                })
            }

            Commands::Outcome { proposal_id, user } => {
                serde_json::to_value(self.service.proposal_outcome(*proposal_id, *user).await)?
            }

            Commands::Overview { address } => serde_json::to_value(self.service.delegation_overview(*address).await)?,

            Commands::Holders => serde_json::to_value(self.service.estimate_holder_count().await)?,

            Commands::Params => serde_json::to_value(self.service.governance_params().await)?,

            Commands::Delegate { from, to } => {
                let hash = self.service.delegate(*from, *to).await?;
                json!({ "tx": hash.to_string() })
            }

            Commands::Vote { voter, proposal_id, support, reason } => {
                let hash = self
                    .service
                    .cast_vote(*voter, *proposal_id, *support, reason.clone())
                    .await?;
                json!({ "tx": hash.to_string() })
            }

            Commands::Propose { proposer, draft } => {
                let draft: ProposalDraft = serde_json::from_str(&fs::read_to_string(draft)?)?;
                let hash = self.service.propose(*proposer, draft).await?;
                json!({ "tx": hash.to_string(), "proposal_id": self.service.gateway().latest_proposal_id() })
            }
        };

        if command.is_write() && self.write_back {
            self.save_fixture()?;
        }
        Ok(output)
    }

    fn save_fixture(&self) -> Result<()> {
        let fixture = self.service.gateway().snapshot();
        fs::write(&self.fixture, serde_json::to_string_pretty(&fixture)?)?;
        info!("Fixture written back to {}", self.fixture.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Fixture;

    #[test]
    fn test_parses_vote_command() {
        let cli = Cli::parse_from([
            "dao-lens",
            "--fixture",
            "dao.json",
            "vote",
            "--voter",
            "0x0101010101010101010101010101010101010101",
            "-p",
            "3",
            "-s",
            "against",
        ]);
        assert_eq!(cli.fixture, PathBuf::from("dao.json"));
        match cli.command {
            Commands::Vote { proposal_id, support, reason, .. } => {
                assert_eq!(proposal_id, 3);
                assert_eq!(support, VoteSupport::Against);
                assert_eq!(reason, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_malformed_address() {
        assert!(Cli::try_parse_from(["dao-lens", "chain", "0x1234"]).is_err());
    }

    #[tokio::test]
    async fn test_chain_command_output() {
        let gateway = MemoryGateway::from_fixture(Fixture::default());
        let a = Address::new([1; 20]);
        let b = Address::new([2; 20]);
        gateway.set_delegate(a, b);
        let service = GovernanceService::new(gateway, GovernanceConfig::default()).unwrap();
        let handler = CliHandler::new(service, PathBuf::from("unused.json"), false);

        let output = handler.handle_command(&Commands::Chain { address: a }).await.unwrap();
        assert_eq!(output["rendered"], "0x0101…0101 -> 0x0202…0202");
    }

    #[tokio::test]
    async fn test_demo_fixture_loads_and_answers() {
        let cli = Cli::parse_from([
            "dao-lens",
            "--fixture",
            concat!(env!("CARGO_MANIFEST_DIR"), "/demos/fixture.json"),
            "--config",
            concat!(env!("CARGO_MANIFEST_DIR"), "/demos/config.json"),
            "holders",
        ]);
        let handler = CliHandler::from_cli(&cli).unwrap();

        // Voter 4 switched to against; the replayed totals only keep that vote.
        let output = handler
            .handle_command(&Commands::Tally { proposal_id: 1, user: None })
            .await
            .unwrap();
        assert_eq!(output["for"], "130.0");
        assert_eq!(output["against"], "50.0");
        assert_eq!(output["totals"]["total_voters"], 2);

        let output = handler.handle_command(&cli.command).await.unwrap();
        assert_eq!(output["holders"], 4);
    }
}
