use anyhow::{Context, Result};
use clap::Parser;
use dao_lens::cli::{Cli, CliHandler};
use log::info;

/// メイン関数
#[tokio::main]
async fn main() -> Result<()> {
    // ログ初期化
    env_logger::init();

    let cli = Cli::parse();
    let handler = CliHandler::from_cli(&cli)
        .with_context(|| format!("loading fixture {}", cli.fixture.display()))?;
    info!("=== dao-lens: {:?} ===", handler.service().connection_state());

    let output = handler.handle_command(&cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    handler.service().metrics().print_stats();
    Ok(())
}
