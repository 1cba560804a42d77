use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use fundme_tools::chain;
use fundme_tools::config::Config;
use fundme_tools::deploy::deploy_all;
use fundme_tools::harness::Suite;
use fundme_tools::tasks;

#[derive(Parser)]
#[command(name = "fundme")]
#[command(about = "FundMe deployment and test tools")]
struct Cli {
    /// Network profile to use (sandbox/local/testnet/mainnet or a fundme.toml profile)
    #[arg(short, long, global = true)]
    network: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the deploy scripts
    Deploy {
        /// Only run scripts carrying these tags
        #[arg(short, long, value_delimiter = ',', default_value = "all")]
        tags: Vec<String>,
    },
    /// Run the FundMe scenario suite (development networks only)
    Test,
    /// Print the network's accounts
    Accounts,
    /// Print the latest ledger sequence
    Ledger,
    /// Show the resolved configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fundme=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.network.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Deploy { tags } => {
            config.print_summary();
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            let registry = deploy_all(&config, &tags)
                .await
                .context("Deployment failed")?;

            for record in registry.iter() {
                println!("{}: {} (ledger {})", record.name, record.address, record.ledger);
            }
            if let Some(dir) = registry.dir() {
                info!(dir = %dir.display(), "Deployments recorded");
            }
            Ok(())
        }
        Commands::Test => {
            let report = Suite::standard()
                .run(&config)
                .await
                .context("Test setup failed")?;
            report.print_summary();

            if !report.is_success() {
                bail!("{} scenario(s) failed", report.failed());
            }
            Ok(())
        }
        Commands::Accounts => {
            let chain = chain::connect(&config).context("Failed to connect")?;
            tasks::print_accounts(chain.as_ref(), &mut std::io::stdout()).await?;
            Ok(())
        }
        Commands::Ledger => {
            let chain = chain::connect(&config).context("Failed to connect")?;
            tasks::print_latest_ledger(chain.as_ref(), &mut std::io::stdout()).await?;
            Ok(())
        }
        Commands::Config { json } => {
            if json {
                println!("{}", config.to_json()?);
            } else {
                config.print_summary();
            }
            Ok(())
        }
    }
}
