use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use eks_stack_app::adapters::outputs::CloudFormationOutputSource;
use eks_stack_app::{commands, logging};
use eks_stack_core::config::DEFAULT_STACK_ID;
use eks_stack_core::context::{ACCOUNT_ENV_VAR, REGION_ENV_VAR};
use eks_stack_core::StackEnvironment;

// ── CLI definition ──────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "eks-stack")]
#[command(about = "Synthesize the Spring Boot on EKS stack", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the CloudFormation template and cloud assembly
    Synth {
        /// Output directory
        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,

        /// TOML file overriding stack defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Target account
        #[arg(long, env = ACCOUNT_ENV_VAR)]
        account: Option<String>,

        /// Target region
        #[arg(long, env = REGION_ENV_VAR)]
        region: Option<String>,
    },

    /// Print the workload manifests as YAML
    Manifests {
        /// TOML file overriding stack defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Concrete image reference instead of the registry placeholder
        #[arg(long)]
        image: Option<String>,
    },

    /// Print the outputs of a provisioned stack as JSON
    Outputs {
        /// CloudFormation stack name
        #[arg(long, default_value = DEFAULT_STACK_ID)]
        stack_name: String,

        /// Region the stack lives in
        #[arg(long, env = REGION_ENV_VAR)]
        region: Option<String>,
    },
}

// ── Entry point ─────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json)?;

    match cli.command {
        Commands::Synth {
            out,
            config,
            account,
            region,
        } => {
            let env = StackEnvironment::new(account, region);
            let files = commands::run_synth(&out, config.as_deref(), env)?;
            println!("{}", serde_json::to_string_pretty(&files)?);
        }
        Commands::Manifests { config, image } => {
            print!("{}", commands::run_manifests(config.as_deref(), image.as_deref())?);
        }
        Commands::Outputs { stack_name, region } => {
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(aws_config::Region::new(region));
            }
            let aws_config = loader.load().await;
            let source =
                CloudFormationOutputSource::new(aws_sdk_cloudformation::Client::new(&aws_config));
            println!("{}", commands::run_outputs(&source, &stack_name)?);
        }
    }

    Ok(())
}
