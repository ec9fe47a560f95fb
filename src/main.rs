use std::path::{Path, PathBuf};

use alcf_ceilometer_infra::config::{self, ResolvedConfig};
use alcf_ceilometer_infra::outputs::{self, OutputsByEnvironment, StackOutputs};
use alcf_ceilometer_infra::stacks::{self, AlcfCeilometerStack, DeployEnv, PipelineStack};
use alcf_ceilometer_infra::writer;
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const APPLICATION_CONFIG: &str = "AlcfCeilometerStack.yaml";
const PIPELINE_CONFIG: &str = "PipelineStack.yaml";

#[derive(Parser)]
#[command(name = "alcf-infra", version, about = "Define the alcf_ceilometer stacks and pipeline")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory holding the stack configurations and tags.yaml
    #[arg(long, global = true, default_value = "configurations")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Account the stacks are deployed into
    #[arg(long, env = "CDK_DEFAULT_ACCOUNT")]
    account_id: String,

    /// Region the stacks are deployed into (AWS default chain when omitted)
    #[arg(long, env = "CDK_DEFAULT_REGION")]
    region: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration of an environment
    Config {
        #[arg(long)]
        environment: String,

        #[arg(long, default_value = "")]
        suffix: String,

        #[arg(long)]
        use_git_info: bool,

        /// Resolve the pipeline configuration instead of the application one
        #[arg(long)]
        pipeline: bool,
    },

    /// Write the application stack manifest
    SynthApp {
        #[arg(long)]
        environment: String,

        #[arg(long, default_value = "")]
        suffix: String,

        #[arg(long)]
        use_git_info: bool,

        #[command(flatten)]
        target: Target,

        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,
    },

    /// Write one pipeline stack manifest per supported environment
    SynthPipeline {
        #[arg(long, value_delimiter = ',', required = true)]
        supported_environments: Vec<String>,

        #[command(flatten)]
        target: Target,

        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,
    },

    /// Fetch the outputs of the deployed application stacks
    Outputs {
        #[arg(long = "environment", required = true)]
        environments: Vec<String>,

        #[arg(long, default_value = "")]
        suffix: String,

        #[arg(long, env = "CDK_DEFAULT_REGION")]
        region: Option<String>,

        /// File receiving the outputs of every environment as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "alcf_ceilometer_infra=info",
        1 => "alcf_ceilometer_infra=debug",
        _ => "alcf_ceilometer_infra=trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(error) = run(cli).await {
        eprintln!("Error: {:#}", error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let application_config = cli.config_dir.join(APPLICATION_CONFIG);
    let pipeline_config = cli.config_dir.join(PIPELINE_CONFIG);

    match cli.command {
        Commands::Config {
            environment,
            suffix,
            use_git_info,
            pipeline,
        } => {
            let path = if pipeline { &pipeline_config } else { &application_config };
            let config = config::consolidate_config(path, &environment, use_git_info)
                .and_then(|config| config.with_stack_name_suffix(&suffix))
                .with_context(|| format!("resolving {}", path.display()))?;
            print_config(&config, &environment)
        }
        Commands::SynthApp {
            environment,
            suffix,
            use_git_info,
            target,
            out,
        } => {
            let env = DeployEnv::resolve(target.account_id, target.region).await?;
            let stack = AlcfCeilometerStack::new(
                &application_config,
                &environment,
                &suffix,
                use_git_info,
                env,
            )
            .with_context(|| format!("defining {}", AlcfCeilometerStack::id_for(&environment)))?;
            writer::write_manifest(&out, &stack.manifest())?;
            Ok(())
        }
        Commands::SynthPipeline {
            supported_environments,
            target,
            out,
        } => {
            let env = DeployEnv::resolve(target.account_id, target.region).await?;
            for environment in &supported_environments {
                let stack = PipelineStack::new(&pipeline_config, environment, env.clone())
                    .with_context(|| format!("defining the {} pipeline", environment))?;
                writer::write_manifest(&out, &stack.manifest())?;
            }
            Ok(())
        }
        Commands::Outputs {
            environments,
            suffix,
            region,
            out,
        } => {
            fetch_outputs(&application_config, &environments, &suffix, region, out.as_deref())
                .await
        }
    }
}

fn print_config(config: &ResolvedConfig, environment: &str) -> Result<()> {
    let mut document = serde_yaml::Mapping::new();
    document.insert("config".into(), serde_yaml::Value::Mapping(config.as_mapping().clone()));
    document.insert(
        "resolved_tags".into(),
        serde_yaml::to_value(config.resolve_tags(environment))?,
    );

    print!("{}", serde_yaml::to_string(&document)?);
    Ok(())
}

async fn fetch_outputs(
    config_path: &Path,
    environments: &[String],
    suffix: &str,
    region: Option<String>,
    out: Option<&Path>,
) -> Result<()> {
    let mut stack_names = Vec::with_capacity(environments.len());
    for environment in environments {
        let config = config::consolidate_config(config_path, environment, false)
            .and_then(|config| config.with_stack_name_suffix(suffix))
            .with_context(|| format!("resolving {}", config_path.display()))?;
        stack_names.push(config.settings()?.stack_name.unwrap_or_default());
    }

    let region = stacks::resolve_region(region).await?;
    let client = outputs::client(region).await;
    let fetched = futures::future::try_join_all(stack_names.iter().map(|stack_name| {
        let stack = StackOutputs::new(client.clone(), stack_name.clone());
        async move { stack.fetch().await }
    }))
    .await?;

    let by_environment: OutputsByEnvironment =
        environments.iter().cloned().zip(fetched).collect();

    match out {
        Some(path) => writer::write_outputs(path, &by_environment)?,
        None => println!("{}", serde_json::to_string_pretty(&by_environment)?),
    }

    Ok(())
}
