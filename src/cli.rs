//! Command-line interface.
//!
//! `ekslab synth` renders a deployment template for one scenario;
//! `diff` compares that rendering against a previously written template;
//! `validate` checks a configuration file; `list-scenarios` prints the
//! catalog.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::identity::{CallerIdentityProvider, Identity, StaticIdentityProvider};
use crate::scenario::ScenarioKind;
use crate::stack::Deployment;

/// EKS troubleshooting lab builder.
#[derive(Parser, Debug)]
#[command(name = "ekslab")]
#[command(version)]
#[command(about = "Synthesizes EKS troubleshooting lab environments", long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a configuration file
    #[arg(short = 'c', long, global = true, env = "EKSLAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scenario to build, overriding the configuration file
    #[arg(short = 's', long, global = true)]
    pub scenario: Option<String>,

    /// Caller ARN to map as cluster admin, skipping the STS lookup
    #[arg(long, global = true, env = "EKSLAB_CALLER_ARN")]
    pub caller_arn: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize the deployment template
    Synth {
        /// Write the template here instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Compare a fresh synthesis against an existing template file
    Diff {
        /// Previously synthesized template
        template: PathBuf,
    },
    /// Validate the configuration without synthesizing
    Validate,
    /// List the scenario catalog
    ListScenarios,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Run the selected command, returning the process exit code.
pub async fn run(cli: &Cli) -> Result<i32> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = Config::load(cli.config.as_ref())?;
    if let Some(scenario) = &cli.scenario {
        config.scenario = scenario.parse()?;
    }

    match &cli.command {
        Commands::Synth { output } => synth(cli, config, output.as_ref()).await,
        Commands::Diff { template } => diff(cli, config, template).await,
        Commands::Validate => {
            config.validate()?;
            println!(
                "{} configuration valid, scenario {}",
                "ok:".green().bold(),
                config.scenario
            );
            Ok(0)
        }
        Commands::ListScenarios => {
            for kind in ScenarioKind::all() {
                println!("{:26} {}", kind.name().cyan().bold(), kind.description());
            }
            Ok(0)
        }
    }
}

async fn synth(cli: &Cli, config: Config, output: Option<&PathBuf>) -> Result<i32> {
    let rendered = synthesize(cli, config).await?;
    match output {
        Some(path) => {
            fs::write(path, &rendered)?;
            eprintln!("{} wrote {}", "ok:".green().bold(), path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(0)
}

async fn diff(cli: &Cli, config: Config, template: &PathBuf) -> Result<i32> {
    let existing = fs::read_to_string(template)?;
    let rendered = synthesize(cli, config).await?;
    if existing == rendered {
        println!("{} no changes", "ok:".green().bold());
        return Ok(0);
    }

    let text_diff = TextDiff::from_lines(existing.as_str(), rendered.as_str());
    for change in text_diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => print!("{}", format!("-{change}").red()),
            ChangeTag::Insert => print!("{}", format!("+{change}").green()),
            ChangeTag::Equal => {}
        }
    }
    Ok(1)
}

async fn synthesize(cli: &Cli, config: Config) -> Result<String> {
    let provider = identity_provider(cli).await?;
    let deployment = Deployment::new(config, provider);
    let synthesis = deployment.synthesize().await?;
    serde_json::to_string_pretty(&synthesis.template).map_err(Error::from)
}

async fn identity_provider(cli: &Cli) -> Result<Box<dyn CallerIdentityProvider>> {
    if let Some(arn) = &cli.caller_arn {
        let identity = identity_from_arn(arn)?;
        return Ok(Box::new(StaticIdentityProvider::new(identity)));
    }
    #[cfg(feature = "aws")]
    {
        Ok(Box::new(crate::identity::StsIdentityProvider::from_env().await))
    }
    #[cfg(not(feature = "aws"))]
    {
        Err(Error::CredentialsUnavailable(
            "built without the aws feature; pass --caller-arn".to_string(),
        ))
    }
}

fn identity_from_arn(arn: &str) -> Result<Identity> {
    let account = arn
        .split(':')
        .nth(4)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::Config(format!("{arn} is not a principal ARN")))?;
    Ok(Identity::new("static-caller", arn, account))
}
