//! luadist CLI front end.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use luadist::config::Config;
use luadist::core::manifest;
use luadist::ops;

#[derive(Parser)]
#[command(name = "luadist", version, about = "LuaDist distribution manager")]
struct Cli {
    /// Deployment directory to operate on
    #[arg(short, long, default_value = ".")]
    deployment: PathBuf,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Repository locator(s), overriding configuration
    #[arg(long = "repo")]
    repos: Vec<String>,

    /// Deploy file copies instead of symlinks
    #[arg(long)]
    copy: bool,

    /// Keep scratch state and use debug build commands
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install dists and their dependencies
    Install {
        /// Dist names, optionally constrained: name, "name >= 1.0"
        #[arg(required = true)]
        names: Vec<String>,
        /// Extra build variables as KEY=VALUE
        #[arg(long = "var")]
        variables: Vec<String>,
    },
    /// Remove installed dists
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Repackage installed dists into archives
    Pack {
        #[arg(required = true)]
        names: Vec<String>,
        /// Output directory for the archives
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
    /// List installed dists
    List,
    /// Search available dists by name or description
    Search {
        query: String,
    },
    /// Print every dist available from the configured repositories
    Manifest,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if !cli.repos.is_empty() {
        cfg.repositories = cli.repos.clone();
    }
    if cli.copy {
        cfg.link = false;
    }
    if cli.debug {
        cfg.debug = true;
    }

    match cli.command {
        Commands::Install { names, variables } => {
            let variables = parse_variables(&variables)?;
            let installed = ops::install::install(&cfg, &names, &cli.deployment, None, &variables)?;
            if installed.is_empty() {
                println!("nothing to install");
            }
            for dist in &installed {
                println!("installed {}", dist.id());
            }
        }
        Commands::Remove { names } => {
            for id in ops::remove::remove(&cfg, &names, &cli.deployment)? {
                println!("removed {id}");
            }
        }
        Commands::Pack { names, dest } => {
            for archive in ops::pack::pack(&cfg, &names, &cli.deployment, &dest)? {
                println!("packed {}", archive.display());
            }
        }
        Commands::List => {
            for dist in ops::deployed::get_deployed(&cfg, &cli.deployment)? {
                if dist.provided.is_none() {
                    println!("{}", dist.id());
                }
            }
        }
        Commands::Search { query } => {
            let query = query.to_lowercase();
            for dist in manifest::get_manifest(&cfg)? {
                let matches = dist.name.to_lowercase().contains(&query)
                    || dist
                        .desc
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&query));
                if matches {
                    println!("{}\t{}", dist.id(), dist.desc.as_deref().unwrap_or(""));
                }
            }
        }
        Commands::Manifest => {
            for dist in manifest::get_manifest(&cfg)? {
                println!("{} ({} {})", dist.id(), dist.arch(), dist.dist_type());
            }
        }
    }
    Ok(())
}

fn parse_variables(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|kv| {
            kv.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow!("invalid variable `{kv}`, expected KEY=VALUE"))
        })
        .collect()
}
