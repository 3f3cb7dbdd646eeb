//! `ciao-image` command-line tool.
//!
//! Opens the configured image cache locally and runs one operation against
//! it. Logs go to stderr so command output on stdout stays scriptable.

#![deny(unsafe_code)]

mod commands;

use anyhow::Result;
use ciao_image::config::LoggingConfig;
use ciao_image::{Config, ImageType, Visibility};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ciao-image")]
#[command(about = "Manage cluster disk images and their content", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./ciao-image.toml, then ~/.ciao-image/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new image
    Create(CreateArgs),
    /// List images visible to a tenant
    List {
        #[arg(short, long)]
        tenant: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one image
    Show {
        #[arg(short, long)]
        tenant: String,
        id: String,
        /// Print JSON instead of key/value lines
        #[arg(long)]
        json: bool,
    },
    /// Upload image content from a file
    Upload {
        #[arg(short, long)]
        tenant: String,
        id: String,
        file: PathBuf,
    },
    /// Delete an image and its content
    Delete {
        #[arg(short, long)]
        tenant: String,
        id: String,
    },
    /// Change an image's name, visibility, type or tags
    Update(UpdateArgs),
}

/// Arguments for `ciao-image create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Owning tenant (empty for a cluster-wide image)
    #[arg(short, long)]
    pub tenant: String,
    /// Image name ([a-z0-9-.], up to 64 characters)
    #[arg(short, long)]
    pub name: String,
    /// Image ID (a random UUID when omitted)
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long, default_value_t = Visibility::Private)]
    pub visibility: Visibility,
    #[arg(long = "type", default_value_t = ImageType::Raw)]
    pub image_type: ImageType,
    #[arg(long, default_value = "")]
    pub tags: String,
    /// Allow public and internal visibility
    #[arg(long)]
    pub admin: bool,
}

/// Arguments for `ciao-image update`.
#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    #[arg(short, long)]
    pub tenant: String,
    pub id: String,
    #[arg(short, long)]
    pub name: Option<String>,
    #[arg(long)]
    pub visibility: Option<Visibility>,
    #[arg(long = "type")]
    pub image_type: Option<ImageType>,
    #[arg(long)]
    pub tags: Option<String>,
    /// Allow public and internal visibility
    #[arg(long)]
    pub admin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let validation = config.validate()?;

    init_logging(&config.logging);
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }

    let cache = config.open_cache()?;

    match cli.command {
        Commands::Create(args) => commands::image::create(&cache, args).await,
        Commands::List { tenant, json } => commands::image::list(&cache, &tenant, json).await,
        Commands::Show { tenant, id, json } => {
            commands::image::show(&cache, &tenant, &id, json).await
        },
        Commands::Upload { tenant, id, file } => {
            commands::image::upload(&cache, &tenant, &id, &file).await
        },
        Commands::Delete { tenant, id } => commands::image::delete(&cache, &tenant, &id).await,
        Commands::Update(args) => commands::image::update(&cache, args).await,
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides the configured level.
fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
