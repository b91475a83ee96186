use anyhow::Result;
use clap::Parser;
use ppm::{commands, config::Config, runtime::RealRuntime};
use std::path::PathBuf;
use std::sync::Arc;

/// ppm - local package repository manager
///
/// Keeps packages under one repository root: add local package skeletons,
/// or download and install packages listed in the package index.
///
/// Examples:
///   ppm init
///   ppm add demo 1.0 main.pryzma
///   ppm install std
#[derive(Parser, Debug)]
#[command(author, version = env!("PPM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository root directory (defaults to ~/.ppm; also via PPM_ROOT)
    #[arg(long = "root", short = 'r', env = "PPM_ROOT", value_name = "PATH", global = true)]
    root: Option<PathBuf>,

    /// JSON file mapping package names to archive URLs, layered over the built-in index
    #[arg(long = "index", env = "PPM_INDEX", value_name = "FILE", global = true)]
    index: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Create the repository root
    Init,

    /// Add a local package with empty files
    Add(AddArgs),

    /// Remove a package directory
    Remove(NameArgs),

    /// List packages in the repository
    List,

    /// Download and install a package from the index
    Install(NameArgs),

    /// Re-install one package, or every package in the repository
    Update(UpdateArgs),

    /// Show the metadata of a package
    Info(NameArgs),
}

#[derive(clap::Args, Debug)]
struct AddArgs {
    /// Name of the package
    #[arg(value_name = "PACKAGE_NAME")]
    name: String,

    /// Version of the package
    #[arg(value_name = "PACKAGE_VERSION")]
    version: String,

    /// Files in the package
    #[arg(value_name = "FILE", required = true, num_args = 1..)]
    files: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct NameArgs {
    /// Name of the package
    #[arg(value_name = "PACKAGE_NAME")]
    name: String,
}

#[derive(clap::Args, Debug)]
struct UpdateArgs {
    /// Package to update; all packages when omitted
    #[arg(value_name = "PACKAGE_NAME")]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let runtime = Arc::new(RealRuntime);
    let config = Config::load(runtime.as_ref(), cli.root, cli.index.as_deref())?;
    let manager = commands::build_manager(runtime, config)?;

    match cli.command {
        Commands::Init => commands::init(&manager)?,
        Commands::Add(args) => commands::add(&manager, &args.name, &args.version, &args.files)?,
        Commands::Remove(args) => commands::remove(&manager, &args.name)?,
        Commands::List => commands::list(&manager)?,
        Commands::Install(args) => commands::install(&manager, &args.name).await?,
        Commands::Update(args) => commands::update(&manager, args.name.as_deref()).await?,
        Commands::Info(args) => commands::info(&manager, &args.name)?,
    }
    Ok(())
}
