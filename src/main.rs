use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use inkcache::{CacheRegistry, Classifier, EngineConfig, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "inkcache")]
#[command(about = "Offline cache maintenance for the manga reader client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/inkcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print per-namespace entry counts
  Status,
  /// Delete every cache namespace
  Clear,
  /// Print the resource class a path resolves to
  Classify { path: String },
}

fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  let config = EngineConfig::load(args.config.as_deref())?;

  match args.command {
    Command::Status => {
      let registry = CacheRegistry::new(SqliteStore::open()?, &config.version);
      println!("generation: {}", config.version);
      let names = registry.list_namespace_names()?;
      if names.is_empty() {
        println!("no cache namespaces");
      }
      for name in names {
        println!("{:<24} {:>6} entries", name, registry.count_entries(&name)?);
      }
    }
    Command::Clear => {
      let registry = CacheRegistry::new(SqliteStore::open()?, &config.version);
      for name in registry.list_namespace_names()? {
        registry.delete_namespace(&name)?;
        println!("deleted {}", name);
      }
    }
    Command::Classify { path } => {
      let classifier = Classifier::new(&config);
      println!("{}", classifier.classify(&path));
    }
  }

  Ok(())
}
