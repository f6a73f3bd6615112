mod cmd;
mod output;
mod prompts;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use sitestack_lib::consts::{DEFAULT_REGION, DEFAULT_STACK_FILE, DEFAULT_STACK_NAME};

use crate::cmd::StackContext;
use crate::output::{OutputFormat, print_error};

/// Declare, deploy and tear down a static website with a serverless API.
#[derive(Parser)]
#[command(name = "sitestack", author, version, about, long_about = None)]
struct Cli {
  /// Stack name; each stack keeps its own state.
  #[arg(long, global = true, env = "SITESTACK_STACK", default_value = DEFAULT_STACK_NAME)]
  stack: String,

  /// Region the stack is deployed to.
  #[arg(long, global = true, env = "SITESTACK_REGION", default_value = DEFAULT_REGION)]
  region: String,

  /// Output format.
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  /// Log level (overridden by RUST_LOG).
  #[arg(long, global = true, default_value = "warn")]
  log_level: Level,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Scaffold a new stack directory
  Init {
    /// Directory to create the stack in
    #[arg(default_value = ".")]
    path: String,
  },

  /// Show what apply would change, without changing anything
  Plan {
    #[arg(default_value = DEFAULT_STACK_FILE)]
    file: String,
  },

  /// Deploy a stack file
  Apply {
    #[arg(default_value = DEFAULT_STACK_FILE)]
    file: String,

    /// Only show what would change
    #[arg(long)]
    dry_run: bool,

    /// Maximum number of provider calls in flight
    #[arg(long)]
    parallelism: Option<usize>,
  },

  /// Delete every resource of the stack
  Destroy {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    force: bool,
  },

  /// Print the outputs of the last apply
  Outputs {
    /// Print only this output's value
    name: Option<String>,
  },

  /// Print the resource graph of a stack file in DOT format
  Graph {
    #[arg(default_value = DEFAULT_STACK_FILE)]
    file: String,
  },

  /// Show the recorded state of the stack
  Status {
    /// List every resource
    #[arg(short, long)]
    verbose: bool,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let ctx = StackContext {
    stack: cli.stack,
    region: cli.region,
    format: cli.output,
  };

  let result = match cli.command {
    Commands::Init { path } => cmd::cmd_init(&path, &ctx),
    Commands::Plan { file } => cmd::cmd_plan(&file, &ctx),
    Commands::Apply {
      file,
      dry_run,
      parallelism,
    } => {
      if dry_run {
        cmd::cmd_plan(&file, &ctx)
      } else {
        cmd::cmd_apply(&file, parallelism, &ctx)
      }
    }
    Commands::Destroy { force } => cmd::cmd_destroy(force, &ctx),
    Commands::Outputs { name } => cmd::cmd_outputs(name.as_deref(), &ctx),
    Commands::Graph { file } => cmd::cmd_graph(&file, &ctx),
    Commands::Status { verbose } => cmd::cmd_status(verbose, &ctx),
  };

  match result {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}
