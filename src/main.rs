use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::Value;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use tessel_rs::tessel::server::{self, AppState};
use tessel_rs::tessel::workflow::builder::Builder;
use tessel_rs::tessel::workflow::config::RunnerConfig;
use tessel_rs::tessel::workflow::registry::StepRegistry;
use tessel_rs::tessel::workflow::runner::WorkflowRunner;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Maximum number of steps running at once (overrides TESSEL_MAX_CONCURRENT_STEPS)
    #[arg(long, global = true)]
    max_concurrent_steps: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow from a file
    Run {
        /// Path to the workflow file (YAML or JSON)
        #[arg(short, long)]
        file: String,

        /// Initial input as JSON
        #[arg(short, long, default_value = "{}")]
        input: String,

        /// Print every event as a JSON line instead of the final execution
        #[arg(long)]
        stream: bool,
    },
    /// Validate a workflow file without running it
    Validate {
        /// Path to the workflow file (YAML or JSON)
        #[arg(short, long)]
        file: String,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let mut config = RunnerConfig::from_env()?;
    if let Some(max) = args.max_concurrent_steps {
        config = config.with_max_concurrent_steps(max);
    }
    let runner = WorkflowRunner::new(config);
    let registry = StepRegistry::with_builtins();

    match args.command {
        Commands::Run {
            file,
            input,
            stream,
        } => {
            let input: Value =
                serde_json::from_str(&input).context("--input must be valid JSON")?;
            let workflow = Arc::new(Builder::new(registry).build_from_file(&file).await?);

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Interrupted, cancelling run");
                    on_ctrl_c.cancel();
                }
            });

            println!("Running workflow: {}", workflow.metadata.name);
            if stream {
                let mut events = runner.run_stream(workflow, input, cancel);
                while let Some(event) = events.next().await {
                    println!("{}", serde_json::to_string(&event)?);
                }
            } else {
                let execution = runner.run(workflow, input, cancel).await?;
                println!("{}", serde_json::to_string_pretty(&execution)?);
            }
        }
        Commands::Validate { file } => {
            let workflow = Builder::new(registry).build_from_file(&file).await?;
            let result = workflow.validate();

            for warning in &result.warnings {
                println!("warning: {}", warning);
            }
            for error in &result.errors {
                println!("error: {}", error);
            }
            if !result.is_valid {
                bail!("{} is not a valid workflow", file);
            }
            println!("{} is valid", file);
        }
        Commands::Serve { port } => {
            server::serve(port, AppState::new(registry, runner)).await?;
        }
    }

    Ok(())
}
