//! bifrost: routing engine CLI
//!
//! Inspect what the router sees (host profile, catalog, ranking) and run
//! prompts through the fallback chain.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use bifrost::{
    CandidateReason, Complexity, GenerateOptions, GenerateRequest, ModelKey, ResourceProfiler,
    RouteRequest, Router, RouterConfig, SelectionContext, Urgency,
};
use clap::{Parser, Subcommand, ValueEnum};

/// Bifrost CLI
#[derive(Parser)]
#[command(name = "bifrost")]
#[command(version)]
#[command(about = "Inference provider routing engine")]
struct Args {
    /// Config file (default: ~/.bifrost/config.toml, then /etc/bifrost/config.toml)
    #[arg(short, long, env = "BIFROST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the detected system profile as JSON
    Profile,

    /// List catalog entries
    Catalog {
        /// Run model discovery first
        #[arg(long)]
        refresh: bool,
    },

    /// Rank candidates for a task without generating
    Select {
        #[command(flatten)]
        task: TaskArgs,
    },

    /// Run a prompt through the fallback chain
    Route {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        /// System prompt
        #[arg(short, long)]
        system: Option<String>,
        /// Maximum output tokens
        #[arg(long)]
        max_tokens: Option<u32>,
        #[command(flatten)]
        task: TaskArgs,
    },
}

#[derive(clap::Args)]
struct TaskArgs {
    /// Task type (e.g. coding, quick, analysis)
    #[arg(short, long, default_value = "general")]
    task: String,
    #[arg(long, value_enum, default_value_t = ComplexityArg::Medium)]
    complexity: ComplexityArg,
    #[arg(long, value_enum, default_value_t = UrgencyArg::Medium)]
    urgency: UrgencyArg,
    /// Require tool calling
    #[arg(long)]
    tools: bool,
    /// Exclude a candidate, as provider/model (repeatable)
    #[arg(long)]
    exclude: Vec<ModelKey>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ComplexityArg {
    Simple,
    Medium,
    Complex,
}

#[derive(Clone, Copy, ValueEnum)]
enum UrgencyArg {
    Low,
    Medium,
    High,
}

impl TaskArgs {
    fn context(&self) -> SelectionContext {
        let complexity = match self.complexity {
            ComplexityArg::Simple => Complexity::Simple,
            ComplexityArg::Medium => Complexity::Medium,
            ComplexityArg::Complex => Complexity::Complex,
        };
        let urgency = match self.urgency {
            UrgencyArg::Low => Urgency::Low,
            UrgencyArg::Medium => Urgency::Medium,
            UrgencyArg::High => Urgency::High,
        };
        self.exclude.iter().cloned().fold(
            SelectionContext::new(&self.task)
                .complexity(complexity)
                .urgency(urgency)
                .tool_calling(self.tools),
            SelectionContext::exclude,
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: warn for CLI; override with BIFROST_LOG or RUST_LOG.
    let filter = tracing_subscriber::EnvFilter::try_from_env("BIFROST_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = RouterConfig::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Profile => {
            let profiler = ResourceProfiler::host(config.profiler.ttl());
            println!("{}", serde_json::to_string_pretty(&profiler.profile().await)?);
        }

        Command::Catalog { refresh } => {
            let router = build_router(config)?;
            if refresh {
                let report = router.refresh_catalog().await;
                eprintln!(
                    "discovered {}, rejected {}, pruned {}",
                    report.discovered, report.rejected, report.pruned
                );
                for provider in &report.failed_providers {
                    eprintln!("discovery failed: {provider}");
                }
            }
            for cap in router.catalog().snapshot() {
                let strengths: Vec<&str> = cap.strengths.iter().map(String::as_str).collect();
                println!(
                    "{:<45} {:<7} {:<6} tools={:<5} [{}]",
                    cap.key().to_string(),
                    format!("{:?}", cap.size_class()).to_lowercase(),
                    format!("{:?}", cap.speed).to_lowercase(),
                    cap.tool_calling,
                    strengths.join(", ")
                );
            }
        }

        Command::Select { task } => {
            let router = build_router(config)?;
            let result = router.select(&task.context()).await?;
            if result.degraded {
                println!("(degraded: no healthy provider, last resort in use)");
            }
            for candidate in &result.candidates {
                let reason = match candidate.reason {
                    CandidateReason::Ranked { rank } => format!("#{rank}"),
                    CandidateReason::LastResort => "last-resort".to_string(),
                };
                let b = candidate.breakdown;
                println!(
                    "{reason:<12} {:<45} {:.3}  (fit {:.2}, perf {:.2}, headroom {:.2}, urgency {:.2})",
                    candidate.key.to_string(),
                    candidate.confidence,
                    b.task_fit,
                    b.performance,
                    b.headroom,
                    b.urgency
                );
            }
        }

        Command::Route {
            prompt,
            system,
            max_tokens,
            task,
        } => {
            let router = build_router(config)?;
            let prompt = read_input(prompt)?;
            let mut request = GenerateRequest::plain(prompt);
            if let Some(system) = system {
                request = request.system(system);
            }
            if let Some(max_tokens) = max_tokens {
                request = request.options(GenerateOptions::default().max_tokens(max_tokens));
            }
            let routed = router
                .route(RouteRequest::new(task.context(), request))
                .await?;
            println!("{}", routed.response.content);
            eprintln!("{}", serde_json::to_string_pretty(&routed.metadata)?);
        }
    }

    Ok(())
}

/// Router from config, falling back to a local Ollama when none is configured.
fn build_router(config: RouterConfig) -> bifrost::Result<Router> {
    let unconfigured = config.providers.ollama.is_none() && config.providers.remote.is_empty();
    let mut builder = Router::builder().config(config).with_configured_providers();
    if unconfigured {
        builder = builder.ollama(bifrost::providers::ollama::DEFAULT_BASE_URL);
    }
    builder.build()
}

/// Use the argument if given, else read stdin (unless it is a terminal).
fn read_input(arg: Option<String>) -> io::Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no prompt given and stdin is a terminal",
        ));
    }
    let mut buf = String::new();
    stdin.read_to_string(&mut buf)?;
    Ok(buf.trim_end().to_string())
}
