//! Command-line runner for the XOP agent.
//!
//! Run with: `zentinel-agent-xop --config config.yaml --input message.bin --content-type '...'`

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_agent_xop::{
    ExecutionResult, Message, MessageContext, SimpleMessageContext, XopAgent, XopAgentConfig,
};

/// Run one XOP/MTOM action on a message file.
///
/// Applies one XOP action to a multipart/related message read from a file,
/// prints the published variables as JSON and writes the resulting content.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// File holding the message content
    #[arg(short, long)]
    input: PathBuf,

    /// Content-Type header of the message
    #[arg(long)]
    content_type: String,

    /// Where to write the resulting content (omit to skip)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Flow variable as name=value, repeatable
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{}'", s))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Zentinel XOP Agent v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let config: XopAgentConfig = if args.config.exists() {
        let content =
            std::fs::read_to_string(&args.config).context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        XopAgentConfig::default()
    };

    info!(
        action = ?config.action,
        source = ?config.source,
        debug = config.debug,
        "Configuration loaded"
    );

    let content = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read input {}", args.input.display()))?;

    let vars: HashMap<String, String> = args.vars.into_iter().collect();
    let source = config
        .resolve(&vars)
        .map(|resolved| resolved.source)
        .unwrap_or_else(|_| "message".to_string());

    let mut ctx = SimpleMessageContext::new().with_message(
        source.clone(),
        Message::new(content).with_header("content-type", args.content_type.as_str()),
    );
    for (name, value) in vars {
        ctx = ctx.with_variable(name, value);
    }

    let agent = XopAgent::new(config);
    let result = agent.execute(&mut ctx);

    let variables =
        serde_json::to_string_pretty(ctx.variables()).context("Failed to encode variables")?;
    println!("{}", variables);

    if result == ExecutionResult::Abort {
        bail!("XOP action aborted");
    }

    if let (Some(path), Some(message)) = (&args.output, ctx.message(&source)) {
        std::fs::write(path, message.content())
            .with_context(|| format!("Failed to write output {}", path.display()))?;
        info!("Output written to {}", path.display());
    }

    Ok(())
}
