//! OpenWebNet gateway CLI.
//!
//! # Commands
//!
//! - `test` - One-shot connectivity and authentication test
//! - `listen` - Stream raw bus events to stdout
//! - `send` - Send one command frame and print the reply

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use own::frame::Frame;
use own::{
    Config, Gateway, GatewayEvent, GatewayHandler, GatewaySession, RawDecoder, SessionKind,
    VERSION,
};

#[derive(Parser)]
#[command(name = "own")]
#[command(version = VERSION)]
#[command(about = "OpenWebNet gateway client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Gateway selection, shared by every command.
#[derive(Args)]
struct GatewayArgs {
    /// Gateway address
    #[arg(short, long)]
    address: Option<String>,

    /// Gateway port
    #[arg(short, long)]
    port: Option<u16>,

    /// OPEN password
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// TOML config file (flags take precedence)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Test connectivity and authentication against a gateway
    Test {
        #[command(flatten)]
        gateway: GatewayArgs,

        /// Output the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Open an event session and stream raw bus frames to stdout
    Listen {
        #[command(flatten)]
        gateway: GatewayArgs,
    },

    /// Send one command frame and print the gateway's reply
    Send {
        /// Frame payload, e.g. '*1*1*12' (terminator appended)
        frame: String,

        #[command(flatten)]
        gateway: GatewayArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test { gateway, json } => cmd_test(&gateway, json),
        Commands::Listen { gateway } => cmd_listen(&gateway),
        Commands::Send { frame, gateway } => cmd_send(&frame, &gateway),
    }
}

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

/// Resolve configuration from config file, environment and flags, in
/// ascending precedence.
fn resolve(args: &GatewayArgs) -> anyhow::Result<(Gateway, Config)> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config = config.merge(Config::from_env());

    if let Some(address) = &args.address {
        config.gateway.address = address.clone();
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    if let Some(password) = &args.password {
        config.gateway.password = Some(password.clone());
    }

    if config.gateway.address.is_empty() {
        anyhow::bail!("no gateway address given (flag --address, config file, or OWN_ADDRESS)");
    }

    Ok((Gateway::new(config.gateway_descriptor()), config))
}

fn cmd_test(args: &GatewayArgs, json: bool) -> anyhow::Result<()> {
    init_logging(args.verbose);
    let (gateway, _) = resolve(args)?;
    let gateway = Arc::new(gateway);

    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(GatewaySession::test(Arc::clone(&gateway)));

    if json {
        println!(
            "{}",
            serde_json::json!({
                "success": outcome.is_success(),
                "message": outcome.failure().map(|r| r.as_code()),
            })
        );
    }

    match outcome.failure() {
        None => {
            if !json {
                println!("{} connection test succeeded", gateway.log_id());
            }
            Ok(())
        }
        Some(reason) => {
            anyhow::bail!("connection test failed: {} ({reason})", reason.as_code())
        }
    }
}

fn cmd_listen(args: &GatewayArgs) -> anyhow::Result<()> {
    init_logging(args.verbose);
    let (gateway, config) = resolve(args)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut handler = GatewayHandler::new(gateway, RawDecoder, config.handler);
        let mut events = handler.subscribe();
        handler
            .start()
            .map_err(|e| anyhow::anyhow!("failed to start handler: {e}"))?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(GatewayEvent::Message(frame)) => println!("{frame}"),
                    Ok(GatewayEvent::Connected) => eprintln!("connected"),
                    Ok(GatewayEvent::Reconnected) => eprintln!("reconnected"),
                    Ok(GatewayEvent::Disconnected) => eprintln!("disconnected"),
                    Err(_) => break,
                },
            }
        }

        handler.stop().await;
        Ok(())
    })
}

fn cmd_send(payload: &str, args: &GatewayArgs) -> anyhow::Result<()> {
    init_logging(args.verbose);
    let (gateway, _) = resolve(args)?;
    let gateway = Arc::new(gateway);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut session = GatewaySession::connect(gateway, SessionKind::Command)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open command session: {e}"))?;

        session.send_frame(&Frame::from_payload(payload)).await?;
        let reply = session
            .receive_frame_timeout(std::time::Duration::from_secs(10))
            .await?;
        println!("{reply}");

        session.close().await;
        Ok(())
    })
}
