use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use brief_gateway::api::ApiServer;
use brief_gateway::backend::{BackendClient, GenerateRequest};
use brief_gateway::broadcast::Broadcaster;
use brief_gateway::router::TurnRouter;
use brief_gateway::utterance::InputChannel;
use brief_gateway::{Config, voice};

/// Brief - turn routing gateway for video briefing sessions
#[derive(Parser)]
#[command(name = "brief", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (default)
    Serve {
        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Send one message to the backend and print the reply
    Ask {
        /// Message text
        text: String,
        /// Language of the message
        #[arg(short, long)]
        language: Option<String>,
        /// Conversation thread to continue
        #[arg(short, long, default_value = "brief-cli")]
        session: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,brief_gateway=info",
        1 => "info,brief_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(config, port).await,
        Command::Ask {
            text,
            language,
            session,
        } => ask(&config, text, language, session).await,
    }
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.port);

    tracing::info!(
        port,
        backend = %config.backend.url,
        default_language = %config.voice.default_language,
        "starting brief gateway"
    );

    let backend = Arc::new(BackendClient::new(&config.backend));
    let speech: Arc<dyn voice::SpeechSink> = Arc::from(voice::speech::from_config(&config.speech)?);
    let turns = Arc::new(TurnRouter::new(
        &config,
        backend,
        Arc::new(Broadcaster::new()),
        speech,
    ));

    ApiServer::new(turns, port).run().await?;
    tracing::info!("brief gateway stopped");
    Ok(())
}

async fn ask(
    config: &Config,
    text: String,
    language: Option<String>,
    session: String,
) -> anyhow::Result<()> {
    let client = BackendClient::new(&config.backend);
    let request = GenerateRequest {
        text,
        session_id: session,
        language: language.unwrap_or_else(|| config.voice.default_language.clone()),
        channel: InputChannel::Text,
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let reply = client.generate_with(&request, client.policy(), &cancel).await?;
    tracing::debug!(
        attempts = reply.attempts(),
        fragments = reply.fragments(),
        "reply received"
    );
    println!("{}", reply.text());
    Ok(())
}
