use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use vigil_gateway::classify::{Classifier, HttpClassifier};
use vigil_gateway::ingress::{self, IngressState};
use vigil_gateway::model_tier::SystemLoadSampler;
use vigil_gateway::relay::{AlertTransport, LogTransport, SpeechSynth, WebhookTransport};
use vigil_gateway::stt::{HttpTranscriber, Transcriber};
use vigil_gateway::{
    AudioBufferStore, CommandPipeline, Config, EventBoard, Flow, ModelTierSelector,
    PanicTaskManager, RetryLedger, SessionScheduler, WakeWatch,
};

/// Vigil - Live voice-command orchestrator
#[derive(Parser)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// Config file path (defaults to the platform config dir)
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the websocket audio ingress
    #[arg(long, env = "VIGIL_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,vigil_gateway=info",
        1 => "info,vigil_gateway=debug",
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
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.listen_port = port;
    }

    let transcriber: Arc<dyn Transcriber> = HttpTranscriber::new(config.stt.clone());
    let classifier: Arc<dyn Classifier> = HttpClassifier::new(config.classifier.clone());
    let transport: Arc<dyn AlertTransport> = match &config.webhook_url {
        Some(url) => WebhookTransport::new(url.clone()),
        None => {
            tracing::warn!("no webhook_url configured, alerts go to the log only");
            Arc::new(LogTransport)
        }
    };

    let store = Arc::new(Mutex::new(AudioBufferStore::new(
        config.buffers.max_buffer_bytes,
    )));
    let ingress_state = IngressState::new(Arc::clone(&store));
    let synth: Arc<dyn SpeechSynth> = Arc::new(ingress_state.speaker_handle());

    // no loadable transcription model means nothing downstream can work
    let selector = ModelTierSelector::init(
        config.tier.clone(),
        Arc::clone(&transcriber),
        Box::new(SystemLoadSampler::new()),
    )
    .await?;
    let tier = selector.handle();

    let panics = PanicTaskManager::new(Arc::clone(&transport), config.panic.clone());
    let events = EventBoard::new(Arc::clone(&transport), Arc::clone(&synth));

    let pipeline = CommandPipeline::new(
        transcriber,
        classifier,
        transport,
        synth,
        tier,
        Arc::clone(&panics),
        Arc::clone(&events),
        config.wake.clone(),
        config.intent.clone(),
    );

    let flow = Arc::new(Mutex::new(Flow::new(
        WakeWatch::new(config.wake.hold_buffer_time),
        RetryLedger::new(config.retry.clone()),
    )));

    let scheduler = SessionScheduler::new(
        store,
        flow,
        pipeline,
        events,
        config.buffers.clone(),
        config.wake.clone(),
    );

    tokio::spawn(selector.run());
    tokio::spawn(scheduler.run());

    tokio::select! {
        result = ingress::serve(config.listen_port, ingress_state) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
