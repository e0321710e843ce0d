use std::io::Write;

use adk_stream::pipeline::{self, PipelineEvent};
use adk_stream::utils::device::CpalBackend;
use adk_stream::{Client, Config, Role};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Talk to an agent by text or voice")]
struct Args {
    /// Agent base URL; defaults to ADK_STREAM_BASE_URL or http://localhost:8000
    #[arg(long)]
    base_url: Option<String>,
    /// Input device name; the default device when omitted
    #[arg(long)]
    input: Option<String>,
    /// Output device name; the default device when omitted
    #[arg(long)]
    output: Option<String>,
    /// Start in audio mode
    #[arg(long)]
    audio: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Args::parse();
    let mut builder = Config::builder()
        .with_input_device(args.input)
        .with_output_device(args.output);
    if let Some(base_url) = args.base_url.as_deref() {
        builder = builder.with_base_url(base_url);
    }
    let config = builder.build();
    let backend = CpalBackend::new(
        config.input_device().map(str::to_string),
        config.output_device().map(str::to_string),
    );
    let client = Client::new(config);
    println!("session: {}", client.session_id());
    println!("type a message, /audio to talk, /text to stop talking, /quit to leave");

    let mut handle = pipeline::spawn(client, backend);
    if args.audio {
        handle.start_audio().await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "/quit" => break,
                    "/audio" => handle.start_audio().await?,
                    "/text" => handle.stop_audio().await?,
                    "" => {}
                    text => handle.submit_text(text).await?,
                }
            }
            event = handle.next_event() => match event {
                Some(PipelineEvent::MessageStarted(message)) if message.role() == Role::User => {}
                Some(PipelineEvent::MessageStarted(message)) => {
                    print!("\nAI: {}", message.text());
                    std::io::stdout().flush()?;
                }
                Some(PipelineEvent::MessageUpdated(message)) => {
                    print!("\rAI: {}", message.text());
                    std::io::stdout().flush()?;
                }
                Some(PipelineEvent::Notice(notice)) => println!("\n[{}]", notice),
                Some(PipelineEvent::MediaUnavailable(e)) => println!("\n[audio unavailable: {}]", e),
                Some(PipelineEvent::SendFailed { mime_type, reason }) => {
                    println!("\n[failed to send {}: {}]", mime_type.as_str(), reason)
                }
                Some(PipelineEvent::Status(_)) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Received Ctrl-C, shutting down...");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
