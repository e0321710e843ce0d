use std::time::Duration;

use adk_stream::pipeline::{self, PipelineEvent};
use adk_stream::utils::NoMedia;
use adk_stream::{Client, Config};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about = "Send one text message and print what comes back")]
struct Args {
    /// Agent base URL; defaults to ADK_STREAM_BASE_URL or http://localhost:8000
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long, default_value = "Hello!")]
    message: String,
    /// Seconds to wait for the reply
    #[arg(long, default_value_t = 10)]
    wait: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let mut builder = Config::builder();
    if let Some(base_url) = args.base_url.as_deref() {
        builder = builder.with_base_url(base_url);
    }
    let client = Client::new(builder.build());
    println!("session: {}", client.session_id());

    let mut handle = pipeline::spawn(client, NoMedia);
    handle.submit_text(args.message).await?;

    let deadline = tokio::time::sleep(Duration::from_secs(args.wait));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(PipelineEvent::MessageUpdated(message)) | Some(PipelineEvent::MessageStarted(message)) => {
                    println!("{:?}: {}", message.role(), message.text());
                }
                Some(event) => println!("{:?}", event),
                None => break,
            },
            _ = &mut deadline => break,
        }
    }

    handle.shutdown().await;
    Ok(())
}
