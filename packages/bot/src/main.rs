//! Console entry point: lines on stdin are messages from the authorized
//! user, replies go to stdout, logs to stderr.

use bot::{BotConfig, ConsoleTransport, ImageBot, IncomingMessage, ProcessBackend};
use request_queue::RequestQueue;
use storage::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = BotConfig::from_env()?;
    if config.bot_token.is_none() {
        tracing::info!("BOT_TOKEN not set, using the console transport");
    }

    let storage = Storage::new(config.storage.clone())?;
    let backend = ProcessBackend::new(config.require_generator_command()?, &config)?;
    let (queue, worker) = RequestQueue::start().await?;
    let bot = ImageBot::new(&config, ConsoleTransport::new(), backend, queue.clone(), storage);

    tracing::info!("Bot started, waiting for messages");

    let mut handlers = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        while handlers.try_join_next().is_some() {}

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else {
            tracing::info!("Input closed, finishing queued requests");
            while handlers.join_next().await.is_some() {}
            queue.join().await;
            break;
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let message = IncomingMessage {
            user: config.allowed_user_id,
            id: bot.transport().next_message_id(),
            text: text.to_string(),
        };

        // Handlers run concurrently; generation itself is serialized by the queue.
        let bot = bot.clone();
        handlers.spawn(async move {
            if let Err(e) = bot.handle_message(message).await {
                tracing::error!("Error while handling a message: {}", e);
            }
        });
    }

    queue.shutdown();
    worker.wait().await;
    Ok(())
}
