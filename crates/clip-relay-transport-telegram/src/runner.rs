use crate::bot;
use crate::bot::handlers::{Command, RelayContext};
use crate::config::BotSettings;
use anyhow::{Context, Result};
use clip_relay_core::media::resolver::resolver_from_settings;
use clip_relay_core::media::{MediaBackend, YtDlpBackend};
use clip_relay_core::{JobRunner, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

/// Extra time on top of the upload timeout for one HTTP request to the Bot API
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(60);

/// Run the Telegram transport runtime.
///
/// # Errors
///
/// Returns an error if the scratch directory or the bot client cannot be set up.
pub async fn run_bot(settings: Arc<BotSettings>) -> Result<()> {
    tokio::fs::create_dir_all(&settings.relay.download_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create download directory {}",
                settings.relay.download_dir.display()
            )
        })?;

    let backend = init_backend(&settings).await;
    let ctx = Arc::new(RelayContext {
        sessions: init_sessions(&settings),
        resolver: resolver_from_settings(&settings.relay, backend.clone()),
        runner: Arc::new(JobRunner::from_settings(&settings.relay, backend)),
        max_upload_bytes: settings.telegram.max_upload_bytes(),
    });
    info!(
        resolver = ctx.resolver.name(),
        workers = settings.relay.max_concurrent_jobs,
        "Job runner initialized."
    );

    let bot = init_bot(&settings)?;
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    let health_addr = settings.telegram.health_addr();
    tokio::spawn(async move {
        if let Err(e) = crate::health::serve(health_addr).await {
            error!("Liveness endpoint failed: {e:#}");
        }
    });

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx, settings])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn init_backend(settings: &BotSettings) -> Arc<dyn MediaBackend> {
    let backend = YtDlpBackend::new(
        settings.relay.ytdlp_path.clone(),
        settings.relay.audio_bitrate_kbps,
    );
    match backend.version().await {
        Ok(version) => info!(version = %version, "yt-dlp backend ready."),
        Err(e) => warn!(
            path = %settings.relay.ytdlp_path,
            error = %e,
            "yt-dlp is not usable; downloads will fail until it is installed"
        ),
    }
    Arc::new(backend)
}

fn init_sessions(settings: &BotSettings) -> SessionStore {
    info!(
        "Initializing SessionStore (ttl: {}s, max_size: {})",
        settings.relay.session_ttl_secs, settings.relay.session_max_capacity
    );
    SessionStore::from_settings(&settings.relay)
}

fn init_bot(settings: &BotSettings) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(settings.relay.upload_timeout() + HTTP_TIMEOUT_MARGIN)
        .build()
        .context("failed to build HTTP client")?;
    let mut bot = Bot::with_client(settings.telegram.bot_token.clone(), client);

    if let Some(url) = settings.telegram.bot_api_url()? {
        info!(api_url = %url, "Using self-hosted Bot API server");
        bot = bot.set_api_url(url);
    } else if settings.telegram.has_api_credentials() {
        warn!("API_ID/API_HASH are set but BOT_API_URL is not; they are only used by a self-hosted Bot API server");
    }

    Ok(bot)
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text),
                ),
        )
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Help => bot::handlers::help(bot, msg).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    ctx: Arc<RelayContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_link(bot, msg, ctx).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    ctx: Arc<RelayContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_choice(bot, q, ctx).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}
