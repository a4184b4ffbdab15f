use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{watch, Mutex};
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use twod::adapters::{
    BlockTextExtractor, DryRunChannel, HttpResultSource, MessagingApi, ResultSource,
    TelegramClient,
};
use twod::cli::{self, Cli, Commands};
use twod::config::AppConfig;
use twod::domain::ChatId;
use twod::engine::{Clock, EngineConfig, ResultEngine, SystemClock};
use twod::services::{
    run_polling, CommandHandler, Metrics, Publisher, Scheduler, WebhookServer, WebhookState,
    WEBHOOK_PATH,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match AppConfig::load_from(&cli.config_dir) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", false);
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config.logging.level, config.logging.json);

    match cli.command {
        Some(Commands::Check) => {
            let clock = system_clock(&config)?;
            let source = build_source(&config)?;
            cli::check_source(&config, &source, &clock).await?;
        }
        Some(Commands::Run) | None => {
            if let Err(errors) = config.validate() {
                for e in &errors {
                    error!("Invalid configuration: {}", e);
                }
                std::process::exit(1);
            }
            run_bot(config, cli.dry_run).await?;
        }
    }

    Ok(())
}

async fn run_bot(config: AppConfig, dry_run: bool) -> anyhow::Result<()> {
    info!(
        channel = %config.telegram.channel_id,
        source = %config.source.url,
        live_mode = ?config.telegram.live_mode,
        dry_run,
        "Starting 2D relay bot"
    );

    let clock: Arc<dyn Clock> = Arc::new(system_clock(&config)?);
    let metrics = Arc::new(Metrics::new());

    let telegram = TelegramClient::new(
        &config.telegram.api_base_url,
        &config.telegram.bot_token,
        Duration::from_secs(config.telegram.request_timeout_secs),
    )?;
    let api: Arc<dyn MessagingApi> = if dry_run {
        warn!("Dry run: channel operations are logged, not sent");
        Arc::new(DryRunChannel::new())
    } else {
        Arc::new(telegram.clone())
    };

    let publisher = Publisher::new(
        Arc::clone(&api),
        ChatId::from(config.telegram.channel_id.as_str()),
        config.telegram.live_mode,
    );
    let engine = Arc::new(Mutex::new(ResultEngine::new(
        EngineConfig::from_app(&config)?,
        publisher,
        Arc::clone(&metrics),
    )));
    let source: Arc<dyn ResultSource> = Arc::new(build_source(&config)?);

    let bot_username = match telegram.get_me().await {
        Ok(me) => {
            info!(id = me.id, username = ?me.username, "Bot account verified");
            me.username
        }
        Err(e) => {
            warn!("getMe failed, continuing: {}", e);
            None
        }
    };

    let handler = Arc::new(
        CommandHandler::new(
            Arc::clone(&api),
            Arc::clone(&engine),
            Arc::clone(&source),
            Arc::clone(&clock),
            Arc::clone(&metrics),
            config.telegram.admin_id,
        )
        .with_bot_username(bot_username),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Command delivery: webhook when reachable from outside, long polling otherwise
    let webhook_handler = match &config.telegram.public_base_url {
        Some(base) => {
            let url = format!("{}{}", base.trim_end_matches('/'), WEBHOOK_PATH);
            telegram
                .set_webhook(&url, config.telegram.webhook_secret.as_deref())
                .await
                .context("failed to register webhook")?;
            Some(Arc::clone(&handler))
        }
        None => None,
    };

    let polling_handle = if webhook_handler.is_none() {
        if let Err(e) = telegram.delete_webhook().await {
            warn!("deleteWebhook failed: {}", e);
        }
        Some(tokio::spawn(run_polling(
            telegram.clone(),
            Arc::clone(&handler),
            shutdown_rx.clone(),
        )))
    } else {
        None
    };

    let server = WebhookServer::new(
        Arc::new(WebhookState::new(
            webhook_handler,
            config.telegram.webhook_secret.clone(),
        )),
        config.server.port,
    );
    let server_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!("HTTP server error: {}", e);
            }
        })
    };

    let scheduler = Scheduler::new(
        engine,
        source,
        clock,
        Arc::clone(&metrics),
        Duration::from_secs(config.schedule.poll_interval_secs),
        Duration::from_secs(config.schedule.housekeeping_interval_secs),
        Duration::from_secs(config.schedule.fetch_error_cooldown_secs),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    info!("Bot is running. Press Ctrl+C to stop.");
    shutdown_signal().await;

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    if let Some(handle) = polling_handle {
        let _ = handle.await;
    }
    let _ = server_handle.await;

    info!("{}", metrics.summary());
    info!("Shutdown complete");
    Ok(())
}

fn system_clock(config: &AppConfig) -> anyhow::Result<SystemClock> {
    SystemClock::new(config.schedule.utc_offset_minutes).with_context(|| {
        format!(
            "utc_offset_minutes out of range: {}",
            config.schedule.utc_offset_minutes
        )
    })
}

fn build_source(config: &AppConfig) -> twod::Result<HttpResultSource> {
    let extractor = BlockTextExtractor::new(
        &config.sessions.morning.final_label,
        &config.sessions.evening.final_label,
    )?;
    HttpResultSource::new(
        &config.source.url,
        &config.source.user_agent,
        Duration::from_secs(config.source.timeout_secs),
        Box::new(extractor),
    )
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,twod={},hyper=warn", level)));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
