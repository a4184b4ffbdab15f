use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::adapters::{DryRunChannel, ResultSource};
use crate::config::AppConfig;
use crate::domain::{ChatId, Session};
use crate::engine::{Clock, Decision, EngineConfig, ResultEngine};
use crate::error::Result;
use crate::services::{Metrics, Publisher};

#[derive(Parser)]
#[command(name = "twod")]
#[command(version)]
#[command(about = "Relays live and final 2D results to a Telegram channel", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and environment overrides
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: String,

    /// Log channel operations instead of sending them
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot (default)
    Run,
    /// Fetch the result page once and show what would be announced now
    Check,
}

/// One fetch and extraction, printed with the engine's decision for each session
pub async fn check_source(
    config: &AppConfig,
    source: &dyn ResultSource,
    clock: &dyn Clock,
) -> Result<()> {
    let results = source.fetch_results().await?;
    let now = clock.now();

    // A fresh engine: decisions as if nothing was announced yet today
    let publisher = Publisher::new(
        Arc::new(DryRunChannel::new()),
        ChatId::from(config.telegram.channel_id.as_str()),
        config.telegram.live_mode,
    );
    let engine = ResultEngine::new(
        EngineConfig::from_app(config)?,
        publisher,
        Arc::new(Metrics::new()),
    );

    println!("Source: {}", config.source.url);
    println!("Local time: {}", now.format("%Y-%m-%d %H:%M:%S"));
    for session in Session::ALL {
        let candidate = results.get(session);
        println!();
        println!("[{}]", session);
        println!("  number:     {}", candidate.number.as_deref().unwrap_or("-"));
        println!("  set:        {}", candidate.set_or_placeholder());
        println!("  value:      {}", candidate.value_or_placeholder());
        println!(
            "  label:      {}",
            candidate.timestamp_label.as_deref().unwrap_or("-")
        );
        println!("  final mark: {}", candidate.final_marker);
        let decision = match engine.decide(session, candidate, &now) {
            Decision::Skip(reason) => format!("skip ({})", reason.as_str()),
            Decision::PostLive { key } => format!("post live {}", key),
            Decision::PostFinal => "post final".to_string(),
        };
        println!("  decision:   {}", decision);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ScriptedSource;
    use crate::domain::{Candidate, ExtractedResults};
    use crate::engine::ManualClock;
    use crate::error::TwodError;
    use chrono::NaiveDate;

    #[test]
    fn test_run_is_the_default_command() {
        let cli = Cli::parse_from(["twod"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config_dir, "config");
        assert!(!cli.dry_run);

        let cli = Cli::parse_from(["twod", "check", "--config-dir", "/etc/twod"]);
        assert!(matches!(cli.command, Some(Commands::Check)));
        assert_eq!(cli.config_dir, "/etc/twod");
    }

    #[tokio::test]
    async fn test_check_reports_fetch_failure() {
        let config = AppConfig::from_toml_str(
            "[telegram]\nbot_token = \"123:abc\"\nchannel_id = \"@twod_results\"",
        )
        .unwrap();
        let source = ScriptedSource::new(ExtractedResults::both(Candidate::live("82")));
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 10, 16)
                .unwrap()
                .and_hms_opt(11, 10, 0)
                .unwrap(),
        );

        assert!(check_source(&config, &source, &clock).await.is_ok());

        source.fail("HTTP 503");
        let err = check_source(&config, &source, &clock).await.unwrap_err();
        assert!(matches!(err, TwodError::Fetch(_)));
    }
}
