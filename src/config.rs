use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

use crate::domain::Session;
use crate::engine::{HourMinute, TimeWindow};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub sessions: SessionsConfig,
    /// Informational posts at fixed local times
    #[serde(default)]
    pub scheduled_posts: Vec<ScheduledPost>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token (required)
    #[serde(default)]
    pub bot_token: String,
    /// Destination channel: "@name" or numeric id (required)
    #[serde(default)]
    pub channel_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Sender allowed to run /force commands
    #[serde(default)]
    pub admin_id: Option<i64>,
    /// Public URL of this process; when set, updates arrive by webhook
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Expected X-Telegram-Bot-Api-Secret-Token on webhook calls
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub live_mode: LiveMode,
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout() -> u64 {
    20
}

/// How successive live values reach the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveMode {
    /// New message per change
    #[default]
    Post,
    /// Edit the session's last live message
    Edit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Result page to poll
    #[serde(default = "default_source_url")]
    pub url: String,
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_source_url() -> String {
    "https://mylucky2d3d.com/".to_string()
}

fn default_source_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120 Safari/537.36"
        .to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            timeout_secs: default_source_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Fast timer: fetch + engine tick
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Slow timer: daily reset + scheduled posts
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_secs: u64,
    /// Audience timezone as a fixed UTC offset (Asia/Yangon = 390)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
    /// Minimum gap between two logged fetch failures
    #[serde(default = "default_fetch_error_cooldown")]
    pub fetch_error_cooldown_secs: u64,
    /// How late a scheduled post may still go out
    #[serde(default = "default_post_grace")]
    pub scheduled_post_grace_mins: u32,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_housekeeping_interval() -> u64 {
    60
}

fn default_utc_offset() -> i32 {
    390
}

fn default_fetch_error_cooldown() -> u64 {
    120
}

fn default_post_grace() -> u32 {
    30
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            housekeeping_interval_secs: default_housekeeping_interval(),
            utc_offset_minutes: default_utc_offset(),
            fetch_error_cooldown_secs: default_fetch_error_cooldown(),
            scheduled_post_grace_mins: default_post_grace(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    pub morning: SessionConfig,
    pub evening: SessionConfig,
}

impl SessionsConfig {
    pub fn get(&self, session: Session) -> &SessionConfig {
        match session {
            Session::Morning => &self.morning,
            Session::Evening => &self.evening,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub window_start: HourMinute,
    pub window_end: HourMinute,
    /// From this time on a final-marked reading is trusted regardless of its label
    pub final_cutoff: HourMinute,
    /// Time label the page prints next to the official final
    pub final_label: String,
}

fn default_true() -> bool {
    true
}

impl SessionConfig {
    pub fn window(&self) -> Result<TimeWindow, String> {
        TimeWindow::new(self.window_start, self.window_end)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledPost {
    pub at: HourMinute,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Self::builder_with_defaults()?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TWOD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TWOD_TELEGRAM__BOT_TOKEN, etc.)
            .add_source(
                Environment::with_prefix("TWOD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // Plain deployment variables win over everything else
            .set_override_option("telegram.bot_token", env_opt("BOT_TOKEN"))?
            .set_override_option("telegram.channel_id", env_opt("CHANNEL_ID"))?
            .set_override_option("telegram.admin_id", env_opt("ADMIN_ID"))?
            .set_override_option("telegram.public_base_url", env_opt("PUBLIC_URL"))?
            .set_override_option("telegram.webhook_secret", env_opt("WEBHOOK_SECRET"))?
            .set_override_option("server.port", env_opt("PORT"))?;

        builder.build()?.try_deserialize()
    }

    /// Parse a TOML document on top of the built-in defaults
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::builder_with_defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("sessions.morning.window_start", "11:00")?
            .set_default("sessions.morning.window_end", "12:05")?
            .set_default("sessions.morning.final_cutoff", "12:01")?
            .set_default("sessions.morning.final_label", "12:01")?
            .set_default("sessions.evening.window_start", "15:00")?
            .set_default("sessions.evening.window_end", "16:35")?
            .set_default("sessions.evening.final_cutoff", "16:30")?
            .set_default("sessions.evening.final_label", "16:30")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.telegram.bot_token.trim().is_empty() {
            errors.push("telegram.bot_token (BOT_TOKEN) is required".to_string());
        }
        if self.telegram.channel_id.trim().is_empty() {
            errors.push("telegram.channel_id (CHANNEL_ID) is required".to_string());
        }
        if let Some(url) = &self.telegram.public_base_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                errors.push(format!("public_base_url must be an http(s) URL, got '{}'", url));
            }
        }

        for session in Session::ALL {
            let cfg = self.sessions.get(session);
            match cfg.window() {
                Ok(window) => {
                    if !window.contains_time(cfg.final_cutoff) {
                        errors.push(format!(
                            "{} final_cutoff {} is outside its window {}",
                            session, cfg.final_cutoff, window
                        ));
                    }
                }
                Err(e) => errors.push(format!("{} window: {}", session, e)),
            }
            if cfg.final_label.trim().is_empty() {
                errors.push(format!("{} final_label must not be empty", session));
            }
        }

        if self.schedule.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be positive".to_string());
        }
        if self.schedule.housekeeping_interval_secs == 0 {
            errors.push("housekeeping_interval_secs must be positive".to_string());
        }
        if self.source.timeout_secs == 0 {
            errors.push("source.timeout_secs must be positive".to_string());
        }
        if chrono::FixedOffset::east_opt(self.schedule.utc_offset_minutes * 60).is_none() {
            errors.push(format!(
                "utc_offset_minutes out of range: {}",
                self.schedule.utc_offset_minutes
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
