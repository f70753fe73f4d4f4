// # domwatchd - domwatch batch runner
//
// This binary is a THIN integration layer. All detection, write-back and
// notification logic lives in domwatch-core.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the store, the fetcher and the subscribers
// 4. Running the monitor engine once over every active domain
//
// Scheduling is left to cron or a systemd timer.
//
// ## Configuration
//
// ### Store
// - `DOMWATCH_STORE_TYPE`: postgres (default) or file
// - `DATABASE_URL`: full connection URL (overrides the DB_* variables)
// - `DB_USER`, `DB_PASSWORD`, `DB_HOST`, `DB_NAME`: connection pieces
// - `DB_SSLMODE`: sslmode parameter (default: disable)
// - `DOMWATCH_STATE_PATH`: state file (for the file store)
//
// ### Notifications
// - `SMTP_HOST`, `SMTP_PORT` (default 587), `SMTP_USER`, `SMTP_PASSWORD`
// - `FROM_EMAIL`, `TO_EMAIL` (comma-separated)
// - `DOMWATCH_SMTP_STARTTLS`: true (default) or false
// - `DOMWATCH_WEBHOOK_URL`: endpoint receiving event JSON
//
// When no channel is configured, changes are written to the log.
//
// ### Lookups and engine
// - `DOMWATCH_DNS_UPSTREAM`: cloudflare (default), google or quad9
// - `DOMWATCH_WHOIS_SERVER`: referral server (default: whois.iana.org)
// - `DOMWATCH_MAX_CONCURRENCY`: domains processed at once (default 8)
// - `DOMWATCH_FETCH_TIMEOUT_SECS`: per-lookup bound (default 10)
// - `DOMWATCH_KEEP_LAST_KNOWN`: keep stored values when a lookup fails
// - `DOMWATCH_LOG_LEVEL`: trace, debug, info (default), warn or error
//
// ## Example
//
// ```bash
// export DB_USER=domwatch DB_PASSWORD=secret DB_HOST=db.internal DB_NAME=domains
// export SMTP_HOST=smtp.example.com SMTP_USER=alerts SMTP_PASSWORD=secret
// export FROM_EMAIL=domwatch@example.com TO_EMAIL=secops@example.com
//
// domwatchd
// ```

use anyhow::{Context, Result};
use domwatch_core::config::{
    DnsUpstream, EngineConfig, FetchFailurePolicy, FetcherConfig, NotifierConfig, SmtpConfig,
    StoreConfig, WatchConfig,
};
use domwatch_core::{
    FileSnapshotStore, LogSubscriber, MemorySnapshotStore, MonitorEngine, NotificationDispatcher,
    RunReport, SnapshotStore,
};
use domwatch_fetch::HickoryFactFetcher;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use url::Url;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Run completed (even if some domains failed)
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DomwatchExitCode {
    /// Run completed
    Completed = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DomwatchExitCode> for ExitCode {
    fn from(code: DomwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration, as read from the environment
struct Config {
    store_type: String,
    database_url: Option<String>,
    db_user: Option<String>,
    db_password: Option<String>,
    db_host: Option<String>,
    db_name: Option<String>,
    db_sslmode: String,
    state_path: Option<String>,
    smtp_host: Option<String>,
    smtp_port: u16,
    smtp_user: String,
    smtp_password: String,
    smtp_starttls: bool,
    from_email: Option<String>,
    to_email: Vec<String>,
    webhook_url: Option<String>,
    dns_upstream: DnsUpstream,
    whois_server: Option<String>,
    max_concurrency: Option<usize>,
    fetch_timeout_secs: Option<u64>,
    keep_last_known: bool,
    log_level: String,
}

// Custom Debug implementation that hides the passwords
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("store_type", &self.store_type)
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .field("db_user", &self.db_user)
            .field("db_password", &"<REDACTED>")
            .field("db_host", &self.db_host)
            .field("db_name", &self.db_name)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_password", &"<REDACTED>")
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "<REDACTED>"))
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            store_type: var("DOMWATCH_STORE_TYPE").unwrap_or_else(|| "postgres".to_string()),
            database_url: var("DATABASE_URL"),
            db_user: var("DB_USER"),
            db_password: lookup("DB_PASSWORD"),
            db_host: var("DB_HOST"),
            db_name: var("DB_NAME"),
            db_sslmode: var("DB_SSLMODE").unwrap_or_else(|| "disable".to_string()),
            state_path: var("DOMWATCH_STATE_PATH"),
            smtp_host: var("SMTP_HOST"),
            smtp_port: parse_var(&var, "SMTP_PORT")?.unwrap_or(587),
            smtp_user: var("SMTP_USER").unwrap_or_default(),
            smtp_password: lookup("SMTP_PASSWORD").unwrap_or_default(),
            smtp_starttls: parse_flag(&var, "DOMWATCH_SMTP_STARTTLS")?.unwrap_or(true),
            from_email: var("FROM_EMAIL"),
            to_email: var("TO_EMAIL")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            webhook_url: var("DOMWATCH_WEBHOOK_URL"),
            dns_upstream: match var("DOMWATCH_DNS_UPSTREAM") {
                Some(value) => value.parse()?,
                None => DnsUpstream::default(),
            },
            whois_server: var("DOMWATCH_WHOIS_SERVER"),
            max_concurrency: parse_var(&var, "DOMWATCH_MAX_CONCURRENCY")?,
            fetch_timeout_secs: parse_var(&var, "DOMWATCH_FETCH_TIMEOUT_SECS")?,
            keep_last_known: parse_flag(&var, "DOMWATCH_KEEP_LAST_KNOWN")?.unwrap_or(false),
            log_level: var("DOMWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "postgres" => {
                if self.database_url.is_none() {
                    for (key, value) in [
                        ("DB_USER", &self.db_user),
                        ("DB_HOST", &self.db_host),
                        ("DB_NAME", &self.db_name),
                    ] {
                        if value.is_none() {
                            anyhow::bail!(
                                "{} is required when DOMWATCH_STORE_TYPE=postgres \
                                and DATABASE_URL is not set",
                                key
                            );
                        }
                    }
                }
            }
            "file" => {
                if self.state_path.is_none() {
                    anyhow::bail!(
                        "DOMWATCH_STATE_PATH is required when DOMWATCH_STORE_TYPE=file. \
                        Set it via: export DOMWATCH_STATE_PATH=/var/lib/domwatch/state.json"
                    );
                }
            }
            other => anyhow::bail!(
                "DOMWATCH_STORE_TYPE '{}' is not supported. \
                Supported types: postgres, file",
                other
            ),
        }

        if self.smtp_host.is_some() {
            if self.from_email.is_none() {
                anyhow::bail!("FROM_EMAIL is required when SMTP_HOST is set");
            }
            if self.to_email.is_empty() {
                anyhow::bail!("TO_EMAIL is required when SMTP_HOST is set");
            }
        }

        if let Some(max) = self.max_concurrency.filter(|max| !(1..=256).contains(max)) {
            anyhow::bail!(
                "DOMWATCH_MAX_CONCURRENCY must be between 1 and 256. Got: {}",
                max
            );
        }

        if let Some(timeout) = self
            .fetch_timeout_secs
            .filter(|timeout| !(1..=300).contains(timeout))
        {
            anyhow::bail!(
                "DOMWATCH_FETCH_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                timeout
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DOMWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// PostgreSQL connection URL
    fn database_url(&self) -> Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }

        let host = self.db_host.as_deref().unwrap_or_default();
        let mut url = Url::parse(&format!("postgres://{}", host))
            .with_context(|| format!("DB_HOST '{}' is not a valid host", host))?;
        url.set_username(self.db_user.as_deref().unwrap_or_default())
            .map_err(|_| anyhow::anyhow!("DB_USER cannot be set on the connection URL"))?;
        url.set_password(self.db_password.as_deref())
            .map_err(|_| anyhow::anyhow!("DB_PASSWORD cannot be set on the connection URL"))?;
        url.set_path(&format!("/{}", self.db_name.as_deref().unwrap_or_default()));
        url.query_pairs_mut().append_pair("sslmode", &self.db_sslmode);

        Ok(url.into())
    }

    /// Translate into the library configuration
    fn to_watch_config(&self) -> Result<WatchConfig> {
        let store = match self.store_type.as_str() {
            "file" => StoreConfig::File {
                path: self.state_path.clone().unwrap_or_default(),
            },
            _ => StoreConfig::Postgres {
                url: self.database_url()?,
                max_connections: StoreConfig::DEFAULT_MAX_CONNECTIONS,
            },
        };

        let mut fetcher = FetcherConfig {
            upstream: self.dns_upstream,
            ..FetcherConfig::default()
        };
        if let Some(server) = &self.whois_server {
            fetcher.whois_server = server.clone();
        }

        let mut notifiers = Vec::new();
        if let Some(host) = &self.smtp_host {
            notifiers.push(NotifierConfig::Smtp(SmtpConfig {
                host: host.clone(),
                port: self.smtp_port,
                username: self.smtp_user.clone(),
                password: self.smtp_password.clone(),
                from: self.from_email.clone().unwrap_or_default(),
                to: self.to_email.clone(),
                starttls: self.smtp_starttls,
            }));
        }
        if let Some(url) = &self.webhook_url {
            notifiers.push(NotifierConfig::Webhook { url: url.clone() });
        }

        let mut engine = EngineConfig::default();
        if let Some(max) = self.max_concurrency {
            engine.max_concurrency = max;
        }
        if let Some(timeout) = self.fetch_timeout_secs {
            engine.fetch_timeout_secs = timeout;
        }
        if self.keep_last_known {
            engine.fetch_failure_policy = FetchFailurePolicy::KeepLastKnown;
        }

        Ok(WatchConfig {
            store,
            fetcher,
            notifiers,
            engine,
        })
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("{} has an invalid value: '{}'", key, raw))
        })
        .transpose()
}

fn parse_flag(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    var(key)
        .map(|raw| match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{} must be true or false. Got: '{}'", key, raw),
        })
        .transpose()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DomwatchExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DomwatchExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DomwatchExitCode::ConfigError.into();
    }

    let watch_config = match config.to_watch_config() {
        Ok(watch_config) => watch_config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return DomwatchExitCode::ConfigError.into();
        }
    };
    if let Err(e) = watch_config.validate() {
        error!("Configuration validation error: {}", e);
        return DomwatchExitCode::ConfigError.into();
    }

    info!("Starting domwatchd");
    info!(
        "Store: {}, notifiers: {}",
        watch_config.store.type_name(),
        watch_config.notifiers.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DomwatchExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(watch_config)).into()
}

/// Build the components and run one pass
async fn run_daemon(config: WatchConfig) -> DomwatchExitCode {
    let engine = match build_engine(&config).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return DomwatchExitCode::ConfigError;
        }
    };

    tokio::select! {
        result = engine.run_once() => match result {
            Ok(report) => {
                log_report(&report);
                DomwatchExitCode::Completed
            }
            Err(e) => {
                error!("Run failed: {}", e);
                DomwatchExitCode::RuntimeError
            }
        },

        signal = wait_for_shutdown() => {
            match signal {
                Ok(name) => warn!("Received {}, run interrupted", name),
                Err(e) => error!("Signal handling failed: {:#}", e),
            }
            DomwatchExitCode::RuntimeError
        }
    }
}

async fn build_engine(config: &WatchConfig) -> Result<MonitorEngine> {
    let store = build_store(&config.store).await?;
    let fetcher =
        HickoryFactFetcher::new(&config.fetcher).context("Failed to initialize the fetcher")?;

    let dispatcher = NotificationDispatcher::new();
    for notifier in &config.notifiers {
        register_notifier(&dispatcher, notifier)?;
    }
    if dispatcher.is_empty() {
        info!("No notification channel configured, changes go to the log");
        dispatcher.register(Arc::new(LogSubscriber));
    }

    MonitorEngine::new(
        Arc::new(fetcher),
        store,
        Arc::new(dispatcher),
        config.engine.clone(),
    )
    .context("Failed to build the engine")
}

async fn build_store(config: &StoreConfig) -> Result<Arc<dyn SnapshotStore>> {
    match config {
        #[cfg(feature = "postgres")]
        StoreConfig::Postgres {
            url,
            max_connections,
        } => {
            let store =
                domwatch_store_postgres::PostgresSnapshotStore::connect(url, *max_connections)
                    .await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreConfig::Postgres { .. } => {
            anyhow::bail!("PostgreSQL support is not compiled in (enable the 'postgres' feature)")
        }
        StoreConfig::File { path } => {
            info!("Using state file {}", path);
            Ok(Arc::new(FileSnapshotStore::new(path).await?))
        }
        StoreConfig::Memory => {
            warn!("Memory store holds no domains unless seeded; nothing will be checked");
            Ok(Arc::new(MemorySnapshotStore::new()))
        }
    }
}

fn register_notifier(dispatcher: &NotificationDispatcher, config: &NotifierConfig) -> Result<()> {
    match config {
        #[cfg(feature = "smtp")]
        NotifierConfig::Smtp(smtp) => {
            let subscriber = domwatch_notify_smtp::SmtpSubscriber::new(smtp)?;
            info!("Registering SMTP notifications via {}", smtp.host);
            dispatcher.register(Arc::new(subscriber));
        }
        #[cfg(feature = "webhook")]
        NotifierConfig::Webhook { .. } => {
            let subscriber = domwatch_notify_webhook::WebhookSubscriber::from_config(config)?;
            info!("Registering webhook notifications");
            dispatcher.register(Arc::new(subscriber));
        }
        #[allow(unreachable_patterns)]
        other => anyhow::bail!(
            "Notifier '{}' is not compiled in (enable the '{}' feature)",
            other.type_name(),
            other.type_name()
        ),
    }
    Ok(())
}

fn log_report(report: &RunReport) {
    info!(
        "Checked {} domains: {} new, {} unchanged, {} changed",
        report.domains_checked, report.first_observations, report.unchanged, report.changed
    );
    info!(
        "Dispatched {} events ({} delivery failures), {} write failures",
        report.events_dispatched, report.notification_failures, report.write_failures
    );
    for (domain, reason) in &report.failed_domains {
        warn!("Domain {} failed: {}", domain, reason);
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for CTRL-C")?;
    Ok("SIGINT")
}
