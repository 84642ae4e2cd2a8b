//! Reports health checks moving between failing and passing.
//!
//! Run several instances for redundancy; only the one holding the lock
//! reports. Notifications go to a Slack webhook and/or mail.
//!
//! ```not_rust
//! health-watcher https://hooks.slack.com/services/XXX --consul-address 10.0.0.5:8500
//! ```

use anyhow::Context;
use clap::Parser;
use health_watcher::config::{self, Bootstrap};
use health_watcher::core::{ConsulClient, Logger, MailAlarm, Notifier, SlackAlarm, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "health-watcher", version, about)]
struct Cli {
    /// Slack incoming webhook URL
    webhook_url: Option<String>,

    /// Config file; defaults to the active profile of ./application.yml
    #[arg(long, env = "HEALTH_WATCHER_CONFIG")]
    config: Option<PathBuf>,

    /// slack channel name
    #[arg(long)]
    slack_channel: Option<String>,

    /// slack user name
    #[arg(long)]
    slack_username: Option<String>,

    /// slack user avatar url
    #[arg(long = "slack-icon")]
    slack_icon: Option<String>,

    /// address of the consul server
    #[arg(long)]
    consul_address: Option<String>,

    /// uri scheme of the consul server
    #[arg(long)]
    consul_scheme: Option<String>,

    /// datacenter to use
    #[arg(long)]
    consul_datacenter: Option<String>,

    /// ACL token
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    consul_token: Option<String>,

    /// poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
}

impl Cli {
    /// Flags win over the config file.
    fn apply(&self, config: &mut Bootstrap) {
        if let Some(v) = &self.webhook_url {
            config.slack.webhook_url = Some(v.clone());
        }
        if let Some(v) = &self.slack_channel {
            config.slack.channel = v.clone();
        }
        if let Some(v) = &self.slack_username {
            config.slack.username = v.clone();
        }
        if let Some(v) = &self.slack_icon {
            config.slack.icon_url = v.clone();
        }
        if let Some(v) = &self.consul_address {
            config.consul.address = v.clone();
        }
        if let Some(v) = &self.consul_scheme {
            config.consul.scheme = v.clone();
        }
        if let Some(v) = &self.consul_datacenter {
            config.consul.datacenter = v.clone();
        }
        if let Some(v) = &self.consul_token {
            config.consul.token = Some(v.clone());
        }
        if let Some(v) = self.interval_ms {
            config.watcher.interval_ms = v;
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "health_watcher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn alarms(config: &Bootstrap) -> anyhow::Result<Vec<Box<dyn Notifier>>> {
    let mut alarms: Vec<Box<dyn Notifier>> = Vec::new();
    if let Some(url) = &config.slack.webhook_url {
        alarms.push(Box::new(SlackAlarm::new(
            url.clone(),
            config.slack.channel.clone(),
            config.slack.username.clone(),
            config.slack.icon_url.clone(),
        )));
    }
    if let Some(mail) = &config.mail {
        let alarm = MailAlarm::new(
            mail.from.clone(),
            mail.to.clone(),
            mail.username.clone(),
            mail.password.clone(),
            &mail.relay,
        )
        .context("mail alarm")?;
        alarms.push(Box::new(alarm));
    }
    if alarms.is_empty() {
        tracing::warn!("no slack webhook or mail configured, transitions are only logged");
    }
    Ok(alarms)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut bootstrap = match &cli.config {
        Some(path) => config::load_config::<Bootstrap>(path)?,
        None => config::load_bootstrap_config(Path::new("."))?.unwrap_or_default(),
    };
    cli.apply(&mut bootstrap);
    bootstrap.validate()?;

    let logger = Logger::new(alarms(&bootstrap)?);
    let consul = ConsulClient::new(&bootstrap.consul.scheme, &bootstrap.consul.address)
        .with_datacenter(bootstrap.consul.datacenter.clone())
        .with_token(bootstrap.consul.token.clone())
        .with_timeout(Duration::from_millis(bootstrap.consul.timeout_ms));
    tracing::info!(consul = %consul.base_url(), "starting");

    let mut watcher = Watcher::new(Arc::new(consul), bootstrap.watcher_config());
    let stop = watcher.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            stop.stop();
        }
    });

    while let Some(batch) = watcher.next().await? {
        logger.log(&batch).await;
    }
    Ok(())
}
