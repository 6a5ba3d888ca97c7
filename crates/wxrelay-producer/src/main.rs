//! wxrelay Producer
//!
//! Pulls weather readings from the upstream source on a fixed schedule and
//! publishes them as persistent messages to the shared topic exchange.

use std::time::Duration;

use clap::Parser;
use tracing::info;

use wxrelay_core::config::DEFAULT_EXCHANGE;
use wxrelay_core::retry::with_boot_retry;
use wxrelay_core::{BootRetry, BrokerSettings};
use wxrelay_producer::publisher::DEFAULT_ROUTING_KEY;
use wxrelay_producer::{AmqpTransport, Collector, Producer, WeatherClient};

#[derive(Parser, Debug)]
#[command(name = "wxrelay-producer")]
#[command(version, about = "wxrelay producer - weather readings to the broker")]
struct Args {
    /// Full AMQP URL (takes precedence over the discrete parts below)
    #[arg(long, env = "RABBITMQ_URL")]
    rabbitmq_url: Option<String>,

    /// Broker user
    #[arg(long, env = "RABBITMQ_USER")]
    rabbitmq_user: Option<String>,

    /// Broker password
    #[arg(long, env = "RABBITMQ_PASS", hide_env_values = true)]
    rabbitmq_pass: Option<String>,

    /// Broker host
    #[arg(long, env = "RABBITMQ_HOST")]
    rabbitmq_host: Option<String>,

    /// Broker port
    #[arg(long, env = "RABBITMQ_PORT")]
    rabbitmq_port: Option<u16>,

    /// Broker virtual host
    #[arg(long, env = "RABBITMQ_VHOST")]
    rabbitmq_vhost: Option<String>,

    /// Topic exchange name
    #[arg(long, default_value = DEFAULT_EXCHANGE, env = "WXRELAY_EXCHANGE")]
    exchange: String,

    /// Routing key for published readings
    #[arg(long, default_value = DEFAULT_ROUTING_KEY, env = "WXRELAY_ROUTING_KEY")]
    routing_key: String,

    /// Upstream weather endpoint
    #[arg(long, default_value = "http://python-producer:5000/weather", env = "PYTHON_API_URL")]
    upstream_url: String,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = 10, env = "WXRELAY_UPSTREAM_TIMEOUT_SECS")]
    upstream_timeout_secs: u64,

    /// Minutes between collection cycles
    #[arg(long, default_value_t = 60, env = "COLLECTION_INTERVAL_MINUTES")]
    interval_minutes: u64,

    /// Run a single collection cycle and exit
    #[arg(long)]
    once: bool,

    /// Initial broker connection attempts
    #[arg(long, default_value_t = 10, env = "WXRELAY_BOOT_ATTEMPTS")]
    boot_attempts: u32,

    /// Seconds between initial broker connection attempts
    #[arg(long, default_value_t = 5, env = "WXRELAY_BOOT_DELAY_SECS")]
    boot_delay_secs: u64,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "WXRELAY_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "WXRELAY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn broker(&self) -> BrokerSettings {
        BrokerSettings {
            url: self.rabbitmq_url.clone(),
            user: self.rabbitmq_user.clone(),
            pass: self.rabbitmq_pass.clone(),
            host: self.rabbitmq_host.clone(),
            port: self.rabbitmq_port,
            vhost: self.rabbitmq_vhost.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let log_filter = wxrelay_core::tracing_init::crate_filter("wxrelay_producer", &args.log_level);
    wxrelay_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let url = args.broker().resolve()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        exchange = %args.exchange,
        routing_key = %args.routing_key,
        upstream = %args.upstream_url,
        "Starting wxrelay-producer"
    );

    let boot = BootRetry::new(args.boot_attempts, Duration::from_secs(args.boot_delay_secs));
    let transport = with_boot_retry(boot, "broker", async || {
        AmqpTransport::connect(&url, &args.exchange).await
    })
    .await?;
    info!(connected = transport.is_connected(), "Broker session ready");

    let client = WeatherClient::new(
        args.upstream_url.clone(),
        Duration::from_secs(args.upstream_timeout_secs),
    )?;
    let producer = Producer::new(transport, args.exchange.clone(), args.routing_key.clone());
    let mut collector = Collector::new(client, producer);

    let result = if args.once {
        collector.collect_and_publish().await.map_err(anyhow::Error::from)
    } else {
        let period = Duration::from_secs(args.interval_minutes.saturating_mul(60).max(1));
        collector
            .run(period, async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Received shutdown signal");
            })
            .await;
        Ok(())
    };

    collector.close().await;
    info!("Producer stopped");
    result
}
