//! wxrelay Consumer
//!
//! Drains one broker queue and forwards each weather payload to an HTTP sink,
//! acknowledging only after the sink accepted it.

use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use wxrelay_consumer::{
    BrokerSession, HttpSink, MessageHandler, Overrides, Profile, RelayConsumer,
};
use wxrelay_core::{BootRetry, BrokerSettings};

#[derive(Parser, Debug)]
#[command(name = "wxrelay-consumer")]
#[command(version, about = "wxrelay consumer - broker queue to HTTP sink relay")]
struct Args {
    /// Preset topology and sink settings
    #[arg(long, value_enum, default_value_t = Profile::Augment, env = "WXRELAY_PROFILE")]
    profile: Profile,

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
    #[arg(long, env = "WXRELAY_EXCHANGE")]
    exchange: Option<String>,

    /// Queue to consume from. `RABBITMQ_QUEUE` is not read here: legacy
    /// deployments use it for the producer's routing key.
    #[arg(long, env = "WXRELAY_QUEUE")]
    queue: Option<String>,

    /// Routing key binding the queue to the exchange
    #[arg(long, env = "WXRELAY_ROUTING_KEY")]
    routing_key: Option<String>,

    /// AMQP consumer tag
    #[arg(long, env = "WXRELAY_CONSUMER_TAG")]
    consumer_tag: Option<String>,

    /// Maximum unacknowledged deliveries in flight (0 = unbounded)
    #[arg(long, env = "WXRELAY_PREFETCH")]
    prefetch: Option<u16>,

    /// Downstream HTTP endpoint receiving forwarded payloads
    #[arg(long, env = "NEST_API_URL")]
    sink_url: Option<String>,

    /// Sink request timeout in seconds
    #[arg(long, env = "WXRELAY_SINK_TIMEOUT_SECS")]
    sink_timeout_secs: Option<u64>,

    /// Value written into `processed_by` (empty disables augmentation)
    #[arg(long, env = "WXRELAY_PROCESSED_BY")]
    processed_by: Option<String>,

    /// Field a payload must carry to be forwarded (empty disables validation)
    #[arg(long, env = "WXRELAY_REQUIRED_FIELD")]
    required_field: Option<String>,

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

    fn overrides(&self) -> Overrides {
        Overrides {
            exchange: self.exchange.clone(),
            queue: self.queue.clone(),
            routing_key: self.routing_key.clone(),
            consumer_tag: self.consumer_tag.clone(),
            prefetch: self.prefetch,
            sink_url: self.sink_url.clone(),
            sink_timeout: self.sink_timeout_secs.map(Duration::from_secs),
            processed_by: self.processed_by.clone(),
            required_field: self.required_field.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let log_filter = wxrelay_core::tracing_init::crate_filter("wxrelay_consumer", &args.log_level);
    wxrelay_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let url = args.broker().resolve()?;
    let settings = args.profile.settings().with_overrides(args.overrides());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = ?args.profile,
        queue = %settings.topology.queue,
        sink = %settings.sink_url,
        "Starting wxrelay-consumer"
    );

    let boot = BootRetry::new(args.boot_attempts, Duration::from_secs(args.boot_delay_secs));
    let session = BrokerSession::connect(&url, &settings.topology, boot).await?;
    info!(connected = session.is_connected(), "Connected to broker");

    let sink = HttpSink::new(settings.sink_url.clone(), settings.sink_timeout)?;
    let handler = MessageHandler::new(
        sink,
        settings.processed_by.clone(),
        settings.required_field.clone(),
    );
    let consumer = RelayConsumer::new(session, settings, handler);

    let result = tokio::select! {
        result = consumer.start() => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            None
        }
    };

    consumer.close().await;

    match result {
        None => {
            info!("Consumer stopped");
            Ok(())
        }
        Some(Ok(stats)) => {
            warn!(
                acked = stats.acked,
                rejected = stats.rejected,
                requeued = stats.requeued,
                "Delivery stream closed by broker"
            );
            anyhow::bail!("delivery stream closed by broker")
        }
        Some(Err(e)) => Err(e.into()),
    }
}
