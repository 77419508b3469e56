use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use microserver::devices::{LinkStatus, SimulatedSensor, StaticNetwork};
use microserver::pages::{self, Devices};
use microserver::{MiniJinjaEngine, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "microserver")]
#[command(about = "Embedded HTTP server for the sensor board", long_about = None)]
struct Args {
    /// TOML configuration file; defaults are used when it cannot be read
    #[arg(short, long, default_value = "microserver.toml")]
    config: PathBuf,

    /// Overrides the configured port
    #[arg(short, long)]
    port: Option<u16>,

    /// Overrides the configured static root
    #[arg(long)]
    static_root: Option<PathBuf>,
}

#[async_std::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "microserver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::from_file(&args.config);
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(root) = args.static_root {
        config.static_root = root;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "microserver starting");

    let devices = Arc::new(Devices {
        sensors: vec![
            Arc::new(SimulatedSensor::new("PIR motion", "events", vec![0.0, 1.0, 1.0, 2.0])),
            Arc::new(SimulatedSensor::new("Doppler radar", "events", vec![0.0, 0.0, 1.0])),
            Arc::new(SimulatedSensor::new("Temperature", "C", vec![21.4, 21.9, 22.3, 21.7])),
            Arc::new(SimulatedSensor::new("Humidity", "%", vec![41.0, 40.5, 42.2])),
            Arc::new(SimulatedSensor::new("Light", "lux", vec![310.0, 295.5, 402.0])),
        ],
        network: Arc::new(StaticNetwork::new(LinkStatus {
            connected: true,
            ip_address: config.address.to_string(),
            ssid: "microserver".to_string(),
        })),
        board_id: format!("{:08x}", std::process::id()),
    });

    let server = Server::builder(config)
        .routes(pages::routes(devices)?)
        .templates(MiniJinjaEngine::new())
        .bind()
        .await?;

    server.run().await?;
    Ok(())
}
