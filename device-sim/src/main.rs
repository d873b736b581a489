use anyhow::Context;
use clap::Parser;
use cmdbridge::supervisor::shutdown::wait_for_shutdown_signal;
use cmdbridge::transport::{MqttTransport, Transport};
use cmdbridge::BrokerConfig;
use cmdbridge_shared::Device;
use device_sim::SimulatedNode;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "device-sim", about = "Answer bridge commands like a sensor node would")]
struct Cli {
    /// Broker host
    #[arg(long, env = "CMDBRIDGE_BROKER", default_value = "localhost")]
    broker: String,

    /// Broker port
    #[arg(long, env = "CMDBRIDGE_PORT", default_value_t = 1883)]
    port: u16,

    /// Device id to simulate, repeatable
    #[arg(long = "device", env = "CMDBRIDGE_DEVICES", value_delimiter = ',', required = true)]
    devices: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = BrokerConfig {
        host: cli.broker,
        port: cli.port,
        client_id: format!("device-sim-{}", &cmdbridge_shared::new_correlation_id()[..8]),
        ..Default::default()
    };

    let transport: Arc<dyn Transport> = Arc::new(
        MqttTransport::connect(&config)
            .await
            .with_context(|| format!("Failed to connect to {}", config.address()))?,
    );
    info!("Device simulator connected to {}", config.address());

    let cancel = CancellationToken::new();
    let mut nodes = JoinSet::new();
    for id in &cli.devices {
        let node = SimulatedNode::new(Device::new(id.as_str()).with_context(|| format!("Invalid device id {id:?}"))?);
        let transport = transport.clone();
        let cancel = cancel.child_token();
        nodes.spawn(async move {
            let id = node.device().id().to_string();
            (id, node.run(transport, cancel).await)
        });
    }

    tokio::select! {
        signal = wait_for_shutdown_signal() => {
            if let Err(e) = signal {
                warn!("Failed to install signal handlers: {}", e);
            }
            info!("Shutting down");
        }
        // Nodes only stop on their own when the connection goes away
        Some(joined) = nodes.join_next() => {
            match joined {
                Ok((id, Ok(answered))) => warn!("  {}: stopped after {} requests", id, answered),
                Ok((id, Err(e))) => error!("  {}: {}", id, e),
                Err(e) => error!("Node task failed: {}", e),
            }
        }
    }
    cancel.cancel();

    while let Some(joined) = nodes.join_next().await {
        match joined {
            Ok((id, Ok(answered))) => info!("  {}: answered {} requests", id, answered),
            Ok((id, Err(e))) => error!("  {}: {}", id, e),
            Err(e) => error!("Node task failed: {}", e),
        }
    }

    transport.disconnect().await?;
    Ok(())
}
