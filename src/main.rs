use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use cmdbridge::supervisor::shutdown::wait_for_shutdown_signal;
use cmdbridge::{BridgeConfig, Scenario, Session, TaskSupervisor};
use cmdbridge_shared::Device;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cmdbridge", about = "Send commands to sensor nodes over MQTT")]
struct Cli {
    /// Broker host
    #[arg(long, env = "CMDBRIDGE_BROKER", default_value = "localhost")]
    broker: String,

    /// Broker port
    #[arg(long, env = "CMDBRIDGE_PORT", default_value_t = 1883)]
    port: u16,

    /// Device id to address, repeatable
    #[arg(long = "device", env = "CMDBRIDGE_DEVICES", value_delimiter = ',', required = true)]
    devices: Vec<String>,

    /// Time cancelled tasks get to stop during teardown
    #[arg(long, env = "CMDBRIDGE_GRACE_MS", default_value_t = 5000)]
    grace_ms: u64,

    /// Give up on missing responses after this long; waits forever when unset
    #[arg(long, env = "CMDBRIDGE_RESPONSE_TIMEOUT_MS")]
    response_timeout_ms: Option<u64>,

    #[command(subcommand)]
    scenario: ScenarioArg,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ScenarioArg {
    /// Start an OTA update on every device
    Update,
    /// Blink the status LED of the first device
    Led,
    /// Run the alarm and sensor option sequence on the first device
    Alarms,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Update => Scenario::Update,
            ScenarioArg::Led => Scenario::Led,
            ScenarioArg::Alarms => Scenario::Alarms,
        }
    }
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(BridgeConfig, Scenario)> {
        let devices = self
            .devices
            .iter()
            .map(|id| Device::new(id.as_str()).with_context(|| format!("Invalid device id {id:?}")))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut config = BridgeConfig::new(devices);
        config.broker.host = self.broker;
        config.broker.port = self.port;
        config.grace_period = Duration::from_millis(self.grace_ms);
        config.response_timeout = self.response_timeout_ms.map(Duration::from_millis);

        Ok((config, self.scenario.into()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let (config, scenario) = Cli::parse().into_config()?;
    let devices = config.unique_devices();

    let Some(plan) = scenario.plan(&devices) else {
        bail!("No device to send {scenario} to");
    };
    let targets = plan.targets();

    info!("Command bridge starting: {}", scenario);
    info!("  Broker: {}", config.broker.address());
    for device in &targets {
        info!("  Device: {}", device);
    }

    let session = Session::open(&config.broker)
        .await
        .with_context(|| format!("Failed to connect to {}", config.broker.address()))?;

    let shutdown = async {
        if let Err(e) = wait_for_shutdown_signal().await {
            // Without signal handlers the run can only end on its own
            warn!("Failed to install signal handlers: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let report = TaskSupervisor::new(&config)
        .run(session, &targets, plan, scenario.expected_responses(), shutdown)
        .await;

    for summary in &report.listeners {
        info!(
            "  {}: {} responses, {} skipped, {} unmatched",
            summary.device, summary.observed, summary.skipped, summary.unmatched
        );
    }
    for failure in &report.cancellation_failures {
        warn!("  {}", failure);
    }
    for failure in &report.failures {
        error!("  {} failed: {}", failure.task, failure.error);
    }

    if let Some(fatal) = report.fatal_error() {
        bail!("Run aborted: {fatal}");
    }
    if report.interrupted {
        info!("Interrupted, shut down cleanly");
    } else if report.is_success() {
        info!("Done");
    }
    Ok(())
}
