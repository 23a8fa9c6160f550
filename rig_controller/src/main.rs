use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{info, warn};
use utilities::command_executor::PriorityExecutor;

pub mod command_executor;
pub mod config;
pub mod controller;
pub mod logging;
pub mod models;

use command_executor::{
    Channel, IDLE_WAIT,
    transport::{
        AcmdSender, AscLink, OfflineLink, SerialLink, TransactionJournal, TransportHandler,
        handshake,
    },
};
use config::{RigConfig, create_default_config, init_config};
use controller::{
    controller_service::ControllerService, fault_monitor::FaultMonitor, multi_axis::Axes,
    scan_thread::ScanTiming, single_axis::SingleAxis, state_monitor::FeedbackMonitor,
};
use models::{AxisId, CommandEnvelope, CommandError, CommandResponse, RigCommand, SharedState};

fn should_create_config() -> bool {
    std::env::var("CREATE_CONFIG")
        .map(|val| val == "1" || val.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Probe for the device; a failure of discovery or the handshake leaves the
/// controller in offline mode where every motion command is rejected.
fn open_link(config: &RigConfig) -> (Box<dyn AscLink>, bool) {
    let read_timeout = Duration::from_millis(config.serial.read_timeout_ms);

    match SerialLink::discover(config.serial.baud, read_timeout) {
        Ok(mut link) => match handshake(&mut link) {
            Ok(()) => (Box::new(link), true),
            Err(e) => {
                warn!("handshake failed: {e}");
                (Box::new(OfflineLink), false)
            }
        },
        Err(e) => {
            warn!("serial discovery failed: {e}");
            (Box::new(OfflineLink), false)
        }
    }
}

async fn send_command(
    command_tx: &mpsc::Sender<CommandEnvelope>,
    command: RigCommand,
) -> Result<CommandResponse, CommandError> {
    let (response, response_rx) = oneshot::channel();

    command_tx
        .send(CommandEnvelope { command, response })
        .await
        .map_err(|_| CommandError::new("controller service is gone"))?;

    response_rx
        .await
        .map_err(|_| CommandError::new("controller service dropped the command"))?
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    if should_create_config() {
        create_default_config(None::<PathBuf>)?;
    }

    let (_config_manager, config) = init_config().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Run with CREATE_CONFIG=1 to create a default configuration file.");
        e
    })?;

    let (link, online) = open_link(&config);

    let journal: Option<TransactionJournal> = config.serial.journal.then(|| {
        Arc::new(|channel: Channel, command: &str, response: &str| {
            info!(
                target: "transactions",
                channel = channel.label(),
                command,
                response = response.trim(),
            );
        }) as TransactionJournal
    });

    // Queue registration order on the executor is the channel priority.
    let mut executor = PriorityExecutor::new(TransportHandler::new(link, journal), IDLE_WAIT);
    let [control_cs, scan_cs, status_cs, feedback_cs] =
        Channel::PRIORITY.map(|channel| AcmdSender::new(channel, executor.add_queue()));

    let executor_task = if online {
        Some(executor.spawn())
    } else {
        // No device: drop the worker so every queued transaction fails fast.
        drop(executor);
        warn!("running in OFFLINE mode; motion commands will be rejected");
        None
    };

    let axes = Axes::new(
        SingleAxis::new(AxisId::Scanhead, &config.scanhead.wire_name, control_cs.clone()),
        SingleAxis::new(AxisId::Pusher, &config.pusher.wire_name, control_cs.clone()),
    );

    let shared = Arc::new(Mutex::new(SharedState::default()));
    let scan_slot = Arc::new(Mutex::new(None));

    let mut monitor_tasks = Vec::new();
    if online {
        // Known startup state: both axes disabled until the operator
        // enables them.
        axes.disable_all().await;

        monitor_tasks.push(
            FeedbackMonitor::new(
                feedback_cs,
                axes.clone(),
                shared.clone(),
                None,
                Duration::from_millis(config.monitor.feedback_interval_ms),
            )
            .spawn(),
        );
        monitor_tasks.push(
            FaultMonitor::new(
                status_cs,
                axes.clone(),
                scan_slot.clone(),
                shared.clone(),
                None,
                Duration::from_millis(config.monitor.fault_interval_ms),
            )
            .spawn(),
        );
    } else {
        drop(feedback_cs);
        drop(status_cs);
    }

    let service = ControllerService::new(
        axes.clone(),
        control_cs.clone(),
        scan_cs,
        shared.clone(),
        scan_slot.clone(),
        ScanTiming::from(&config.scan),
        online,
    );

    let (command_tx, command_rx) = mpsc::channel::<CommandEnvelope>(32);
    let service_task = tokio::spawn(service.run(command_rx));

    info!("rig controller ready");
    tokio::signal::ctrl_c().await?;
    info!("interrupt received; shutting down");

    // Shutdown always runs the full cleanup: stop the scan, disable both
    // axes, close the transport. Individual failures are logged inside.
    if let Err(e) = send_command(&command_tx, RigCommand::Shutdown).await {
        warn!("shutdown command failed: {e}");
    }
    let _ = service_task.await;

    for task in monitor_tasks {
        task.abort();
    }

    // With every sender gone the transport worker drains and exits,
    // releasing the serial port.
    drop(command_tx);
    drop(axes);
    drop(control_cs);
    drop(scan_slot);

    if let Some(task) = executor_task {
        let _ = task.await;
    }

    info!("shutdown complete");
    Ok(())
}
