use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::{
    command_executor::transport::{AcmdError, AcmdSender},
    controller::{multi_axis::Axes, scan_thread::ScanHandle},
    models::{SharedState, StatusSink},
};

/// Polls both fault registers at a lower rate than the feedback traffic.
/// Any nonzero mask disables the affected axis and pauses a running scan;
/// an emergency stop takes down every axis.
pub struct FaultMonitor {
    status_cs: AcmdSender,
    axes: Axes,
    scan: Arc<Mutex<Option<ScanHandle>>>,
    shared: Arc<Mutex<SharedState>>,
    status_sink: Option<StatusSink>,
    poll_interval: Duration,
}

impl FaultMonitor {
    pub fn new(
        status_cs: AcmdSender,
        axes: Axes,
        scan: Arc<Mutex<Option<ScanHandle>>>,
        shared: Arc<Mutex<SharedState>>,
        status_sink: Option<StatusSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            status_cs,
            axes,
            scan,
            shared,
            status_sink,
            poll_interval,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            interval.tick().await;

            // Transaction failures are retried on the next poll.
            if let Err(e) = self.check_once().await {
                debug!("fault poll failed: {e}");
            }
        }
    }

    /// One pass over both axes' fault registers.
    pub async fn check_once(&self) -> Result<(), AcmdError> {
        let scanhead_fault = self
            .status_cs
            .axis_fault(self.axes.scanhead.wire_name())
            .await?;
        let pusher_fault = self
            .status_cs
            .axis_fault(self.axes.pusher.wire_name())
            .await?;

        if scanhead_fault.is_estop() || pusher_fault.is_estop() {
            self.pause_scan().await;
            self.axes.disable_all().await;
            self.report("ESTOP").await;
            return Ok(());
        }

        for (axis, fault) in [
            (&self.axes.scanhead, scanhead_fault),
            (&self.axes.pusher, pusher_fault),
        ] {
            if fault.is_clear() {
                continue;
            }

            self.pause_scan().await;
            if let Err(e) = axis.disable().await {
                error!(axis = axis.wire_name(), "failed to disable faulted axis: {e}");
            }

            for name in fault.faults() {
                self.report(&format!("FAULT: {} {}", axis.id().label(), name))
                    .await;
            }
        }

        Ok(())
    }

    async fn pause_scan(&self) {
        if let Some(handle) = self.scan.lock().await.as_ref() {
            handle.pause().await;
        }
    }

    async fn report(&self, message: &str) {
        error!("{message}");
        self.shared.lock().await.fault = Some(message.to_string());

        if let Some(sink) = &self.status_sink {
            sink(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::sync::Mutex as StdMutex;

    use crate::command_executor::transport::{AscLink, TransportHandler};
    use crate::command_executor::{Channel, IDLE_WAIT};
    use crate::controller::single_axis::SingleAxis;
    use crate::models::AxisId;
    use utilities::command_executor::PriorityExecutor;

    #[derive(Default)]
    struct SimState {
        faults: HashMap<String, u32>,
        enabled: HashMap<String, bool>,
        log: Vec<String>,
    }

    struct SimAmplifier {
        state: Arc<StdMutex<SimState>>,
    }

    impl AscLink for SimAmplifier {
        fn exchange(&mut self, command: &str) -> io::Result<String> {
            let mut sim = self.state.lock().unwrap();
            sim.log.push(command.to_string());

            let payload = if let Some(name) = command
                .strip_prefix("AXISFAULT(")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                format!("{}", sim.faults[name])
            } else if let Some(name) = command
                .strip_prefix("AXISSTATUS(")
                .and_then(|rest| rest.strip_suffix(')'))
            {
                format!("{}", u32::from(sim.enabled[name]))
            } else if let Some(name) = command.strip_prefix("DISABLE ") {
                sim.enabled.insert(name.to_string(), false);
                String::new()
            } else if let Some(name) = command.strip_prefix("ENABLE ") {
                sim.enabled.insert(name.to_string(), true);
                String::new()
            } else {
                String::new()
            };

            Ok(format!("%{payload}\n"))
        }
    }

    struct Rig {
        state: Arc<StdMutex<SimState>>,
        shared: Arc<Mutex<SharedState>>,
        monitor: FaultMonitor,
        axes: Axes,
        scan_slot: Arc<Mutex<Option<ScanHandle>>>,
        scan_cs: AcmdSender,
    }

    fn sim_rig() -> Rig {
        let state = Arc::new(StdMutex::new(SimState {
            faults: HashMap::from([("SCANHEAD".to_string(), 0), ("PUSHER".to_string(), 0)]),
            enabled: HashMap::from([("SCANHEAD".to_string(), true), ("PUSHER".to_string(), true)]),
            log: Vec::new(),
        }));

        let handler = TransportHandler::new(
            Box::new(SimAmplifier {
                state: state.clone(),
            }),
            None,
        );
        let mut executor = PriorityExecutor::new(handler, IDLE_WAIT);
        let control_cs = AcmdSender::new(Channel::Control, executor.add_queue());
        let scan_cs = AcmdSender::new(Channel::Scan, executor.add_queue());
        let status_cs = AcmdSender::new(Channel::Status, executor.add_queue());
        executor.spawn();

        let axes = Axes::new(
            SingleAxis::new(AxisId::Scanhead, "SCANHEAD", control_cs.clone()),
            SingleAxis::new(AxisId::Pusher, "PUSHER", control_cs),
        );
        let shared = Arc::new(Mutex::new(SharedState::default()));
        let scan_slot = Arc::new(Mutex::new(None));

        let monitor = FaultMonitor::new(
            status_cs,
            axes.clone(),
            scan_slot.clone(),
            shared.clone(),
            None,
            Duration::from_millis(750),
        );

        Rig {
            state,
            shared,
            monitor,
            axes,
            scan_slot,
            scan_cs,
        }
    }

    /// A sequencer handle whose loop is not running; enough to observe the
    /// monitor driving it into the paused state.
    async fn idle_scan_handle(rig: &Rig) -> ScanHandle {
        let params = crate::controller::scan_planner::ScanParameters {
            scan_start: 0.0,
            scan_stop: 20.0,
            index_start: 0.0,
            index_stop: -2.0,
            index_size: 1.0,
            scan_speed: 0.5,
            index_speed: 0.25,
            direction: crate::controller::scan_planner::ScanDirection::Bidirectional,
        };
        let points = crate::controller::scan_planner::plan(&params);

        let thread = crate::controller::scan_thread::ScanThread::new(
            rig.scan_cs.clone(),
            "SCANHEAD",
            "PUSHER",
            params,
            points,
            crate::controller::scan_thread::ScanTiming {
                poll_interval: Duration::from_millis(5),
                remaining_update_interval: Duration::from_secs(3600),
                in_position_window: 0.01,
                max_scan_speed: 11.4,
                approach_scan_speed: 6.0,
                approach_index_speed: 0.5,
            },
            rig.shared.clone(),
        );

        let handle = thread.handle();
        *rig.scan_slot.lock().await = Some(handle.clone());
        handle
    }

    async fn mark_enabled(axes: &Axes) {
        for axis in axes.all() {
            axis.enable().await.unwrap();
        }
    }

    #[tokio::test]
    async fn estop_disables_both_axes_and_pauses_the_scan() {
        let rig = sim_rig();
        mark_enabled(&rig.axes).await;
        let scan = idle_scan_handle(&rig).await;

        rig.state
            .lock()
            .unwrap()
            .faults
            .insert("SCANHEAD".to_string(), 1 << 11);

        rig.monitor.check_once().await.unwrap();

        assert!(!rig.axes.scanhead.is_enabled());
        assert!(!rig.axes.pusher.is_enabled());
        assert!(scan.is_paused());
        assert_eq!(rig.shared.lock().await.fault.as_deref(), Some("ESTOP"));

        let sim = rig.state.lock().unwrap();
        assert!(sim.log.iter().any(|c| c == "DISABLE SCANHEAD"));
        assert!(sim.log.iter().any(|c| c == "DISABLE PUSHER"));
        assert!(sim.log.iter().any(|c| c == "ABORT SCANHEAD"));
        assert!(sim.log.iter().any(|c| c == "ABORT PUSHER"));
    }

    #[tokio::test]
    async fn single_fault_disables_only_the_affected_axis() {
        let rig = sim_rig();
        mark_enabled(&rig.axes).await;

        rig.state
            .lock()
            .unwrap()
            .faults
            .insert("SCANHEAD".to_string(), 0b1);

        rig.monitor.check_once().await.unwrap();

        assert!(!rig.axes.scanhead.is_enabled());
        assert!(rig.axes.pusher.is_enabled());
        assert_eq!(
            rig.shared.lock().await.fault.as_deref(),
            Some("FAULT: Scanhead PositionError Fault")
        );

        let sim = rig.state.lock().unwrap();
        assert!(!sim.log.iter().any(|c| c == "DISABLE PUSHER"));
    }

    #[tokio::test]
    async fn clear_registers_leave_axes_alone() {
        let rig = sim_rig();
        mark_enabled(&rig.axes).await;

        rig.monitor.check_once().await.unwrap();

        assert!(rig.axes.scanhead.is_enabled());
        assert!(rig.axes.pusher.is_enabled());
        assert!(rig.shared.lock().await.fault.is_none());
    }
}
