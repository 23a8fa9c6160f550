use std::sync::Arc;

use anyhow::Result;
use ensemble::command;
use tokio::sync::{Mutex, mpsc};
use tracing::info;

use crate::{
    command_executor::transport::AcmdSender,
    controller::{
        multi_axis::Axes,
        scan_planner::{self, ScanParameters},
        scan_thread::{ScanHandle, ScanThread, ScanTiming},
    },
    models::{
        AxisId, CommandEnvelope, CommandError, CommandResponse, JogDirection, RigCommand,
        SharedState,
    },
};

/// Processes operator commands one at a time; this is the seam a front end
/// drives. Motion commands are rejected while offline, and manual axis
/// motion is rejected while a scan owns the axes.
pub struct ControllerService {
    axes: Axes,
    control_cs: AcmdSender,
    scan_cs: AcmdSender,
    shared: Arc<Mutex<SharedState>>,
    scan: Arc<Mutex<Option<ScanHandle>>>,
    timing: ScanTiming,
    online: bool,
}

impl ControllerService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        axes: Axes,
        control_cs: AcmdSender,
        scan_cs: AcmdSender,
        shared: Arc<Mutex<SharedState>>,
        scan: Arc<Mutex<Option<ScanHandle>>>,
        timing: ScanTiming,
        online: bool,
    ) -> Self {
        Self {
            axes,
            control_cs,
            scan_cs,
            shared,
            scan,
            timing,
            online,
        }
    }

    pub async fn run(mut self, mut command_rx: mpsc::Receiver<CommandEnvelope>) -> Result<()> {
        while let Some(envelope) = command_rx.recv().await {
            let shutdown = matches!(envelope.command, RigCommand::Shutdown);
            let result = self.handle(envelope.command).await;
            let _ = envelope.response.send(result);

            if shutdown {
                break;
            }
        }

        Ok(())
    }

    pub async fn handle(
        &mut self,
        command: RigCommand,
    ) -> Result<CommandResponse, CommandError> {
        match command {
            RigCommand::EnableAxis { axis } => {
                self.ensure_online()?;
                self.ensure_no_scan().await?;
                let enabled = self.axis(axis).enable().await.map_err(CommandError::new)?;
                Ok(CommandResponse::AxisEnabled(enabled))
            }
            RigCommand::DisableAxis { axis } => {
                self.ensure_online()?;
                self.ensure_no_scan().await?;
                let disabled = self.axis(axis).disable().await.map_err(CommandError::new)?;
                Ok(CommandResponse::AxisEnabled(!disabled))
            }
            RigCommand::Jog {
                axis,
                direction,
                speed,
            } => {
                self.ensure_online()?;
                self.ensure_no_scan().await?;
                self.jog(axis, direction, speed).await
            }
            RigCommand::StopJog { axis } => {
                self.ensure_online()?;
                self.axis(axis).stop_jog().await.map_err(CommandError::new)?;
                Ok(CommandResponse::Success)
            }
            RigCommand::MoveAbsolute {
                axis,
                target,
                speed,
            } => {
                self.ensure_online()?;
                self.ensure_no_scan().await?;

                // An empty target entry is a no-op, not an error.
                let Some(target) = target else {
                    return Ok(CommandResponse::Success);
                };

                self.axis(axis)
                    .move_absolute(target, speed)
                    .await
                    .map_err(CommandError::new)?;
                Ok(CommandResponse::Success)
            }
            RigCommand::MoveIncremental {
                axis,
                distance,
                speed,
            } => {
                self.ensure_online()?;
                self.ensure_no_scan().await?;
                self.axis(axis)
                    .move_incremental(distance, speed)
                    .await
                    .map_err(CommandError::new)?;
                Ok(CommandResponse::Success)
            }
            RigCommand::SetPositionOffset { axis, value } => {
                self.ensure_online()?;
                self.ensure_no_scan().await?;
                self.axis(axis)
                    .set_position_offset(value)
                    .await
                    .map_err(CommandError::new)?;
                Ok(CommandResponse::Success)
            }
            RigCommand::StartScan(params) => self.start_scan(params).await,
            RigCommand::PauseScan => {
                if let Some(handle) = self.scan.lock().await.as_ref() {
                    handle.pause().await;
                }
                Ok(CommandResponse::Success)
            }
            RigCommand::ResumeScan => {
                if let Some(handle) = self.scan.lock().await.as_ref() {
                    handle.resume().await;
                }
                Ok(CommandResponse::Success)
            }
            RigCommand::StopScan => {
                if let Some(handle) = self.scan.lock().await.take() {
                    handle.stop().await;
                }
                Ok(CommandResponse::Success)
            }
            RigCommand::ScanStatus => {
                Ok(CommandResponse::Progress(self.shared.lock().await.scan))
            }
            RigCommand::AcknowledgeFaults => {
                self.ensure_online()?;
                self.control_cs
                    .acmd(command::ACKNOWLEDGE_ALL)
                    .await
                    .map_err(CommandError::new)?;
                self.shared.lock().await.fault = None;
                Ok(CommandResponse::Success)
            }
            RigCommand::Reset => {
                self.ensure_online()?;
                info!("resetting controller; position data will be lost");
                self.control_cs
                    .acmd(command::RESET)
                    .await
                    .map_err(CommandError::new)?;
                Ok(CommandResponse::Success)
            }
            RigCommand::Shutdown => {
                self.shutdown().await;
                Ok(CommandResponse::Success)
            }
        }
    }

    async fn jog(
        &self,
        axis: AxisId,
        direction: JogDirection,
        speed: f64,
    ) -> Result<CommandResponse, CommandError> {
        self.axis(axis)
            .jog(direction, speed)
            .await
            .map_err(CommandError::new)?;
        Ok(CommandResponse::Success)
    }

    async fn start_scan(
        &mut self,
        params: ScanParameters,
    ) -> Result<CommandResponse, CommandError> {
        self.ensure_online()?;
        self.ensure_no_scan().await?;
        params.validate().map_err(CommandError::new)?;

        if !self.axes.scanhead.is_enabled() {
            return Err(CommandError::new("scanhead axis is not enabled"));
        }
        if !self.axes.pusher.is_enabled() {
            return Err(CommandError::new("pusher axis is not enabled"));
        }

        let points = scan_planner::plan(&params);
        let thread = ScanThread::new(
            self.scan_cs.clone(),
            self.axes.scanhead.wire_name(),
            self.axes.pusher.wire_name(),
            params,
            points,
            self.timing,
            self.shared.clone(),
        );

        *self.scan.lock().await = Some(thread.spawn());
        Ok(CommandResponse::Success)
    }

    /// Stop any scan and disable both axes; every step is attempted even if
    /// an earlier one fails.
    pub async fn shutdown(&mut self) {
        info!("shutting down: stopping scan and disabling axes");

        if let Some(handle) = self.scan.lock().await.take() {
            handle.stop().await;
        }

        if self.online {
            self.axes.disable_all().await;
        }
    }

    fn axis(&self, id: AxisId) -> &crate::controller::single_axis::SingleAxis {
        self.axes.by_id(id)
    }

    fn ensure_online(&self) -> Result<(), CommandError> {
        if self.online {
            Ok(())
        } else {
            Err(CommandError::new("transport offline"))
        }
    }

    async fn ensure_no_scan(&self) -> Result<(), CommandError> {
        let scan = self.scan.lock().await;
        if scan.as_ref().is_some_and(ScanHandle::is_active) {
            return Err(CommandError::new("a scan is in progress"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_executor::transport::TransportHandler;
    use crate::command_executor::{Channel, IDLE_WAIT, transport::OfflineLink};
    use crate::controller::scan_planner::{ScanDirection, ScanParameterError};
    use crate::controller::single_axis::SingleAxis;
    use utilities::command_executor::PriorityExecutor;

    fn offline_service() -> ControllerService {
        // The executor is dropped immediately, mirroring a rig with no
        // serial device: any transaction fails at the channel.
        let mut executor = PriorityExecutor::new(
            TransportHandler::new(Box::new(OfflineLink), None),
            IDLE_WAIT,
        );
        let control_cs = AcmdSender::new(Channel::Control, executor.add_queue());
        let scan_cs = AcmdSender::new(Channel::Scan, executor.add_queue());
        drop(executor);

        let axes = Axes::new(
            SingleAxis::new(AxisId::Scanhead, "SCANHEAD", control_cs.clone()),
            SingleAxis::new(AxisId::Pusher, "PUSHER", control_cs.clone()),
        );

        ControllerService::new(
            axes,
            control_cs,
            scan_cs,
            Arc::new(Mutex::new(SharedState::default())),
            Arc::new(Mutex::new(None)),
            ScanTiming {
                poll_interval: std::time::Duration::from_millis(250),
                remaining_update_interval: std::time::Duration::from_secs(1),
                in_position_window: 0.01,
                max_scan_speed: 11.4,
                approach_scan_speed: 6.0,
                approach_index_speed: 0.5,
            },
            false,
        )
    }

    fn scan_params() -> ScanParameters {
        ScanParameters {
            scan_start: 0.0,
            scan_stop: 20.0,
            index_start: 0.0,
            index_stop: -2.0,
            index_size: 1.0,
            scan_speed: 0.5,
            index_speed: 0.25,
            direction: ScanDirection::Bidirectional,
        }
    }

    #[tokio::test]
    async fn offline_mode_rejects_motion_commands() {
        let mut service = offline_service();

        let result = service
            .handle(RigCommand::EnableAxis {
                axis: AxisId::Scanhead,
            })
            .await;
        assert_eq!(result.unwrap_err().message, "transport offline");

        let result = service.handle(RigCommand::StartScan(scan_params())).await;
        assert_eq!(result.unwrap_err().message, "transport offline");
    }

    #[tokio::test]
    async fn scan_parameters_are_validated_before_any_motion() {
        let mut service = ControllerService {
            online: true,
            ..offline_service()
        };

        let mut params = scan_params();
        params.index_stop = -2.5;

        let result = service.handle(RigCommand::StartScan(params)).await;
        assert_eq!(
            result.unwrap_err().message,
            ScanParameterError::UnevenIndexRange.to_string()
        );
    }

    #[tokio::test]
    async fn scan_requires_enabled_axes() {
        let mut service = ControllerService {
            online: true,
            ..offline_service()
        };

        let result = service.handle(RigCommand::StartScan(scan_params())).await;
        assert_eq!(result.unwrap_err().message, "scanhead axis is not enabled");
    }
}
