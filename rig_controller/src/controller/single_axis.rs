use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use ensemble::{AxisStatus, command};
use tracing::{debug, info, warn};

use crate::{
    command_executor::transport::{AcmdError, AcmdSender},
    models::{AxisId, JogDirection},
};

/// One long-lived controller per physical axis. The amplifier is the
/// authority on enable state: the cached flag changes only after a status
/// query confirms the transition.
#[derive(Clone)]
pub struct SingleAxis {
    id: AxisId,
    wire_name: Arc<str>,
    control_cs: AcmdSender,
    enabled: Arc<AtomicBool>,
}

impl SingleAxis {
    pub fn new(id: AxisId, wire_name: &str, control_cs: AcmdSender) -> Self {
        Self {
            id,
            wire_name: Arc::from(wire_name),
            control_cs,
            enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> AxisId {
        self.id
    }

    pub fn wire_name(&self) -> &str {
        &self.wire_name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> Result<AxisStatus, AcmdError> {
        self.control_cs.axis_status(&self.wire_name).await
    }

    /// Single attempt: the axis stays Disabled when the status bit does not
    /// confirm the transition, and the caller decides whether to try again.
    pub async fn enable(&self) -> Result<bool, AcmdError> {
        self.control_cs
            .acmd(command::enable(&self.wire_name))
            .await?;

        let status = self.status().await?;
        self.enabled.store(status.is_enabled(), Ordering::SeqCst);

        if status.is_enabled() {
            info!(axis = self.wire_name(), "axis enabled");
        } else {
            warn!(axis = self.wire_name(), "enable not confirmed by amplifier");
        }

        Ok(status.is_enabled())
    }

    pub async fn disable(&self) -> Result<bool, AcmdError> {
        self.control_cs
            .acmd(command::disable(&self.wire_name))
            .await?;

        let status = self.status().await?;
        self.enabled.store(status.is_enabled(), Ordering::SeqCst);

        if status.is_enabled() {
            warn!(axis = self.wire_name(), "disable not confirmed by amplifier");
        } else {
            info!(axis = self.wire_name(), "axis disabled");
        }

        Ok(!status.is_enabled())
    }

    pub async fn move_absolute(&self, target: f64, speed: f64) -> Result<(), AcmdError> {
        self.control_cs
            .acmd(command::move_absolute(&self.wire_name, target, speed))
            .await?;
        Ok(())
    }

    /// Any in-flight motion is aborted before the incremental move starts.
    pub async fn move_incremental(&self, distance: f64, speed: f64) -> Result<(), AcmdError> {
        self.abort().await?;
        self.control_cs
            .acmd(command::move_incremental(&self.wire_name, distance, speed))
            .await?;
        Ok(())
    }

    pub async fn jog(&self, direction: JogDirection, speed: f64) -> Result<(), AcmdError> {
        if !self.is_enabled() {
            return Ok(());
        }

        self.abort().await?;

        let speed = match direction {
            JogDirection::Forward => speed,
            JogDirection::Backward => -speed,
        };

        match self
            .control_cs
            .acmd(command::freerun(&self.wire_name, speed))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_ack_no_execute() => {
                debug!(axis = self.wire_name(), "jog acknowledged but not executed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn stop_jog(&self) -> Result<(), AcmdError> {
        if !self.is_enabled() {
            return Ok(());
        }

        self.control_cs
            .acmd(command::freerun(&self.wire_name, 0.0))
            .await?;
        Ok(())
    }

    pub async fn abort(&self) -> Result<(), AcmdError> {
        self.control_cs
            .acmd(command::abort(&self.wire_name))
            .await?;
        Ok(())
    }

    pub async fn set_position_offset(&self, value: f64) -> Result<(), AcmdError> {
        self.control_cs
            .acmd(command::position_offset_set(&self.wire_name, value))
            .await?;
        Ok(())
    }
}
