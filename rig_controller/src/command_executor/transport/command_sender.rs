use std::io;

use ensemble::{AxisStatus, FaultMask, ResponseError, command, parse_response};
use utilities::command_executor::CommandSender;

use super::commands::TransportCommand;
use crate::command_executor::Channel;

#[derive(Debug, thiserror::Error)]
pub enum AcmdError {
    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("transport channel failed: {0}")]
    Link(#[from] io::Error),

    #[error("malformed payload {payload:?} for {command}")]
    Malformed { command: String, payload: String },
}

impl AcmdError {
    /// Rapid direction reversals race the previous abort inside the
    /// amplifier; jog callers treat this reply as harmless.
    pub fn is_ack_no_execute(&self) -> bool {
        matches!(self, AcmdError::Response(ResponseError::AckNoExecute))
    }
}

/// Handle for issuing transactions on one logical channel of the shared
/// transport. Cheap to clone; every component owns the sender for the
/// channel it is supposed to talk on.
#[derive(Clone)]
pub struct AcmdSender {
    channel: Channel,
    sender: CommandSender<TransportCommand>,
}

impl AcmdSender {
    pub fn new(channel: Channel, sender: CommandSender<TransportCommand>) -> Self {
        Self { channel, sender }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// One command/response transaction, decoded down to the payload.
    pub async fn acmd(&self, text: impl Into<String>) -> Result<String, AcmdError> {
        let raw = self
            .sender
            .send_command(TransportCommand {
                channel: self.channel,
                text: text.into(),
            })
            .await?;

        Ok(parse_response(&raw)?)
    }

    pub async fn acmd_f64(&self, text: impl Into<String>) -> Result<f64, AcmdError> {
        let text = text.into();
        let payload = self.acmd(text.clone()).await?;

        payload
            .trim()
            .parse()
            .map_err(|_| AcmdError::Malformed {
                command: text,
                payload,
            })
    }

    pub async fn axis_status(&self, axis: &str) -> Result<AxisStatus, AcmdError> {
        let text = command::axis_status(axis);
        let payload = self.acmd(text.clone()).await?;

        AxisStatus::parse(&payload).map_err(|_| AcmdError::Malformed {
            command: text,
            payload,
        })
    }

    pub async fn axis_fault(&self, axis: &str) -> Result<FaultMask, AcmdError> {
        let text = command::axis_fault(axis);
        let payload = self.acmd(text.clone()).await?;

        FaultMask::parse(&payload).map_err(|_| AcmdError::Malformed {
            command: text,
            payload,
        })
    }
}
