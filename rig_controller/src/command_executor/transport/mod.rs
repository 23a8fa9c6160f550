use std::{
    io::{self, Read as _, Write as _},
    sync::Arc,
    time::Duration,
};

use serialport::SerialPort;
use tracing::{info, trace};
use utilities::command_executor::DeviceHandler;

use super::Channel;

pub mod command_sender;
pub mod commands;

pub use command_sender::{AcmdError, AcmdSender};
pub use commands::TransportCommand;

/// Optional journal receiving every (channel, command, response) exchange.
pub type TransactionJournal = Arc<dyn Fn(Channel, &str, &str) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no serial port found")]
    NoPort,

    #[error("more than one serial port is openable: {0:?}")]
    AmbiguousPort(Vec<String>),

    #[error("amplifier did not acknowledge the handshake")]
    HandshakeFailed,

    #[error(transparent)]
    Serial(#[from] serialport::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One command/response exchange over the ASCII link. Implemented by the
/// real serial port and by simulated amplifiers in tests.
pub trait AscLink: Send {
    fn exchange(&mut self, command: &str) -> io::Result<String>;
}

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Probe every addressable port and keep the single one that can be
    /// opened exclusively. Zero or several candidates is a hard failure the
    /// operator has to resolve; it is reported, never retried automatically.
    pub fn discover(baud: u32, read_timeout: Duration) -> Result<Self, TransportError> {
        let mut openable = Vec::new();

        for port_info in serialport::available_ports()? {
            if serialport::new(&port_info.port_name, baud).open().is_ok() {
                openable.push(port_info.port_name);
            }
        }

        match openable.as_slice() {
            [] => Err(TransportError::NoPort),
            [name] => {
                let port = serialport::new(name, baud).timeout(read_timeout).open()?;
                info!(port = name, baud, "serial link opened");
                Ok(Self { port })
            }
            _ => Err(TransportError::AmbiguousPort(openable)),
        }
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0]);
                }
                // Deadline elapsed: surface whatever arrived, possibly
                // nothing at all, and let the caller decode it as NoData.
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e),
            }
        }

        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

impl AscLink for SerialLink {
    fn exchange(&mut self, command: &str) -> io::Result<String> {
        self.port.write_all(format!("{command} \n").as_bytes())?;
        self.read_line()
    }
}

/// The link must acknowledge with a `%` sentinel before it is trusted; move
/// completion waits are then turned off so commands can be issued while
/// moves are still in progress.
pub fn handshake(link: &mut dyn AscLink) -> Result<(), TransportError> {
    let reply = link.exchange(ensemble::command::ACKNOWLEDGE_ALL)?;
    if !reply.contains('%') {
        return Err(TransportError::HandshakeFailed);
    }

    link.exchange(ensemble::command::WAIT_MODE_NOWAIT)?;
    Ok(())
}

/// Stand-in link used when the rig runs without a device; every exchange
/// fails so motion paths stay dead while the rest of the system is usable.
pub struct OfflineLink;

impl AscLink for OfflineLink {
    fn exchange(&mut self, _command: &str) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::NotConnected,
            "transport offline",
        ))
    }
}

/// Owner of the physical link on the transport worker thread. All commands,
/// regardless of channel, funnel through here one at a time.
pub struct TransportHandler {
    link: Box<dyn AscLink>,
    journal: Option<TransactionJournal>,
}

impl TransportHandler {
    pub fn new(link: Box<dyn AscLink>, journal: Option<TransactionJournal>) -> Self {
        Self { link, journal }
    }

    pub fn exchange(&mut self, channel: Channel, text: &str) -> io::Result<String> {
        let response = self.link.exchange(text)?;

        trace!(
            channel = channel.label(),
            command = text,
            response = response.trim(),
            "transaction"
        );

        if let Some(journal) = &self.journal {
            journal(channel, text, &response);
        }

        Ok(response)
    }
}

impl DeviceHandler for TransportHandler {
    type Command = TransportCommand;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedLink {
        replies: Vec<&'static str>,
        sent: Vec<String>,
    }

    impl AscLink for ScriptedLink {
        fn exchange(&mut self, command: &str) -> io::Result<String> {
            self.sent.push(command.to_string());
            Ok(self.replies.remove(0).to_string())
        }
    }

    #[test]
    fn handshake_acknowledges_then_disables_waits() {
        let mut link = ScriptedLink {
            replies: vec!["%\n", "%\n"],
            sent: Vec::new(),
        };

        handshake(&mut link).unwrap();
        assert_eq!(link.sent, ["ACKNOWLEDGEALL", "WAIT MODE NOWAIT"]);
    }

    #[test]
    fn handshake_fails_without_acknowledge_sentinel() {
        let mut link = ScriptedLink {
            replies: vec!["\n"],
            sent: Vec::new(),
        };

        assert!(matches!(
            handshake(&mut link),
            Err(TransportError::HandshakeFailed)
        ));
    }
}
