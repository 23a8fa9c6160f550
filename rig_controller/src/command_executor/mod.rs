use std::time::Duration;

pub mod transport;

/// Sleep applied by the transport worker when every queue is empty.
pub const IDLE_WAIT: Duration = Duration::from_micros(100);

/// Logical command channels sharing the one physical transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Control,
    Scan,
    Status,
    Feedback,
}

impl Channel {
    /// Drain order on the transport worker: interactive control first,
    /// background feedback polling last.
    pub const PRIORITY: [Channel; 4] = [
        Channel::Control,
        Channel::Scan,
        Channel::Status,
        Channel::Feedback,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Channel::Control => "control",
            Channel::Scan => "scan",
            Channel::Status => "status",
            Channel::Feedback => "feedback",
        }
    }
}
