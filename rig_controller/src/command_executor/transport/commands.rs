use std::io;

use utilities::command_executor::Command;

use super::TransportHandler;
use crate::command_executor::Channel;

#[derive(Clone)]
pub struct TransportCommand {
    pub channel: Channel,
    pub text: String,
}

impl Command for TransportCommand {
    type Response = String;
    type Handler = TransportHandler;

    fn execute(self, handler: &mut Self::Handler) -> io::Result<Self::Response> {
        handler.exchange(self.channel, &self.text)
    }
}
