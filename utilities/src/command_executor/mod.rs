use std::{
    io,
    sync::mpsc::{Receiver, Sender, TryRecvError},
    time::Duration,
};

use tokio::sync::oneshot;

pub trait Command: Send {
    type Response: Send;
    type Handler: DeviceHandler<Command = Self>;

    fn execute(self, handler: &mut Self::Handler) -> io::Result<Self::Response>;
}

pub trait DeviceHandler {
    type Command: Command<Handler = Self>;
}

pub struct GenericCommand<C: Command> {
    command: C,
    response_ch: oneshot::Sender<io::Result<C::Response>>,
}

impl<C: Command> GenericCommand<C> {
    pub fn new(command: C, response_ch: oneshot::Sender<io::Result<C::Response>>) -> Self {
        Self {
            command,
            response_ch,
        }
    }

    pub fn execute(self, handler: &mut C::Handler) -> io::Result<()> {
        let result = self.command.execute(handler);

        self.response_ch
            .send(result)
            .map_err(|_| io::Error::other("Failed to send response"))?;

        Ok(())
    }
}

/// Executes commands from several queues on one blocking worker that owns the
/// device handler. Queues are drained in the order they were registered:
/// whenever the worker is free it takes the oldest command from the
/// highest-priority non-empty queue, so interactive traffic is never starved
/// by background polling. The worker exits once every sender is gone.
pub struct PriorityExecutor<H: DeviceHandler + Send + 'static> {
    handler: H,
    queues: Vec<Receiver<GenericCommand<H::Command>>>,
    idle_wait: Duration,
}

impl<H: DeviceHandler + Send> PriorityExecutor<H> {
    pub fn new(handler: H, idle_wait: Duration) -> Self {
        Self {
            handler,
            queues: Vec::new(),
            idle_wait,
        }
    }

    /// Register a new queue below every queue registered before it.
    pub fn add_queue(&mut self) -> CommandSender<H::Command> {
        let (sender, receiver) = std::sync::mpsc::channel();
        self.queues.push(receiver);
        CommandSender::new(sender)
    }

    pub fn run(&mut self) -> io::Result<()> {
        loop {
            let mut executed = false;
            let mut disconnected = 0;

            for queue in &self.queues {
                match queue.try_recv() {
                    Ok(command) => {
                        // A failed send means the requester gave up waiting;
                        // the next command may still succeed.
                        let _ = command.execute(&mut self.handler);
                        executed = true;
                        break;
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => disconnected += 1,
                }
            }

            if disconnected == self.queues.len() {
                return Ok(());
            }

            if !executed {
                std::thread::sleep(self.idle_wait);
            }
        }
    }

    pub fn spawn(mut self) -> tokio::task::JoinHandle<io::Result<()>> {
        tokio::task::spawn_blocking(move || self.run())
    }
}

#[derive(Clone)]
pub struct CommandSender<T: Command> {
    commands_ch: Sender<GenericCommand<T>>,
}

impl<C: Command> CommandSender<C> {
    pub fn new(commands_ch: Sender<GenericCommand<C>>) -> Self {
        Self { commands_ch }
    }

    pub async fn send_command(&self, command: C) -> io::Result<C::Response> {
        let (response_ch, response_rx) = oneshot::channel();
        let command = GenericCommand::new(command, response_ch);

        self.commands_ch
            .send(command)
            .map_err(|_| io::Error::other("Failed to send command"))?;

        response_rx
            .await
            .map_err(|_| io::Error::other("Failed to receive response"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl DeviceHandler for Recorder {
        type Command = Tagged;
    }

    struct Tagged(&'static str);

    impl Command for Tagged {
        type Response = ();
        type Handler = Recorder;

        fn execute(self, handler: &mut Recorder) -> io::Result<()> {
            handler.log.lock().unwrap().push(self.0);
            Ok(())
        }
    }

    #[tokio::test]
    async fn drains_queues_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut executor =
            PriorityExecutor::new(Recorder { log: log.clone() }, Duration::from_micros(100));

        let high = executor.add_queue();
        let low = executor.add_queue();

        // Enqueue on the low-priority queue first; the executor must still
        // pick the high-priority command when it starts draining.
        let low_task = tokio::spawn(async move { low.send_command(Tagged("low")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let high_task = tokio::spawn(async move { high.send_command(Tagged("high")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let worker = executor.spawn();
        low_task.await.unwrap().unwrap();
        high_task.await.unwrap().unwrap();
        worker.await.unwrap().unwrap();

        assert_eq!(*log.lock().unwrap(), ["high", "low"]);
    }
}
