//! Scripted in-memory channel for unit tests

use async_trait::async_trait;
use hive_ipc::{Channel, IpcError, Message};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the scripted peer will deliver, and what it was sent
#[derive(Debug, Default)]
pub(crate) struct Script {
    pub(crate) inbox: VecDeque<Message>,
    pub(crate) sent: Vec<Message>,
    /// Once set, sends fail and receives fail after the inbox drains
    pub(crate) broken: bool,
}

pub(crate) struct ScriptedChannel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedChannel {
    pub(crate) fn new() -> (Self, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script::default()));
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn send(&mut self, message: Message) -> Result<(), IpcError> {
        let mut script = self.script.lock().unwrap();
        if script.broken {
            return Err(IpcError::ConnectionClosed);
        }
        script.sent.push(message);
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Message>, IpcError> {
        let mut script = self.script.lock().unwrap();
        match script.inbox.pop_front() {
            Some(message) => Ok(Some(message)),
            None if script.broken => Err(IpcError::ConnectionClosed),
            None => Ok(None),
        }
    }

    async fn recv_timeout(&mut self, _timeout: Duration) -> Result<Option<Message>, IpcError> {
        self.try_recv()
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        self.script.lock().unwrap().broken = true;
        Ok(())
    }

    fn label(&self) -> &str {
        "scripted"
    }
}
