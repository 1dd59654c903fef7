//! Worker kinds shipped with the `hive` binary

use hive_ipc::Message;
use tracing::warn;

use crate::error::WorkerError;
use crate::runtime::{WorkerHooks, WorkerLink};

/// Replies to every message with the message itself, `repeat` times
#[derive(Debug)]
pub struct EchoWorker {
    repeat: u32,
    echoed: u64,
}

impl Default for EchoWorker {
    fn default() -> Self {
        Self {
            repeat: 1,
            echoed: 0,
        }
    }
}

impl EchoWorker {
    /// Build from launch arguments of the form `key=value`.
    ///
    /// Understands `repeat=N` (N >= 1).
    pub fn from_args(args: &[String]) -> Result<Self, WorkerError> {
        let mut worker = Self::default();
        for arg in args {
            let invalid = |message: String| WorkerError::InvalidArgument {
                kind: "echo".to_string(),
                message,
            };
            match arg.split_once('=') {
                Some(("repeat", value)) => {
                    worker.repeat = value.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                        invalid(format!("repeat must be a positive integer, got {}", value))
                    })?;
                }
                _ => return Err(invalid(format!("unrecognised argument {}", arg))),
            }
        }
        Ok(worker)
    }

    pub fn repeat(&self) -> u32 {
        self.repeat
    }

    pub fn echoed(&self) -> u64 {
        self.echoed
    }
}

impl WorkerHooks for EchoWorker {
    fn handle_msg(&mut self, link: &mut WorkerLink, msg: Message) {
        for _ in 0..self.repeat {
            if let Err(e) = link.send(msg.clone()) {
                warn!("Echo failed: {}", e);
                return;
            }
        }
        self.echoed += 1;
    }
}

/// Look up a built-in worker by kind name and configure it from launch arguments
pub fn builtin(kind: &str, args: &[String]) -> Result<Box<dyn WorkerHooks>, WorkerError> {
    match kind {
        "echo" => Ok(Box::new(EchoWorker::from_args(args)?)),
        other => Err(WorkerError::UnknownKind(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_known_and_unknown_kinds() {
        assert!(builtin("echo", &[]).is_ok());
        assert!(matches!(
            builtin("prime-sieve", &[]),
            Err(WorkerError::UnknownKind(kind)) if kind == "prime-sieve"
        ));
    }

    #[test]
    fn test_echo_arguments() {
        assert_eq!(EchoWorker::from_args(&[]).unwrap().repeat(), 1);
        assert_eq!(EchoWorker::from_args(&args(&["repeat=3"])).unwrap().repeat(), 3);

        for bad in [&["repeat=0"][..], &["repeat=many"], &["limit=100"]] {
            assert!(matches!(
                builtin("echo", &args(bad)),
                Err(WorkerError::InvalidArgument { .. })
            ));
        }
    }
}
