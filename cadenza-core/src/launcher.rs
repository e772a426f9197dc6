//! Controller side of an engine channel.
//!
//! An [`EngineLauncher`] owns one engine subprocess: commands go out on its
//! stdin, replies come back on its stdout and are handed to a callback from a
//! read task, and stderr is shared with the controller. The engine is always
//! sent `SIGINT` when the launcher goes away.

use std::ffi::OsStr;
use std::marker::PhantomData;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::commands::Reply;
use crate::error::LaunchError;
use crate::protocol::Message;
use crate::transport::{Incoming, LineReader, LineWriter};

const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// A running engine that accepts commands of type `C`.
pub struct EngineLauncher<C> {
    child: Child,
    stdin: Option<LineWriter<ChildStdin>>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    grace: Duration,
    finished: bool,
    _commands: PhantomData<fn(&C)>,
}

impl<C: Message> EngineLauncher<C> {
    /// Start `program` and begin reading its replies into `on_reply`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<I, S, F>(program: &Path, args: I, on_reply: F) -> Result<Self, LaunchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
        F: FnMut(Reply) + Send + 'static,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| {
                log::error!("Cannot spawn engine {}: {}", program.display(), source);
                LaunchError::Spawn {
                    program: program.to_path_buf(),
                    source,
                }
            })?;

        let stdin = child.stdin.take().ok_or(LaunchError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(LaunchError::MissingPipe("stdout"))?;
        log::info!("Started engine {} (pid {:?})", program.display(), child.id());

        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_replies(stdout, cancel.clone(), on_reply));

        Ok(Self {
            child,
            stdin: Some(LineWriter::new(stdin)),
            cancel,
            reader: Some(reader),
            grace: DEFAULT_GRACE,
            finished: false,
            _commands: PhantomData,
        })
    }

    /// How long [`EngineLauncher::shutdown`] waits after `SIGINT` before
    /// killing the engine.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Write one command line. There is no acknowledgement.
    pub async fn send_command(&mut self, command: &C) -> Result<(), LaunchError> {
        log::debug!("-> {}", command.name());
        let stdin = self.stdin.as_mut().ok_or(LaunchError::MissingPipe("stdin"))?;
        stdin.send(command).await.map_err(LaunchError::Write)
    }

    /// Stop reading replies. The callback is not called again.
    pub fn cancel_read(&self) {
        self.cancel.cancel();
    }

    /// OS process id, `None` once the engine has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Interrupt the engine and wait for it to exit, killing it if it is
    /// still running after the grace period.
    pub async fn shutdown(mut self) -> Result<ExitStatus, LaunchError> {
        self.finished = true;
        self.cancel_read();
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        self.interrupt();
        self.stdin = None;

        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(status) => {
                let status = status.map_err(LaunchError::Wait)?;
                log::info!("Engine exited: {}", status);
                Ok(status)
            }
            Err(_) => {
                log::warn!("Engine ignored SIGINT for {:?}, killing it", self.grace);
                self.child.kill().await.map_err(LaunchError::Wait)?;
                self.child.wait().await.map_err(LaunchError::Wait)
            }
        }
    }

    fn interrupt(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
                    log::warn!("Cannot interrupt engine {}: {}", pid, err);
                }
            }
        }
        #[cfg(not(unix))]
        if let Err(err) = self.child.start_kill() {
            log::warn!("Cannot stop engine: {}", err);
        }
    }
}

impl<C> Drop for EngineLauncher<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.cancel.cancel();
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGINT,
            );
        }
        #[cfg(not(unix))]
        let _ = self.child.start_kill();
    }
}

async fn read_replies<F>(stdout: ChildStdout, cancel: CancellationToken, mut on_reply: F)
where
    F: FnMut(Reply),
{
    let mut reader = LineReader::new(stdout);
    loop {
        let incoming = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Reply read cancelled");
                return;
            }
            incoming = reader.next_message::<Reply>() => incoming,
        };
        match incoming {
            None => {
                log::debug!("Engine closed its output");
                return;
            }
            Some(Incoming::Message(reply)) => on_reply(reply),
            Some(Incoming::Malformed(err)) => {
                log::warn!("Malformed reply from engine: {}", err);
                on_reply(Reply::Error(err.to_string()));
            }
            Some(Incoming::Broken(err)) => {
                log::warn!("Cannot read engine output: {}", err);
                on_reply(Reply::Error(format!("cannot read engine output: {}", err)));
                return;
            }
        }
    }
}
