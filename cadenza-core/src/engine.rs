//! Engine-side event loop shared by the playback and ripping engines.
//!
//! One loop turn waits for whichever comes first: a command line on the
//! input, an event from the media pipeline, a progress tick, or the shutdown
//! signal. The handler pushes its replies into a buffer that is written out,
//! in order, before the next read is armed.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use crate::commands::Reply;
use crate::protocol::Message;
use crate::transport::{Incoming, LineReader, LineWriter};

/// Create a pipeline bus.
pub fn bus<E>() -> (Bus<E>, BusReceiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let epoch = Arc::new(AtomicU64::new(0));
    (
        Bus {
            tx,
            epoch: Arc::clone(&epoch),
        },
        BusReceiver { rx, epoch },
    )
}

/// Sending side of a pipeline bus, cloned into pipeline threads.
///
/// Every event is stamped with the epoch it belongs to. [`Bus::flush`]
/// starts a new epoch, after which events stamped earlier are discarded on
/// receipt. Pipelines flush when they go to `NULL`, so nothing posted by a
/// torn down job reaches the engine.
pub struct Bus<E> {
    tx: UnboundedSender<(u64, E)>,
    epoch: Arc<AtomicU64>,
}

impl<E> Clone for Bus<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            epoch: Arc::clone(&self.epoch),
        }
    }
}

impl<E> Bus<E> {
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Post an event on behalf of the job started in `epoch`.
    pub fn post(&self, epoch: u64, event: E) {
        let _ = self.tx.send((epoch, event));
    }

    /// Post an event for the current epoch.
    pub fn post_now(&self, event: E) {
        self.post(self.epoch(), event);
    }

    pub fn flush(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

/// Receiving side of a pipeline bus, owned by the engine loop.
pub struct BusReceiver<E> {
    rx: UnboundedReceiver<(u64, E)>,
    epoch: Arc<AtomicU64>,
}

impl<E: Debug> BusReceiver<E> {
    /// Next event of the current epoch; `None` once every sender is gone.
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            let (stamp, event) = self.rx.recv().await?;
            if stamp == self.epoch.load(Ordering::Acquire) {
                return Some(event);
            }
            log::debug!("Dropping stale pipeline event {:?}", event);
        }
    }
}

/// A state machine driven by commands, pipeline events and progress ticks.
pub trait Engine {
    type Command: Message + Debug;
    type Event: Debug;

    fn handle_command(
        &mut self,
        command: Self::Command,
        replies: &mut Vec<Reply>,
    ) -> anyhow::Result<()>;

    fn handle_event(&mut self, event: Self::Event, replies: &mut Vec<Reply>) -> anyhow::Result<()>;

    /// Called every tick period while [`Engine::timer_running`] is true.
    fn handle_tick(&mut self, replies: &mut Vec<Reply>) -> anyhow::Result<()>;

    fn timer_running(&self) -> bool;

    /// Return the pipeline to `NULL` before the process exits.
    fn shutdown(&mut self);
}

/// Serve `engine` until the input closes, `shutdown` resolves, or a fatal
/// error occurs. The engine is always shut down before returning.
pub async fn run_engine<E, R, W, S>(
    mut engine: E,
    mut events: BusReceiver<E::Event>,
    input: R,
    output: W,
    tick_period: Duration,
    shutdown: S,
) -> anyhow::Result<()>
where
    E: Engine,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let result = serve(&mut engine, &mut events, input, output, tick_period, shutdown).await;
    engine.shutdown();
    result
}

async fn serve<E, R, W, S>(
    engine: &mut E,
    events: &mut BusReceiver<E::Event>,
    input: R,
    output: W,
    tick_period: Duration,
    shutdown: S,
) -> anyhow::Result<()>
where
    E: Engine,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut reader = LineReader::new(input);
    let mut writer = LineWriter::new(output);
    let mut ticker: Option<Interval> = None;
    let mut replies = Vec::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                log::info!("Shutdown requested, leaving the command loop");
                return Ok(());
            }

            incoming = reader.next_message::<E::Command>() => match incoming {
                None => {
                    log::info!("Command channel closed");
                    return Ok(());
                }
                Some(Incoming::Message(command)) => {
                    log::debug!("Command: {:?}", command);
                    engine.handle_command(command, &mut replies)?;
                }
                Some(Incoming::Malformed(err)) if err.is_fatal() => {
                    log::error!("Cannot dispatch command: {}", err);
                    return Err(err.into());
                }
                Some(Incoming::Malformed(err)) => {
                    log::warn!("Dropping malformed command: {}", err);
                    replies.push(Reply::Error(err.to_string()));
                }
                Some(Incoming::Broken(err)) => {
                    return Err(anyhow::Error::new(err).context("cannot read commands"));
                }
            },

            Some(event) = events.recv() => {
                log::debug!("Pipeline event: {:?}", event);
                engine.handle_event(event, &mut replies)?;
            }

            _ = next_tick(&mut ticker) => {
                engine.handle_tick(&mut replies)?;
            }
        }

        for reply in replies.drain(..) {
            writer.send(&reply).await.context("cannot write reply")?;
        }
        sync_timer(engine.timer_running(), &mut ticker, tick_period);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Start or drop the interval so it matches the engine's timer flag. A fresh
/// interval first fires one full period after it is started.
fn sync_timer(running: bool, ticker: &mut Option<Interval>, period: Duration) {
    match (running, ticker.is_some()) {
        (true, false) => {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            *ticker = Some(interval);
        }
        (false, true) => *ticker = None,
        _ => {}
    }
}
