//! Playback pipeline on top of a rodio sink.
//!
//! The output stream must stay on the thread that opened it, so the sink
//! lives on a dedicated audio thread. [`RodioPipeline`] is the handle the
//! engine holds: every call is a request over a crossbeam channel answered
//! synchronously by the audio thread. Between requests the audio thread
//! watches the sink and posts about-to-finish and end-of-stream on the bus.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rodio::{
    Decoder, DeviceTrait, OutputStream, OutputStreamBuilder, Sink, Source,
    cpal::{self, traits::HostTrait},
};

use crate::engine::Bus;
use crate::error::PipelineError;
use crate::protocol::PipelineState;

use super::pipeline::{PlayerEvent, PlayerPipeline};

/// How often the audio thread looks at the sink when idle
const WATCH_INTERVAL: Duration = Duration::from_millis(50);

enum Op {
    SetSource(PathBuf),
    SetNextSource(PathBuf),
    SetState(PipelineState),
    Seek(Duration),
    SetVolume(f32),
    Position,
    Shutdown,
}

enum Answer {
    Done,
    Position(Option<Duration>),
}

struct Request {
    op: Op,
    reply: Sender<Result<Answer, PipelineError>>,
}

/// Handle to the audio thread
pub struct RodioPipeline {
    op_tx: Sender<Request>,
    state: PipelineState,
    thread: Option<JoinHandle<()>>,
}

impl RodioPipeline {
    /// Open the default output device on a new audio thread.
    ///
    /// `about_to_finish` is how long before the end of a source the bus gets
    /// [`PlayerEvent::AboutToFinish`].
    pub fn spawn(about_to_finish: Duration, bus: Bus<PlayerEvent>) -> anyhow::Result<Self> {
        let (op_tx, op_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match AudioThread::try_new_default(about_to_finish, bus) {
                Ok(audio) => {
                    let _ = ready_tx.send(Ok(()));
                    audio.run(op_rx);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("Cannot spawn audio thread")?;

        ready_rx
            .recv()
            .context("Audio thread exited during startup")??;

        Ok(Self {
            op_tx,
            state: PipelineState::Null,
            thread: Some(thread),
        })
    }

    fn request(&self, op: Op) -> Result<Answer, PipelineError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.op_tx
            .send(Request { op, reply: reply_tx })
            .map_err(|_| PipelineError::Disconnected)?;
        reply_rx.recv().map_err(|_| PipelineError::Disconnected)?
    }
}

impl PlayerPipeline for RodioPipeline {
    fn set_source(&mut self, path: &Path) -> Result<(), PipelineError> {
        self.request(Op::SetSource(path.to_path_buf())).map(|_| ())
    }

    fn set_next_source(&mut self, path: &Path) -> Result<(), PipelineError> {
        self.request(Op::SetNextSource(path.to_path_buf())).map(|_| ())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        let result = self.request(Op::SetState(state)).map(|_| ());
        self.state = match result {
            Ok(()) => state,
            // the audio thread clears the sink when loading fails
            Err(_) => PipelineState::Null,
        };
        result
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn position(&self) -> Option<Duration> {
        match self.request(Op::Position) {
            Ok(Answer::Position(position)) => position,
            _ => None,
        }
    }

    fn seek(&mut self, position: Duration) -> Result<(), PipelineError> {
        self.request(Op::Seek(position)).map(|_| ())
    }

    fn set_volume(&mut self, volume: f64) {
        if let Err(err) = self.request(Op::SetVolume(volume as f32)) {
            log::error!("Cannot set volume: {}", err);
        }
    }
}

impl Drop for RodioPipeline {
    fn drop(&mut self) {
        let _ = self.request(Op::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Owns the output stream and the sink; never leaves the audio thread.
struct AudioThread {
    _stream: OutputStream,
    sink: Sink,
    source: Option<PathBuf>,
    /// Whether `source` has been appended to the sink
    loaded: bool,
    /// Durations of the sources in the sink, front is the one heard
    durations: VecDeque<Option<Duration>>,
    state: PipelineState,
    lead: Duration,
    about_to_finish_sent: bool,
    eos_sent: bool,
    bus: Bus<PlayerEvent>,
}

impl AudioThread {
    fn try_new_default(lead: Duration, bus: Bus<PlayerEvent>) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No default output device found")?;

        let device_name = device.name().unwrap_or_else(|_| "(unknown)".to_string());

        let stream_builder = OutputStreamBuilder::from_device(device)
            .context("cannot create output stream builder from device")?;

        let stream = stream_builder.open_stream().context("Cannot create stream output")?;

        let sink = Sink::connect_new(&stream.mixer());
        sink.pause();
        log::info!("Audio output opened on {}", device_name);

        Ok(AudioThread {
            _stream: stream,
            sink,
            source: None,
            loaded: false,
            durations: VecDeque::new(),
            state: PipelineState::Null,
            lead,
            about_to_finish_sent: false,
            eos_sent: false,
            bus,
        })
    }

    fn run(mut self, op_rx: Receiver<Request>) {
        loop {
            match op_rx.recv_timeout(WATCH_INTERVAL) {
                Ok(Request {
                    op: Op::Shutdown,
                    reply,
                }) => {
                    self.sink.clear();
                    let _ = reply.send(Ok(Answer::Done));
                    break;
                }
                Ok(Request { op, reply }) => {
                    let _ = reply.send(self.apply(op));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.watch();
        }
        log::debug!("Audio thread finished");
    }

    fn apply(&mut self, op: Op) -> Result<Answer, PipelineError> {
        match op {
            Op::SetSource(path) => {
                self.source = Some(path);
            }
            Op::SetNextSource(path) => {
                self.append(&path)?;
            }
            Op::SetState(state) => self.set_state(state)?,
            Op::Seek(position) => {
                self.sink
                    .try_seek(position)
                    .map_err(|e| PipelineError::Seek(e.to_string()))?;
            }
            Op::SetVolume(volume) => self.sink.set_volume(volume),
            Op::Position => {
                let position = self.loaded.then(|| self.sink.get_pos());
                return Ok(Answer::Position(position));
            }
            Op::Shutdown => {}
        }
        Ok(Answer::Done)
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        match state {
            PipelineState::Null | PipelineState::Ready | PipelineState::VoidPending => {
                self.unload();
            }
            PipelineState::Paused | PipelineState::Playing => {
                if !self.loaded {
                    let path = self.source.clone().ok_or(PipelineError::NoSource)?;
                    if let Err(err) = self.append(&path) {
                        self.unload();
                        self.state = PipelineState::Null;
                        return Err(err);
                    }
                    self.loaded = true;
                    self.eos_sent = false;
                    self.about_to_finish_sent = false;
                }
                if state == PipelineState::Playing {
                    self.sink.play();
                } else {
                    self.sink.pause();
                }
            }
        }
        log::debug!("Output {} -> {}", self.state, state);
        self.state = state;
        Ok(())
    }

    fn append(&mut self, path: &Path) -> Result<(), PipelineError> {
        let file = File::open(path).map_err(|source| PipelineError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let decoder = Decoder::try_from(file).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.durations.push_back(decoder.total_duration());
        self.sink.append(decoder);
        Ok(())
    }

    fn unload(&mut self) {
        self.bus.flush();
        self.sink.clear();
        self.durations.clear();
        self.loaded = false;
        self.about_to_finish_sent = false;
        self.eos_sent = false;
    }

    /// Post bus events for what happened in the sink since the last look.
    fn watch(&mut self) {
        if !self.loaded || self.state != PipelineState::Playing {
            return;
        }

        // sources that finished since the last look
        while self.durations.len() > self.sink.len() {
            self.durations.pop_front();
            self.about_to_finish_sent = false;
        }

        if self.sink.empty() {
            if !self.eos_sent {
                self.eos_sent = true;
                self.bus.post_now(PlayerEvent::EndOfStream);
            }
            return;
        }

        if self.about_to_finish_sent || self.durations.len() != 1 {
            return;
        }
        if let Some(Some(total)) = self.durations.front() {
            if total.saturating_sub(self.sink.get_pos()) <= self.lead {
                self.about_to_finish_sent = true;
                self.bus.post_now(PlayerEvent::AboutToFinish);
            }
        }
    }
}
