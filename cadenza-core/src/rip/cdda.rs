//! Rip pipeline built from `cdparanoia` and `flac`.
//!
//! `cdparanoia -w <track> -` writes the track as WAV to its stdout and
//! `flac -s -f -o <location> -` encodes from its stdin. A copy thread moves
//! the PCM between the two, counting bytes against the track length from the
//! table of contents for progress.

use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::engine::Bus;
use crate::error::PipelineError;
use crate::protocol::PipelineState;

use super::pipeline::{RipEvent, RipPipeline};

const SECTORS_PER_SECOND: u64 = 75;
const SECTOR_BYTES: u64 = 2352;
const WAV_HEADER_BYTES: u64 = 44;
const COPY_BUFFER: usize = 64 * 1024;
/// How often the copy thread checks whether the tools have exited
const REAP_INTERVAL: Duration = Duration::from_millis(20);

/// External programs and the drive used for ripping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipTools {
    pub cdparanoia: PathBuf,
    pub flac: PathBuf,
    pub device: String,
}

impl RipTools {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cdparanoia: config.cdparanoia.clone(),
            flac: config.flac.clone(),
            device: config.cd_device.clone(),
        }
    }
}

/// One audio track in a disc's table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// One-based, as numbered on the disc
    pub track: u32,
    pub sectors: u64,
}

impl TocEntry {
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.sectors * 1_000_000_000 / SECTORS_PER_SECOND)
    }

    /// Size of the track as 16-bit stereo PCM
    pub fn pcm_bytes(&self) -> u64 {
        self.sectors * SECTOR_BYTES
    }
}

/// Parse the report of `cdparanoia -Q`.
///
/// Track rows look like `  3.    16503 [03:40.03]  ...`; headers, rulers
/// and the `TOTAL` row are skipped.
pub fn parse_toc(report: &str) -> Vec<TocEntry> {
    report
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let track = fields.next()?.strip_suffix('.')?.parse().ok()?;
            let sectors = fields.next()?.parse().ok()?;
            Some(TocEntry { track, sectors })
        })
        .collect()
}

/// Query the table of contents of the disc in the drive. Blocks while the
/// drive spins up.
pub fn read_toc(tools: &RipTools) -> Result<Vec<TocEntry>, PipelineError> {
    let output = Command::new(&tools.cdparanoia)
        .arg("-d")
        .arg(&tools.device)
        .arg("-Q")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| tool_error(&tools.cdparanoia, e.to_string()))?;

    // cdparanoia reports on stderr
    let report = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(tool_error(&tools.cdparanoia, report.trim().to_string()));
    }
    let toc = parse_toc(&report);
    if toc.is_empty() {
        return Err(tool_error(&tools.cdparanoia, "no audio tracks on disc".into()));
    }
    Ok(toc)
}

fn tool_error(tool: &Path, message: String) -> PipelineError {
    PipelineError::Tool {
        tool: tool.display().to_string(),
        message,
    }
}

#[derive(Debug, Default)]
struct Progress {
    read: AtomicU64,
    total: AtomicU64,
}

impl Progress {
    fn fraction(&self) -> Option<f64> {
        let total = self.total.load(Ordering::Relaxed);
        (total > 0).then(|| self.read.load(Ordering::Relaxed) as f64 / total as f64)
    }
}

/// Child processes of the track being ripped
#[derive(Debug, Default)]
struct Job {
    cancelled: bool,
    children: Vec<Child>,
}

fn lock(job: &Mutex<Job>) -> MutexGuard<'_, Job> {
    job.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Outcome {
    Finished,
    Cancelled,
}

pub struct CddaPipeline {
    tools: RipTools,
    track: u32,
    location: Option<PathBuf>,
    state: PipelineState,
    job: Option<Arc<Mutex<Job>>>,
    progress: Option<Arc<Progress>>,
    bus: Bus<RipEvent>,
}

impl CddaPipeline {
    pub fn new(tools: RipTools, bus: Bus<RipEvent>) -> Self {
        Self {
            tools,
            track: 1,
            location: None,
            state: PipelineState::Null,
            job: None,
            progress: None,
            bus,
        }
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        let location = self.location.clone().ok_or(PipelineError::NoSource)?;
        let job = Arc::new(Mutex::new(Job::default()));
        let progress = Arc::new(Progress::default());

        let worker = TrackCopy {
            tools: self.tools.clone(),
            track: self.track,
            location,
            job: Arc::clone(&job),
            progress: Arc::clone(&progress),
            bus: self.bus.clone(),
            epoch: self.bus.epoch(),
        };
        thread::Builder::new()
            .name(format!("rip-track-{}", self.track))
            .spawn(move || worker.run())?;

        self.job = Some(job);
        self.progress = Some(progress);
        Ok(())
    }

    /// Kill the running track, if any. Once this returns nothing of that
    /// track writes to disk or reaches the bus.
    fn halt(&mut self) {
        self.progress = None;
        if let Some(job) = self.job.take() {
            let mut job = lock(&job);
            job.cancelled = true;
            for child in &mut job.children {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
        self.bus.flush();
    }
}

impl RipPipeline for CddaPipeline {
    fn set_track(&mut self, track: u32) {
        self.track = track;
    }

    fn set_location(&mut self, path: &Path) {
        self.location = Some(path.to_path_buf());
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        match state {
            PipelineState::Playing if self.state == PipelineState::Playing => {}
            PipelineState::Playing => self.start()?,
            PipelineState::Paused => {
                return Err(PipelineError::Output("a rip cannot be paused".into()));
            }
            PipelineState::Null | PipelineState::Ready | PipelineState::VoidPending => self.halt(),
        }
        log::debug!("Rip pipeline {} -> {}", self.state, state);
        self.state = state;
        Ok(())
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn progress(&self) -> Option<f64> {
        self.progress.as_ref().and_then(|p| p.fraction())
    }
}

impl Drop for CddaPipeline {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Everything the copy thread needs for one track
struct TrackCopy {
    tools: RipTools,
    track: u32,
    location: PathBuf,
    job: Arc<Mutex<Job>>,
    progress: Arc<Progress>,
    bus: Bus<RipEvent>,
    epoch: u64,
}

impl TrackCopy {
    fn run(self) {
        let event = match self.copy() {
            Ok(Outcome::Finished) => RipEvent::EndOfStream,
            Ok(Outcome::Cancelled) => return,
            Err(err) => RipEvent::Error(err.to_string()),
        };
        self.bus.post(self.epoch, event);
    }

    fn copy(&self) -> Result<Outcome, PipelineError> {
        let toc = read_toc(&self.tools)?;
        let entry = toc
            .iter()
            .find(|e| e.track == self.track)
            .ok_or_else(|| {
                tool_error(&self.tools.cdparanoia, format!("disc has no track {}", self.track))
            })?;
        self.progress
            .total
            .store(entry.pcm_bytes() + WAV_HEADER_BYTES, Ordering::Relaxed);
        self.bus.post(
            self.epoch,
            RipEvent::Toc {
                track_count: toc.len() as u32,
            },
        );

        let (mut pcm, mut encoder_input, diagnostics) = {
            let mut job = lock(&self.job);
            if job.cancelled {
                return Ok(Outcome::Cancelled);
            }
            let mut source = self.spawn_source()?;
            let mut encoder = match self.spawn_encoder() {
                Ok(encoder) => encoder,
                Err(err) => {
                    let _ = source.kill();
                    let _ = source.wait();
                    return Err(err);
                }
            };
            let pcm = source.stdout.take();
            let input = encoder.stdin.take();
            let diagnostics = [
                collect_stderr(source.stderr.take()),
                collect_stderr(encoder.stderr.take()),
            ];
            job.children.push(source);
            job.children.push(encoder);
            match (pcm, input) {
                (Some(pcm), Some(input)) => (pcm, input, diagnostics),
                _ => return Err(PipelineError::Disconnected),
            }
        };

        let mut buffer = vec![0u8; COPY_BUFFER];
        loop {
            let n = match pcm.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            encoder_input.write_all(&buffer[..n])?;
            self.progress.read.fetch_add(n as u64, Ordering::Relaxed);
        }
        drop(encoder_input);

        // The children stay in the job while flac finalizes so a halt can
        // still kill them; the lock is only held to look.
        let statuses = loop {
            {
                let mut job = lock(&self.job);
                if job.cancelled {
                    return Ok(Outcome::Cancelled);
                }
                if let Some(statuses) = exit_statuses(&mut job.children)? {
                    job.children.clear();
                    break statuses;
                }
            }
            thread::sleep(REAP_INTERVAL);
        };

        let tools = [&self.tools.cdparanoia, &self.tools.flac];
        for ((status, tool), diagnostic) in statuses.into_iter().zip(tools).zip(diagnostics) {
            if !status.success() {
                let stderr = diagnostic.join().unwrap_or_default();
                let message = match stderr.trim() {
                    "" => status.to_string(),
                    text => text.to_string(),
                };
                return Err(tool_error(tool, message));
            }
        }
        Ok(Outcome::Finished)
    }

    fn spawn_source(&self) -> Result<Child, PipelineError> {
        Command::new(&self.tools.cdparanoia)
            .arg("-q")
            .arg("-d")
            .arg(&self.tools.device)
            .arg("-w")
            .arg(self.track.to_string())
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| tool_error(&self.tools.cdparanoia, e.to_string()))
    }

    fn spawn_encoder(&self) -> Result<Child, PipelineError> {
        Command::new(&self.tools.flac)
            .arg("-s")
            .arg("-f")
            .arg("-o")
            .arg(&self.location)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| tool_error(&self.tools.flac, e.to_string()))
    }
}

/// Exit status of every child, or `None` while any of them still runs.
fn exit_statuses(children: &mut [Child]) -> io::Result<Option<Vec<ExitStatus>>> {
    let mut statuses = Vec::with_capacity(children.len());
    for child in children {
        match child.try_wait()? {
            Some(status) => statuses.push(status),
            None => return Ok(None),
        }
    }
    Ok(Some(statuses))
}

/// Drain a child's stderr on its own thread so a chatty tool never blocks
/// on a full pipe.
fn collect_stderr(stderr: Option<ChildStderr>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut bytes);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}
