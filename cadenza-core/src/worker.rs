//! One-shot worker subprocess.
//!
//! The controller sends a single [`WorkerTask`] as a JSON line on the
//! worker's stdin, closes it, and reads a single `[ok, value]` line back:
//! `[true, output]` on success, `[false, "message"]` on failure. Only the
//! most recent call delivers its result.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::browser::{FileEntry, get_directory_content};
use crate::config::Config;
use crate::library::Library;
use crate::metadata::TrackMetadata;
use crate::protocol::TrackId;
use crate::rip::{RipTools, TocEntry, read_toc};

/// Work that runs in a throwaway process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "kebab-case")]
pub enum WorkerTask {
    ProbeFile { path: PathBuf },
    ListDirectory { path: PathBuf },
    DiscFiles { uuid: String, disc_num: u32 },
    /// `None` reads the configured drive
    ReadToc { device: Option<String> },
}

/// A track file of a ripped or imported disc, ready for `append-queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscFile {
    pub track_num: u32,
    pub path: PathBuf,
    pub duration_ns: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum WorkerOutput {
    Metadata(TrackMetadata),
    Directory(Vec<FileEntry>),
    DiscFiles(Vec<DiscFile>),
    Toc(Vec<TocEntry>),
}

/// Runs tasks in `<program> <args>` processes.
#[derive(Debug, Clone)]
pub struct Worker {
    program: PathBuf,
    args: Vec<OsString>,
    generation: Arc<AtomicU64>,
}

impl Worker {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `task` in a new worker process and pass its result to `on_result`.
    ///
    /// Supersedes every earlier call: their handlers are never invoked and
    /// their processes are left to exit on their own. Must be called from
    /// within a tokio runtime.
    pub fn do_in_subprocess<F>(&self, task: WorkerTask, on_result: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<WorkerOutput, String>) + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let current = Arc::clone(&self.generation);
        let program = self.program.clone();
        let args = self.args.clone();

        tokio::spawn(async move {
            let result = run_remote(&program, &args, &task).await;
            if current.load(Ordering::Acquire) != generation {
                log::debug!("Dropping result of superseded {:?}", task);
                return;
            }
            on_result(result);
        })
    }

    /// Drop the result of the call in flight, if any.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

async fn run_remote(
    program: &Path,
    args: &[OsString],
    task: &WorkerTask,
) -> Result<WorkerOutput, String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            log::error!("Cannot spawn worker {}: {}", program.display(), e);
            format!("cannot spawn {}: {}", program.display(), e)
        })?;

    let mut line = serde_json::to_string(task).map_err(|e| e.to_string())?;
    line.push('\n');
    if let Some(mut stdin) = child.stdin.take() {
        // a worker that died early shows up as undecodable output below
        if let Err(err) = stdin.write_all(line.as_bytes()).await {
            log::warn!("Cannot send task to worker: {}", err);
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| format!("cannot wait for worker: {}", e))?;
    decode_result(&output.stdout)
}

fn decode_result(stdout: &[u8]) -> Result<WorkerOutput, String> {
    let (ok, value): (bool, Value) = serde_json::from_slice(stdout)
        .map_err(|e| format!("bad worker output: {}", e))?;
    if ok {
        serde_json::from_value(value).map_err(|e| format!("bad worker output: {}", e))
    } else {
        Err(match value {
            Value::String(message) => message,
            other => other.to_string(),
        })
    }
}

/// Run one task in this process.
pub fn run_task(task: WorkerTask, config: &Config) -> anyhow::Result<WorkerOutput> {
    match task {
        WorkerTask::ProbeFile { path } => TrackMetadata::probe(&path).map(WorkerOutput::Metadata),
        WorkerTask::ListDirectory { path } => get_directory_content(&path, &config.codecs)
            .with_context(|| format!("cannot list {}", path.display()))
            .map(WorkerOutput::Directory),
        WorkerTask::DiscFiles { uuid, disc_num } => {
            disc_files(&Library::from_config(config), &uuid, disc_num).map(WorkerOutput::DiscFiles)
        }
        WorkerTask::ReadToc { device } => {
            let mut tools = RipTools::from_config(config);
            if let Some(device) = device {
                tools.device = device;
            }
            Ok(WorkerOutput::Toc(read_toc(&tools)?))
        }
    }
}

fn disc_files(library: &Library, uuid: &str, disc_num: u32) -> anyhow::Result<Vec<DiscFile>> {
    let tracks = library
        .disc_tracks(uuid, disc_num)
        .with_context(|| format!("cannot read disc {} of {}", disc_num, uuid))?;

    let mut files = Vec::with_capacity(tracks.len());
    for track_num in tracks {
        let Some(path) = library.best_version(uuid, TrackId::new(disc_num, track_num)) else {
            continue;
        };
        let duration_ns = match TrackMetadata::probe(&path) {
            Ok(metadata) => metadata.duration_ns,
            Err(err) => {
                log::warn!("{:#}", err);
                0
            }
        };
        files.push(DiscFile {
            track_num,
            path,
            duration_ns,
        });
    }
    Ok(files)
}

/// Serve exactly one task: read it from `input`, write its result line to
/// `output`.
pub async fn serve<R, W>(config: &Config, mut input: R, mut output: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut request = String::new();
    input
        .read_to_string(&mut request)
        .await
        .context("cannot read worker task")?;

    let result = match serde_json::from_str::<WorkerTask>(request.trim()) {
        Ok(task) => {
            log::debug!("Worker task: {:?}", task);
            let config = config.clone();
            tokio::task::spawn_blocking(move || run_task(task, &config))
                .await
                .context("worker task panicked")?
        }
        Err(err) => Err(anyhow::Error::new(err).context("malformed worker task")),
    };

    let encoded = result.and_then(|value| {
        serde_json::to_value(&value).context("cannot encode worker output")
    });
    let reply = match encoded {
        Ok(value) => Value::Array(vec![Value::Bool(true), value]),
        Err(err) => {
            log::warn!("Worker task failed: {:#}", err);
            Value::Array(vec![Value::Bool(false), Value::String(format!("{:#}", err))])
        }
    };
    let mut line = reply.to_string();
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}
