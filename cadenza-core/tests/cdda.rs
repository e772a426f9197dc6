#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use cadenza_core::rip::{CddaPipeline, RipEvent, RipPipeline, RipTools};
use cadenza_core::{BusReceiver, PipelineState, bus};
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(10);
const PCM_BYTES: u64 = 4096;

/// Scripts are written and executed one test at a time: a fork in another
/// thread while a script is still open for writing makes exec fail.
static SERIAL: Mutex<()> = Mutex::new(());

const CDPARANOIA: &str = r#"#!/bin/sh
case "$*" in
  *-Q*) cat >&2 <<'TOC'
Table of contents (audio tracks only):
track        length               begin        copy pre ch
===========================================================
  1.       10 [00:00.10]        0 [00:00.00]    no   no  2
  2.       20 [00:00.20]       10 [00:00.10]    no   no  2
TOTAL      30 [00:00.30]    (audio only)
TOC
  ;;
  *) head -c 4096 /dev/zero ;;
esac
"#;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn tools(dir: &Path, flac_body: &str) -> RipTools {
    RipTools {
        cdparanoia: script(dir, "cdparanoia", CDPARANOIA),
        flac: script(dir, "flac", flac_body),
        device: "/dev/null".to_string(),
    }
}

async fn next_event(events: &mut BusReceiver<RipEvent>) -> RipEvent {
    timeout(WAIT, events.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn rips_one_track_through_the_tools() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let tools = tools(dir.path(), "#!/bin/sh\ncat > \"$4\"\n");
    let staging = dir.path().join("01.flac.part");

    let (rip_bus, mut events) = bus::<RipEvent>();
    let mut pipeline = CddaPipeline::new(tools, rip_bus);
    pipeline.set_track(2);
    pipeline.set_location(&staging);
    pipeline.set_state(PipelineState::Playing).unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        RipEvent::Toc { track_count: 2 }
    ));
    assert!(matches!(next_event(&mut events).await, RipEvent::EndOfStream));
    assert_eq!(fs::metadata(&staging).unwrap().len(), PCM_BYTES);
    let fraction = pipeline.progress().unwrap();
    assert!(fraction > 0.0 && fraction < 1.0);

    pipeline.set_state(PipelineState::Null).unwrap();
}

#[tokio::test]
async fn stop_does_not_wait_for_the_encoder_to_finish() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let tools = tools(dir.path(), "#!/bin/sh\ncat > \"$4\"\nexec sleep 30\n");
    let staging = dir.path().join("00.flac.part");

    let (rip_bus, mut events) = bus::<RipEvent>();
    let mut pipeline = CddaPipeline::new(tools, rip_bus);
    pipeline.set_track(1);
    pipeline.set_location(&staging);
    pipeline.set_state(PipelineState::Playing).unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        RipEvent::Toc { track_count: 2 }
    ));

    // Wait until all PCM has passed and only the encoder is left running.
    let deadline = Instant::now() + WAIT;
    while fs::metadata(&staging).map(|m| m.len()).unwrap_or(0) < PCM_BYTES {
        assert!(Instant::now() < deadline, "encoder never received the track");
        sleep(Duration::from_millis(20)).await;
    }
    sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    pipeline.set_state(PipelineState::Null).unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(
        timeout(Duration::from_millis(300), events.recv())
            .await
            .is_err()
    );
}
