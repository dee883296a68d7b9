use std::env::args;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use inroads::{
    CancelToken, CounterId, IndicatifSurface, RenderOptions, Renderer, TrackError, Tracker,
};
use rand::Rng;

const KIB: u64 = 1024;

/// Simulated download demo: a fixed pool of workers drains a queue of fake
/// files, each reporting per-file progress plus shared file and byte
/// counters, while the renderer repaints everything ten times a second.
///
/// Usage: inroads [workers] [files] [cancel-after-ms]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let workers: usize = args().nth(1).and_then(|v| v.parse().ok()).unwrap_or(4);
    let files: u64 = args().nth(2).and_then(|v| v.parse().ok()).unwrap_or(12);
    let cancel_after: Option<u64> = args().nth(3).and_then(|v| v.parse().ok());

    let tracker = Tracker::new();
    let renderer = Renderer::new(
        tracker.clone(),
        IndicatifSurface::new(),
        RenderOptions::default(),
    );
    renderer.sink().install()?;

    let files_counter = tracker.counter("FILES", files);
    let bytes_counter = tracker.byte_counter("BYTES", 0);
    renderer.start()?;

    let cancel = CancelToken::new();
    if let Some(ms) = cancel_after {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(ms));
            log::warn!("cancelling remaining downloads");
            cancel.cancel();
        });
    }

    let (queue, jobs) = mpsc::channel::<(u64, u64)>();
    let mut rng = rand::thread_rng();
    for n in 0..files {
        queue.send((n, rng.gen_range(256 * KIB..4096 * KIB)))?;
    }
    drop(queue);
    let jobs = Arc::new(Mutex::new(jobs));

    thread::scope(|s| {
        for _ in 0..workers {
            let tracker = &tracker;
            let cancel = &cancel;
            let jobs = jobs.clone();
            s.spawn(move || loop {
                let job = jobs.lock().unwrap().recv();
                let Ok((n, size)) = job else { break };
                if let Err(e) =
                    download(tracker, files_counter, bytes_counter, cancel, n, size)
                {
                    log::error!("file-{n:02}.bin: lost track of progress: {e}");
                }
            });
        }
    });

    renderer.stop()?;
    let snap = tracker.snapshot();
    log::info!(
        "transferred {} of {} files",
        snap.counter(files_counter).map_or(0, |c| c.current),
        files,
    );
    Ok(())
}

fn download(
    tracker: &Tracker,
    files_counter: CounterId,
    bytes_counter: CounterId,
    cancel: &CancelToken,
    n: u64,
    size: u64,
) -> Result<(), TrackError> {
    let name = format!("file-{n:02}.bin");
    let task = tracker.byte_task(&name, Some(size));
    // The total amount of work grows as file sizes become known.
    tracker.grow_counter_total(bytes_counter, size)?;
    log::info!("{name}: starting ({size} bytes)");

    let mut rng = rand::thread_rng();
    let mut done = 0;
    while done < size {
        if cancel.is_cancelled() {
            tracker.abandon(task)?;
            log::warn!("{name}: cancelled");
            return Ok(());
        }
        thread::sleep(Duration::from_millis(rng.gen_range(5..30)));
        if rng.gen_ratio(1, 400) {
            tracker.abandon(task)?;
            log::warn!("{name}: connection reset, giving up");
            return Ok(());
        }
        let chunk = rng.gen_range(32 * KIB..256 * KIB).min(size - done);
        tracker.advance(task, chunk)?;
        tracker.add(bytes_counter, chunk)?;
        done += chunk;
    }

    tracker.complete(task)?;
    tracker.add(files_counter, 1)?;
    log::info!("{name}: done");
    Ok(())
}
