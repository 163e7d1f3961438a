//! Monitor lifecycle
//!
//! Wires the raw-socket capture loop to the reconstruction engine and runs
//! the background tasks until shutdown.

use crate::capture::EventReceiver;
use crate::config::Config;
use crate::engine::{run_reaper, Engine};
use crate::flow::Fragment;
use crate::stats::MonitorStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn the tasks draining the event and fragment channels into `engine`
///
/// Each task stops on shutdown or once its channel closes.
pub fn spawn_consumers(
    engine: Arc<Engine>,
    mut events: EventReceiver,
    mut fragments: mpsc::Receiver<Fragment>,
    shutdown_rx: &broadcast::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let event_engine = engine.clone();
    let mut event_shutdown = shutdown_rx.resubscribe();
    let event_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = event_shutdown.recv() => break,
                event = events.recv() => match event {
                    Some(event) => event_engine.ingest_auth_event(&event),
                    None => break,
                },
            }
        }
        debug!("Auth event consumer stopped");
    });

    let mut fragment_shutdown = shutdown_rx.resubscribe();
    let fragment_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = fragment_shutdown.recv() => break,
                fragment = fragments.recv() => match fragment {
                    Some(fragment) => engine.ingest_fragment(&fragment),
                    None => break,
                },
            }
        }
        debug!("Fragment consumer stopped");
    });

    vec![event_task, fragment_task]
}

/// Log a stats snapshot every `interval` until shutdown
pub async fn run_status_reporter(
    stats: Arc<MonitorStats>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(interval) => log_status(&stats),
        }
    }
}

fn log_status(stats: &MonitorStats) {
    let s = stats.snapshot();
    info!(
        "Status: frames={}, matched={}, malformed={}, events={}, events_dropped={}, fragments_dropped={}, cache={}, cache_rejected={}, sessions={}, credentials={}, reaped={}, reports={}, suppressed={}",
        s.frames_seen,
        s.payloads_matched,
        s.frames_malformed,
        s.events_emitted,
        s.events_dropped,
        s.fragments_dropped,
        s.cache_entries,
        s.cache_rejected,
        s.active_sessions,
        s.credentials_recovered,
        s.sessions_reaped,
        s.reports_emitted,
        s.reports_suppressed
    );
}

/// Capture on the configured interface until shutdown
#[cfg(target_os = "linux")]
pub async fn run_monitor(
    config: Config,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> anyhow::Result<()> {
    use crate::capture::{event_channel, lossy_channel, Capture, RawSocket};
    use crate::clock::SystemClock;
    use crate::engine::sink_from_config;
    use anyhow::Context;
    use std::sync::atomic::{AtomicBool, Ordering};

    let stats = Arc::new(MonitorStats::new());
    let engine = Arc::new(Engine::new(
        &config.engine,
        &config.report,
        sink_from_config(&config.report),
        Arc::new(SystemClock),
        stats.clone(),
    ));

    let socket = RawSocket::open(config.capture.interface.as_deref())?;
    let (event_tx, event_rx) = event_channel(config.capture.event_capacity);
    let (fragment_tx, fragment_rx) = lossy_channel(config.capture.fragment_capacity);
    let capture = Capture::new(&config.capture, event_tx, fragment_tx, stats.clone());

    let mut tasks = spawn_consumers(engine.clone(), event_rx, fragment_rx, &shutdown_rx);
    tasks.push(tokio::spawn(run_reaper(
        engine.clone(),
        config.engine.reap_interval(),
        shutdown_rx.resubscribe(),
    )));
    tasks.push(tokio::spawn(run_status_reporter(
        stats.clone(),
        config.status.interval(),
        shutdown_rx.resubscribe(),
    )));

    info!(
        "Watching ports {:?} on {}",
        config.capture.port_set().ports(),
        config.capture.interface.as_deref().unwrap_or("all interfaces")
    );

    let stop = Arc::new(AtomicBool::new(false));
    let capture_stop = stop.clone();
    let mut capture_task =
        tokio::task::spawn_blocking(move || capture.run_blocking(socket, capture_stop));

    let finished = tokio::select! {
        _ = shutdown_rx.recv() => None,
        result = &mut capture_task => Some(result),
    };
    stop.store(true, Ordering::Relaxed);
    let result = match finished {
        Some(result) => result,
        None => {
            info!("Stopping capture");
            capture_task.await
        }
    };

    for task in tasks {
        task.abort();
    }
    log_status(&stats);

    result.context("Capture thread panicked")??;
    Ok(())
}

/// Raw packet capture is only available on Linux
#[cfg(not(target_os = "linux"))]
pub async fn run_monitor(
    _config: Config,
    _shutdown_rx: broadcast::Receiver<bool>,
) -> anyhow::Result<()> {
    anyhow::bail!("Raw packet capture requires Linux")
}
