//! # Telemetry Blackboard
//!
//! Thread-safe progress tracking for the bootstrap pipelines.
//! Atomic counters are bumped by the orchestrator between rounds and read by a
//! background heartbeat thread that prints progress, ETA and stall warnings.
//!
//! The blackboard also carries the interrupt flag: any thread may call
//! [`TelemetryBlackboard::request_cancel`], and the orchestrator polls
//! [`TelemetryBlackboard::is_cancelled`] before every round.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Processing stage for high-level progress tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Initializing = 0,
    LoadingData = 1,
    Ranking = 2,
    Correlating = 3,
    Scoring = 4,
    WritingOutput = 5,
    Complete = 6,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initializing => "Initializing",
            Stage::LoadingData => "Loading Data",
            Stage::Ranking => "Ranking",
            Stage::Correlating => "Correlating",
            Stage::Scoring => "Scoring",
            Stage::WritingOutput => "Writing Output",
            Stage::Complete => "Complete",
        }
    }

    fn from_u64(val: u64) -> Self {
        match val {
            0 => Stage::Initializing,
            1 => Stage::LoadingData,
            2 => Stage::Ranking,
            3 => Stage::Correlating,
            4 => Stage::Scoring,
            5 => Stage::WritingOutput,
            _ => Stage::Complete,
        }
    }
}

/// Shared run state, designed for cheap atomic updates.
///
/// Counters use relaxed ordering; the heartbeat only needs approximate values.
/// The cancel and shutdown flags use `SeqCst`.
pub struct TelemetryBlackboard {
    stage: AtomicU64,

    // rounds include the observed round 0
    rounds_completed: AtomicU64,
    total_rounds: AtomicU64,
    items_per_round: AtomicU64,

    start_time: Instant,
    last_progress_nanos: AtomicU64,

    cancel: AtomicBool,
    shutdown: AtomicBool,
}

impl TelemetryBlackboard {
    /// Create a new telemetry blackboard
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u64, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        Stage::from_u64(self.stage.load(Ordering::Relaxed))
    }

    /// Announce a new pipeline run of `total_rounds` rounds over `items` pairs or sources
    pub fn begin_rounds(&self, total_rounds: u64, items: u64) {
        self.rounds_completed.store(0, Ordering::Relaxed);
        self.total_rounds.store(total_rounds, Ordering::Relaxed);
        self.items_per_round.store(items, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn round_done(&self) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        self.touch_progress();
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed.load(Ordering::Relaxed)
    }

    pub fn total_rounds(&self) -> u64 {
        self.total_rounds.load(Ordering::Relaxed)
    }

    /// Raise the interrupt flag; the running pipeline stops before its next round.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    #[inline]
    fn touch_progress(&self) {
        let elapsed = self.start_time.elapsed().as_nanos() as u64;
        self.last_progress_nanos.store(elapsed, Ordering::Relaxed);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            stage: self.stage(),
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
            total_rounds: self.total_rounds.load(Ordering::Relaxed),
            items_per_round: self.items_per_round.load(Ordering::Relaxed),
            elapsed_secs: self.elapsed_secs(),
            last_progress_nanos: self.last_progress_nanos.load(Ordering::Relaxed),
            current_nanos: self.start_time.elapsed().as_nanos() as u64,
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Default for TelemetryBlackboard {
    fn default() -> Self {
        Self {
            stage: AtomicU64::new(Stage::Initializing as u64),
            rounds_completed: AtomicU64::new(0),
            total_rounds: AtomicU64::new(0),
            items_per_round: AtomicU64::new(0),
            start_time: Instant::now(),
            last_progress_nanos: AtomicU64::new(0),
            cancel: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }
}

struct TelemetrySnapshot {
    stage: Stage,
    rounds_completed: u64,
    total_rounds: u64,
    items_per_round: u64,
    elapsed_secs: f64,
    last_progress_nanos: u64,
    current_nanos: u64,
}

/// Heartbeat output configuration
pub struct HeartbeatConfig {
    /// Interval between heartbeats (seconds)
    pub interval_secs: u64,
    /// Stall warning threshold (seconds with no progress)
    pub stall_threshold_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            stall_threshold_secs: 300,
        }
    }
}

/// Handle to the heartbeat thread
pub struct HeartbeatHandle {
    handle: Option<JoinHandle<()>>,
    blackboard: Arc<TelemetryBlackboard>,
}

impl HeartbeatHandle {
    /// Spawn the heartbeat thread
    pub fn spawn(blackboard: Arc<TelemetryBlackboard>, config: HeartbeatConfig) -> io::Result<Self> {
        let bb = blackboard.clone();
        let is_tty = io::stderr().is_terminal();

        let handle = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || heartbeat_loop(bb, config, is_tty))?;

        Ok(Self {
            handle: Some(handle),
            blackboard,
        })
    }

    /// Signal shutdown and wait for thread to finish
    pub fn shutdown(mut self) {
        self.blackboard.signal_shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        // signal only; joining here could block an unwinding thread
        self.blackboard.signal_shutdown();
    }
}

/// Format duration in human-readable form
fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.0}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs % 60.0;
        format!("{:.0}m{:.0}s", mins, remaining_secs)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

fn heartbeat_loop(bb: Arc<TelemetryBlackboard>, config: HeartbeatConfig, is_tty: bool) {
    let interval = Duration::from_secs(config.interval_secs);
    let tick = Duration::from_millis(100).min(interval);
    let mut last_rounds = 0u64;
    let mut last_time = Instant::now();

    'outer: loop {
        // sleep in short ticks so shutdown is not delayed by a whole interval
        let mut slept = Duration::ZERO;
        while slept < interval {
            if bb.is_shutdown() {
                break 'outer;
            }
            thread::sleep(tick);
            slept += tick;
        }

        let snap = bb.snapshot();

        let now = Instant::now();
        let dt = now.duration_since(last_time).as_secs_f64();
        let velocity = if dt > 0.1 {
            snap.rounds_completed.saturating_sub(last_rounds) as f64 / dt
        } else {
            0.0
        };
        last_rounds = snap.rounds_completed;
        last_time = now;

        let eta_str = if velocity > 0.0 && snap.total_rounds > snap.rounds_completed {
            let remaining = snap.total_rounds - snap.rounds_completed;
            format_duration(remaining as f64 / velocity)
        } else {
            "unknown".to_string()
        };

        let stall_secs =
            (snap.current_nanos.saturating_sub(snap.last_progress_nanos)) / 1_000_000_000;
        let is_stalled = stall_secs > config.stall_threshold_secs;

        if is_tty {
            print_tty_progress(&snap, &eta_str, velocity, is_stalled);
        } else {
            print_log_progress(&snap, &eta_str, velocity, is_stalled);
        }
    }

    if is_tty {
        eprint!("\r\x1b[K");
        let _ = io::stderr().flush();
    }
}

fn progress_pct(snap: &TelemetrySnapshot) -> f64 {
    if snap.total_rounds > 0 {
        (snap.rounds_completed as f64 / snap.total_rounds as f64 * 100.0).min(100.0)
    } else {
        0.0
    }
}

/// Print progress for TTY (rewriting single line)
fn print_tty_progress(snap: &TelemetrySnapshot, eta: &str, velocity: f64, is_stalled: bool) {
    let pct = progress_pct(snap);

    let bar_width = 20;
    let filled = ((pct / 100.0) * bar_width as f64) as usize;
    let bar: String =
        "=".repeat(filled.min(bar_width)) + &" ".repeat(bar_width.saturating_sub(filled));
    let stall_str = if is_stalled { " [STALLED]" } else { "" };

    eprint!(
        "\r[{}] {:>5.1}% | {} R{}/{} x{} | {:.1} rounds/s | {} | ETA: {}{}    \x1b[K",
        bar,
        pct,
        snap.stage.as_str(),
        snap.rounds_completed,
        snap.total_rounds,
        snap.items_per_round,
        velocity,
        format_duration(snap.elapsed_secs),
        eta,
        stall_str
    );
    let _ = io::stderr().flush();
}

/// Print progress for non-TTY (structured log line)
fn print_log_progress(snap: &TelemetrySnapshot, eta: &str, velocity: f64, is_stalled: bool) {
    eprintln!(
        "[HEARTBEAT] stage=\"{}\" rounds={}/{} items={} velocity={:.2}/s elapsed={:.0}s eta={} stalled={}",
        snap.stage.as_str(),
        snap.rounds_completed,
        snap.total_rounds,
        snap.items_per_round,
        velocity,
        snap.elapsed_secs,
        eta,
        is_stalled
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_roundtrip() {
        for stage in [
            Stage::Initializing,
            Stage::LoadingData,
            Stage::Ranking,
            Stage::Correlating,
            Stage::Scoring,
            Stage::WritingOutput,
            Stage::Complete,
        ] {
            assert_eq!(Stage::from_u64(stage as u64), stage);
        }
    }

    #[test]
    fn test_blackboard_rounds_and_cancel() {
        let bb = TelemetryBlackboard::new();
        bb.set_stage(Stage::Correlating);
        assert_eq!(bb.stage(), Stage::Correlating);

        bb.begin_rounds(11, 6);
        bb.round_done();
        bb.round_done();
        assert_eq!(bb.rounds_completed(), 2);
        assert_eq!(bb.total_rounds(), 11);

        assert!(!bb.is_cancelled());
        bb.request_cancel();
        assert!(bb.is_cancelled());
    }

    #[test]
    fn test_heartbeat_shutdown() {
        let bb = TelemetryBlackboard::new();
        let config = HeartbeatConfig {
            interval_secs: 1,
            stall_threshold_secs: 5,
        };
        let heartbeat = HeartbeatHandle::spawn(bb, config).unwrap();
        heartbeat.shutdown();
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m30s");
        assert_eq!(format_duration(3661.0), "1.0h");
    }
}
