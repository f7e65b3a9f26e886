// src/ingest/scheduler.rs
//! Single background refresh task plus the coalescing trigger it listens on.
//!
//! Cycles are numbered in start order. A forced refresh either joins the
//! running cycle (when that cycle was itself started on demand) or queues
//! exactly one cycle behind it; further requests fold into the same pending
//! slot until that cycle starts. Stale-read nudges are further held back by a
//! cooldown measured from the last finished cycle, so read traffic cannot
//! drive the provider call rate.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::ingest::IngestPipeline;
use crate::snapshot::{PublishOutcome, SnapshotCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Scheduled,
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cycle this request joined or queued has finished and published.
    Completed,
    /// Gave up waiting; the cycle keeps running and publishes when done.
    TimedOut,
}

#[derive(Debug, Default)]
struct SignalState {
    next_seq: u64,
    pending: bool,
    running: Option<(u64, CycleKind)>,
    last_finished: Option<Instant>,
}

#[derive(Debug)]
pub struct RefreshSignal {
    state: Mutex<SignalState>,
    background_cooldown: Duration,
    wake: Notify,
    completed: watch::Sender<u64>,
}

impl Default for RefreshSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self::with_background_cooldown(Duration::ZERO)
    }

    /// `cooldown` is the minimum gap between the end of any cycle and a
    /// cycle started by a stale read.
    pub fn with_background_cooldown(cooldown: Duration) -> Self {
        let (completed, _rx) = watch::channel(0);
        Self {
            state: Mutex::new(SignalState::default()),
            background_cooldown: cooldown,
            wake: Notify::new(),
            completed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Cycles started so far.
    pub fn cycles_started(&self) -> u64 {
        self.lock().next_seq
    }

    /// Cycles finished so far.
    pub fn cycles_completed(&self) -> u64 {
        *self.completed.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    /// Register a forced request; returns the sequence number of the cycle
    /// that will satisfy it.
    pub fn request(&self) -> u64 {
        let mut st = self.lock();
        if let Some((seq, CycleKind::Forced)) = st.running {
            if !st.pending {
                return seq;
            }
        }
        if !st.pending {
            st.pending = true;
            self.wake.notify_one();
        }
        st.next_seq
    }

    /// Stale-read nudge: only asks when nothing is running or queued and the
    /// last cycle ended at least one cooldown ago. Returns whether it asked.
    pub fn request_background(&self) -> bool {
        let mut st = self.lock();
        if st.running.is_some() || st.pending {
            return false;
        }
        let cooled = st
            .last_finished
            .map_or(true, |t| t.elapsed() >= self.background_cooldown);
        if !cooled {
            return false;
        }
        st.pending = true;
        self.wake.notify_one();
        tracing::debug!(target: "scheduler", "stale snapshot read; refresh requested");
        true
    }

    /// Wait until cycle `seq` has finished, or `timeout` elapses.
    pub async fn wait_for(&self, seq: u64, timeout: Duration) -> RefreshOutcome {
        let mut rx = self.completed.subscribe();
        let finished = async move {
            loop {
                let done = *rx.borrow_and_update() > seq;
                if done {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        match tokio::time::timeout(timeout, finished).await {
            Ok(true) => RefreshOutcome::Completed,
            _ => RefreshOutcome::TimedOut,
        }
    }

    pub async fn force_refresh(&self, timeout: Duration) -> RefreshOutcome {
        let seq = self.request();
        tracing::info!(target: "scheduler", seq, "forced refresh requested");
        self.wait_for(seq, timeout).await
    }

    /// Start a cycle. A pending request is satisfied by whatever starts next.
    fn begin(&self, kind: CycleKind) -> (u64, CycleKind) {
        let mut st = self.lock();
        let kind = if st.pending { CycleKind::Forced } else { kind };
        let seq = st.next_seq;
        st.next_seq += 1;
        st.pending = false;
        st.running = Some((seq, kind));
        (seq, kind)
    }

    fn finish(&self, seq: u64) {
        {
            let mut st = self.lock();
            st.running = None;
            st.last_finished = Some(Instant::now());
        }
        self.completed.send_replace(seq + 1);
    }

    fn take_wake(&self) -> bool {
        self.lock().pending
    }

    async fn notified(&self) {
        self.wake.notified().await
    }
}

/// Run one cycle over `subjects` and publish the result.
pub async fn refresh_once(
    pipeline: &IngestPipeline,
    cache: &SnapshotCache,
    subjects: &[String],
) -> PublishOutcome {
    let report = pipeline.run_cycle(subjects).await;
    cache.apply_cycle(&report).await
}

pub struct RefreshScheduler {
    pipeline: Arc<IngestPipeline>,
    cache: Arc<SnapshotCache>,
    subjects: Vec<String>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        cache: Arc<SnapshotCache>,
        subjects: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            cache,
            subjects,
            interval,
        }
    }

    /// Spawn the refresh loop. The first tick fires immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let signal = self.cache.refresh_signal();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let kind = tokio::select! {
                _ = ticker.tick() => CycleKind::Scheduled,
                _ = signal.notified() => {
                    // A tick may already have served this request.
                    if !signal.take_wake() {
                        continue;
                    }
                    CycleKind::Forced
                }
            };

            let (seq, kind) = signal.begin(kind);
            tracing::info!(target: "scheduler", seq, ?kind, "ingest cycle starting");
            let outcome = refresh_once(&self.pipeline, &self.cache, &self.subjects).await;
            signal.finish(seq);
            tracing::info!(target: "scheduler", seq, ?outcome, "ingest cycle done");

            if kind == CycleKind::Forced {
                // Keep the regular cadence measured from the latest cycle.
                ticker.reset();
            }
        }
    }
}
