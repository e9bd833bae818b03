//! Pipeline ingestion - router, shard workers and the alert dispatcher loop
//!
//! ```text
//! LineSource → run_router ──(key hash)──→ run_shard × N ──(try_send)──→ run_dispatcher
//!                                              │                             │
//!                                              └──────── AuditEntry ─────────┘
//! ```
//!
//! Every channel is an owned hand-off; dropping the senders is the shutdown signal.
//! Shards drop whatever join windows are still open when their input closes.

use super::config::PipelineConfig;
use super::engine::{ComplianceEngine, EngineStats};
use super::sink::{run_audit_writer, AuditEntry, AuditWriter};
use super::source::LineSource;
use crate::compliance_core::{Alert, ClassifyOutcome, DetectionEvent, DropReason, EventClassifier, KeyRouter};
use crate::dispatch::{AlertDispatcher, DispatchOutcome};
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Counters kept by the router
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RouterStats {
    pub received: u64,
    pub accepted: u64,
    pub dropped: BTreeMap<&'static str, u64>,
}

impl RouterStats {
    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }
}

/// Classifies raw lines and picks the owning shard
pub struct EventRouter {
    classifier: EventClassifier,
    keys: KeyRouter,
    stats: RouterStats,
}

impl EventRouter {
    pub fn new(classifier: EventClassifier, keys: KeyRouter) -> Self {
        Self {
            classifier,
            keys,
            stats: RouterStats::default(),
        }
    }

    pub fn route(&mut self, line: &[u8], received_at_ms: i64) -> Option<(usize, DetectionEvent)> {
        self.stats.received += 1;

        match self.classifier.classify_bytes(line, received_at_ms) {
            ClassifyOutcome::Accepted(event) => {
                self.stats.accepted += 1;
                let shard = self.keys.shard_for(&event.correlation_key());
                Some((shard, event))
            }
            ClassifyOutcome::Dropped(reason) => {
                match &reason {
                    DropReason::Malformed(_) | DropReason::InvalidUtf8(_) => {
                        log::warn!("⚠️  Dropped record: {}", reason)
                    }
                    _ => log::debug!("Dropped record: {}", reason),
                }
                *self.stats.dropped.entry(reason.label()).or_insert(0) += 1;
                None
            }
        }
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn shard_count(&self) -> usize {
        self.keys.shard_count()
    }
}

/// Read lines until the source is exhausted and hand each accepted event to its
/// shard. Sends are awaited so per-key order is preserved. Undecodable lines are
/// dropped by the classifier; only an I/O failure of the source stops the router.
pub async fn run_router(
    mut source: LineSource,
    mut router: EventRouter,
    shards: Vec<mpsc::Sender<DetectionEvent>>,
) -> RouterStats {
    log::info!("🚀 Router started ({} shards)", shards.len());

    loop {
        let line = match source.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                log::info!("📭 Input exhausted");
                break;
            }
            Err(e) => {
                log::error!("❌ Failed to read input: {}", e);
                break;
            }
        };

        let Some((shard, event)) = router.route(&line, now_ms()) else {
            continue;
        };

        if shards[shard].send(event).await.is_err() {
            log::error!("❌ Shard {} is gone, stopping router", shard);
            break;
        }
    }

    let stats = router.stats().clone();
    log::info!(
        "✅ Router stopped: {} received, {} accepted, {} dropped {:?}",
        stats.received,
        stats.accepted,
        stats.dropped_total(),
        stats.dropped
    );
    stats
}

/// Output ends of a shard worker
pub struct ShardOutputs {
    pub alerts: mpsc::Sender<Alert>,
    pub audit: Option<mpsc::Sender<AuditEntry>>,
}

/// Own one shard's engine: process events as they arrive, close join windows
/// every slide, and hand alerts to the dispatcher without blocking.
pub async fn run_shard(
    shard_id: usize,
    mut rx: mpsc::Receiver<DetectionEvent>,
    mut engine: ComplianceEngine,
    outputs: ShardOutputs,
    slide_ms: i64,
    stats_interval_secs: u64,
) -> EngineStats {
    log::debug!("🚀 Shard {} started", shard_id);

    let mut slide_timer = interval(Duration::from_millis(slide_ms.max(1) as u64));
    slide_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut evict_timer = interval(Duration::from_secs(1));
    evict_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats_timer = interval(Duration::from_secs(stats_interval_secs.max(1)));
    stats_timer.tick().await;

    let mut event_count = 0u64;
    let mut last_log_time = Instant::now();

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else {
                    let open = engine.open_join_windows();
                    if open > 0 {
                        log::info!("🛑 Shard {} input closed, dropping {} open join windows", shard_id, open);
                    }
                    break;
                };
                engine.process_event(&event, now_ms());
                event_count += 1;
            }

            _ = slide_timer.tick() => {
                let now = now_ms();
                let output = engine.advance(now);

                if let Some(audit) = &outputs.audit {
                    for record in output.joined {
                        match audit.try_send(AuditEntry::Joined { at_ms: now, record }) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                log::warn!("⚠️  Audit channel full, dropping joined record");
                            }
                            Err(TrySendError::Closed(_)) => {
                                log::error!("❌ Audit writer is gone, joined record lost");
                            }
                        }
                    }
                }

                for alert in output.alerts {
                    match outputs.alerts.try_send(alert) {
                        Ok(()) => {}
                        Err(TrySendError::Full(alert)) => {
                            log::warn!("⚠️  Alert channel full, dropping alert {}", alert.request_id);
                        }
                        Err(TrySendError::Closed(alert)) => {
                            log::error!("❌ Dispatcher is gone, alert {} lost", alert.request_id);
                        }
                    }
                }
            }

            _ = evict_timer.tick() => {
                engine.evict_idle(now_ms());
            }

            _ = stats_timer.tick() => {
                let elapsed = last_log_time.elapsed().as_secs_f64();
                let stats = engine.stats();
                log::info!(
                    "📊 Shard {}: {:.1} events/sec | backlog: {} | keys: {} | open windows: {} | joined: {} | suppressed: {} | alerts: {}",
                    shard_id,
                    event_count as f64 / elapsed.max(f64::EPSILON),
                    rx.len(),
                    engine.active_keys(),
                    engine.open_join_windows(),
                    stats.admitted,
                    stats.suppressed,
                    stats.alerts,
                );

                event_count = 0;
                last_log_time = Instant::now();
            }
        }
    }

    engine.stats().clone()
}

/// Counters kept by the dispatcher loop
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
    pub trips: u64,
}

/// Deliver alerts one at a time, in arrival order
pub async fn run_dispatcher(
    mut rx: mpsc::Receiver<Alert>,
    dispatcher: AlertDispatcher,
    audit: Option<mpsc::Sender<AuditEntry>>,
) -> DispatchStats {
    log::info!("🚀 Dispatcher started (actuator: {})", dispatcher.actuator_type());
    let mut stats = DispatchStats::default();

    while let Some(alert) = rx.recv().await {
        let outcome = dispatcher.dispatch(alert).await;

        match &outcome {
            DispatchOutcome::Delivered { .. } => stats.delivered += 1,
            DispatchOutcome::Failed { tripped, .. } => {
                stats.failed += 1;
                if tripped.is_some() {
                    stats.trips += 1;
                }
            }
        }

        if let Some(audit) = &audit {
            let entry = AuditEntry::Dispatch { at_ms: now_ms(), outcome };
            if audit.send(entry).await.is_err() {
                log::warn!("⚠️  Audit writer is gone");
            }
        }
    }

    log::info!(
        "✅ Dispatcher stopped: {} delivered, {} failed, {} trips",
        stats.delivered,
        stats.failed,
        stats.trips
    );
    stats
}

/// Final counters of a completed run
#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub router: RouterStats,
    pub shards: Vec<EngineStats>,
    pub dispatch: DispatchStats,
}

impl PipelineSummary {
    pub fn alerts_raised(&self) -> u64 {
        self.shards.iter().map(|s| s.alerts).sum()
    }
}

pub struct PipelineHandle {
    router: Option<JoinHandle<RouterStats>>,
    router_stats: RouterStats,
    shards: Vec<JoinHandle<EngineStats>>,
    dispatcher: JoinHandle<DispatchStats>,
    audit: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Resolves once the router stops reading input. Cancel-safe.
    pub async fn input_finished(&mut self) {
        if let Some(router) = self.router.as_mut() {
            let result = router.await;
            self.router = None;
            self.router_stats = match result {
                Ok(stats) => stats,
                Err(e) => {
                    if !e.is_cancelled() {
                        log::error!("❌ Router task failed: {}", e);
                    }
                    RouterStats::default()
                }
            };
        }
    }

    /// Wait for the input to run dry and every stage to drain
    pub async fn join(mut self) -> PipelineSummary {
        self.input_finished().await;

        let mut shards = Vec::with_capacity(self.shards.len());
        for (id, handle) in self.shards.into_iter().enumerate() {
            match handle.await {
                Ok(stats) => shards.push(stats),
                Err(e) => log::error!("❌ Shard {} task failed: {}", id, e),
            }
        }

        let dispatch = match self.dispatcher.await {
            Ok(stats) => stats,
            Err(e) => {
                log::error!("❌ Dispatcher task failed: {}", e);
                DispatchStats::default()
            }
        };

        if let Some(audit) = self.audit {
            if let Err(e) = audit.await {
                log::error!("❌ Audit task failed: {}", e);
            }
        }

        PipelineSummary {
            router: self.router_stats,
            shards,
            dispatch,
        }
    }

    /// Stop reading input; downstream stages drain and stop as their channels close
    pub async fn shutdown(self) -> PipelineSummary {
        if let Some(router) = &self.router {
            router.abort();
        }
        self.join().await
    }
}

/// Wire the router, shard workers, dispatcher and optional audit writer
pub fn spawn_pipeline(
    config: &PipelineConfig,
    source: LineSource,
    dispatcher: AlertDispatcher,
    audit_writer: Option<AuditWriter>,
) -> PipelineHandle {
    let (audit_tx, audit) = match audit_writer {
        Some(writer) => {
            let (tx, rx) = mpsc::channel(config.alert_channel_buffer.max(1));
            (Some(tx), Some(tokio::spawn(run_audit_writer(rx, writer))))
        }
        None => (None, None),
    };

    let (alert_tx, alert_rx) = mpsc::channel(config.alert_channel_buffer.max(1));
    let dispatcher = tokio::spawn(run_dispatcher(alert_rx, dispatcher, audit_tx.clone()));

    let router = EventRouter::new(
        EventClassifier::new(config.model_marker.clone()),
        KeyRouter::new(config.worker_shards),
    );

    let per_shard_buffer = (config.channel_buffer / router.shard_count()).max(1);
    let mut senders = Vec::with_capacity(router.shard_count());
    let mut shards = Vec::with_capacity(router.shard_count());
    for shard_id in 0..router.shard_count() {
        let (tx, rx) = mpsc::channel(per_shard_buffer);
        senders.push(tx);

        let outputs = ShardOutputs {
            alerts: alert_tx.clone(),
            audit: audit_tx.clone(),
        };
        shards.push(tokio::spawn(run_shard(
            shard_id,
            rx,
            ComplianceEngine::new(config),
            outputs,
            config.join_slide_ms,
            config.stats_interval_secs,
        )));
    }

    let router = tokio::spawn(run_router(source, router, senders));

    PipelineHandle {
        router: Some(router),
        router_stats: RouterStats::default(),
        shards,
        dispatcher,
        audit,
    }
}
