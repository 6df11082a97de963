//! Run state machine.
//!
//! `INIT -> RESUMING -> RUNNING -> ASSEMBLING -> DONE`, with `FAILED`
//! reachable from any non-terminal state. Seconds render on a bounded pool
//! of tasks, but the checkpoint only ever advances over a contiguous prefix
//! and is written by this task alone.
//!
//! Blacklist entries become visible to selection in commit order. A second
//! rendered against a pool that has since grown is rendered again once every
//! earlier second is committed, so output does not depend on render timing.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use beatclip_giphy::KeywordImageFetcher;
use beatclip_media::{AudioAttacher, Concatenator, RenderError, SecondRenderer};
use beatclip_models::{PlanKind, RenderResult, RunId, RunOutcome, RunState};

use crate::assembler::Assembler;
use crate::checkpoint::{CheckpointStore, RunIdentity};
use crate::config::{RunConfig, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::events::{EventSender, RunEvent};
use crate::inputs::{load_segments, TempoEstimator, Transcriber};
use crate::logging::RunLogger;
use crate::metrics;
use crate::planner::{CaptionPlan, PlannerSettings};
use crate::render_job::{JobSettings, RenderContext, RenderJob, SecondOutcome};
use crate::source_pool::{PoolError, SourcePool};
use crate::timeline::{build_timeline, TimelineBuild};

/// External capabilities a run depends on.
#[derive(Clone)]
pub struct Capabilities {
    pub tempo: Arc<dyn TempoEstimator>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub fetcher: Option<Arc<dyn KeywordImageFetcher>>,
    pub renderer: Arc<dyn SecondRenderer>,
    pub concatenator: Arc<dyn Concatenator>,
    pub attacher: Arc<dyn AudioAttacher>,
}

/// Everything INIT produces.
struct Prepared {
    build: TimelineBuild,
    plan: CaptionPlan,
    pool: SourcePool,
}

/// Drives one run from inputs to an assembled output.
pub struct JobRunner {
    run_id: RunId,
    run_config: RunConfig,
    worker_config: WorkerConfig,
    caps: Capabilities,
    events: EventSender,
    cancel: Option<watch::Receiver<bool>>,
    logger: RunLogger,
    state: RunState,
    committed: usize,
    total: usize,
}

impl JobRunner {
    pub fn new(run_config: RunConfig, worker_config: WorkerConfig, caps: Capabilities) -> Self {
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id, "render");
        Self {
            run_id,
            run_config,
            worker_config,
            caps,
            events: EventSender::noop(),
            cancel: None,
            logger,
            state: RunState::Init,
            committed: 0,
            total: 0,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Stop the run when the channel flips to `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the run to a terminal state.
    pub async fn run(mut self) -> RunOutcome {
        let span = self.logger.create_span();
        async move {
            let outcome = match self.execute().await {
                Ok(outcome) => {
                    self.transition(RunState::Done);
                    metrics::record_run("completed");
                    self.logger.log_completion(&format!(
                        "{} seconds assembled into {}",
                        self.total,
                        self.run_config.output_path.display()
                    ));
                    outcome
                }
                Err(e) => self.fail(e),
            };
            self.events.send(RunEvent::Finished {
                outcome: outcome.clone(),
            });
            outcome
        }
        .instrument(span)
        .await
    }

    fn transition(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Ignoring illegal state transition");
            return;
        }
        debug!(from = %self.state, to = %next, "State transition");
        self.events.state_changed(self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: WorkerError) -> RunOutcome {
        let reason = if err.is_cancelled() {
            format!(
                "cancelled after {} of {} seconds; checkpoint retained",
                self.committed, self.total
            )
        } else {
            err.to_string()
        };
        self.logger.log_error(&reason);
        self.transition(RunState::Failed);
        metrics::record_run(if err.is_cancelled() { "cancelled" } else { "failed" });
        RunOutcome::failed(reason)
    }

    async fn execute(&mut self) -> WorkerResult<RunOutcome> {
        self.logger.log_start(&format!(
            "audio={} clips={} output={} duration={}s",
            self.run_config.audio_path.display(),
            self.run_config.clips_dir.display(),
            self.run_config.output_path.display(),
            self.run_config.duration_secs
        ));

        let prepared = self.init().await?;
        self.total = prepared.build.timeline.len();

        self.transition(RunState::Resuming);
        let (mut store, pool) = self.resume(&prepared).await?;

        self.transition(RunState::Running);
        let rendered = self.render_all(&prepared, &mut store, pool).await;
        if let Err(e) = store.sync().await {
            warn!("Checkpoint sync failed: {}", e);
        }
        rendered?;

        self.transition(RunState::Assembling);
        let duration = prepared.build.duration;
        let assembler = Assembler::new(self.caps.concatenator.clone(), self.caps.attacher.clone());
        assembler
            .assemble(
                store.artifacts(),
                &self.run_config.audio_path,
                duration,
                &self.run_config.output_path,
                store.dir(),
            )
            .await?;

        if let Err(e) = store.finalize(self.worker_config.retain_checkpoint).await {
            self.logger
                .log_warning(&format!("Checkpoint cleanup failed: {}", e));
        }

        let output_path = self.run_config.output_path.clone();
        Ok(match prepared.build.clamped {
            Some(_) => RunOutcome::Clamped {
                output_path,
                actual_duration: duration,
            },
            None => RunOutcome::Completed { output_path },
        })
    }

    /// INIT: timeline, pool and plan.
    async fn init(&mut self) -> WorkerResult<Prepared> {
        self.run_config.validate()?;
        self.worker_config.validate()?;

        let windows = self.caps.tempo.estimate(&self.run_config.audio_path).await?;
        let build = build_timeline(&windows, self.run_config.duration_secs, None)?;
        if let Some(clamped) = build.clamped {
            self.logger.log_warning(&format!(
                "requested {}s but audio is {}s; clamping",
                clamped.requested, clamped.actual
            ));
            self.events.send(RunEvent::DurationClamped {
                requested: clamped.requested,
                actual: clamped.actual,
            });
        }
        let total = build.timeline.len();
        info!(
            seconds = total,
            base_tempo = build.timeline.base_tempo(),
            "Built tempo timeline"
        );

        let pool = SourcePool::scan(&self.run_config.clips_dir).await?;

        let words = match &self.caps.transcriber {
            Some(transcriber) => Some(transcriber.transcribe(&self.run_config.audio_path).await?),
            None => None,
        };
        let segments = match &self.run_config.segments_path {
            Some(path) => Some(load_segments(path).await?),
            None => None,
        };
        let plan = CaptionPlan::build(
            words.as_deref(),
            segments.as_deref(),
            self.run_config.caption_mode,
            total,
            PlannerSettings {
                phrase_gap_secs: self.run_config.phrase_gap_secs,
                karaoke_max_chars: self.run_config.karaoke_max_chars,
            },
        )?;
        if plan.kind() == Some(PlanKind::Keyword) && self.caps.fetcher.is_none() {
            self.logger
                .log_warning("keyword plan without a fetcher; every second uses the bank");
        }

        Ok(Prepared { build, plan, pool })
    }

    /// RESUMING: open the checkpoint and restore the blacklist.
    async fn resume(&mut self, prepared: &Prepared) -> WorkerResult<(CheckpointStore, SourcePool)> {
        let identity = RunIdentity {
            output_path: self.run_config.output_path.clone(),
            requested_duration: self.run_config.duration_secs,
            total_seconds: self.total,
            seed: self.run_config.seed,
        };
        let store = CheckpointStore::open(
            &identity,
            rand::random::<u64>(),
            self.worker_config.checkpoint_sync_interval,
        )
        .await?;

        let mut pool = prepared.pool.clone();
        for id in store.blacklisted() {
            pool.blacklist(id);
        }
        if pool.available() == 0 {
            return Err(PoolError::PoolExhausted.into());
        }

        self.committed = store.resume_index();
        for (i, artifact) in store.artifacts().iter().enumerate() {
            let result = RenderResult::skipped(i, artifact.clone());
            metrics::record_second(result.status, 0.0);
            self.events.second_completed(&result);
        }
        self.events.send(RunEvent::Resumed {
            resume_index: store.resume_index(),
            total: self.total,
        });
        if store.resume_index() > 0 {
            self.logger.log_progress(&format!(
                "resuming at second {} of {} (seed {})",
                store.resume_index(),
                self.total,
                store.seed()
            ));
        } else {
            info!(seed = store.seed(), sources = pool.len(), "Starting fresh run");
        }
        Ok((store, pool))
    }

    /// RUNNING: dispatch seconds in order, commit in order.
    async fn render_all(
        &mut self,
        prepared: &Prepared,
        store: &mut CheckpointStore,
        mut pool: SourcePool,
    ) -> WorkerResult<()> {
        let timeline = &prepared.build.timeline;
        let ctx = RenderContext {
            renderer: self.caps.renderer.clone(),
            fetcher: self.caps.fetcher.clone(),
            settings: JobSettings {
                seed: store.seed(),
                base_tempo: timeline.base_tempo(),
                speed_min: self.worker_config.speed_min,
                speed_max: self.worker_config.speed_max,
                window_secs: self.worker_config.clip_window_secs,
                fetch_timeout: self.worker_config.fetch_timeout,
            },
        };

        let total = self.total;
        let max_parallel = self.worker_config.max_parallel_renders.max(1);
        let progress_step = (total / 10).max(1);
        let mut next_dispatch = store.resume_index();
        let mut pending: BTreeMap<usize, SecondOutcome> = BTreeMap::new();
        let mut tasks: JoinSet<(usize, Result<SecondOutcome, RenderError>)> = JoinSet::new();
        let mut fatal: Option<WorkerError> = None;

        let mut cancel = self.cancel.clone();
        let mut cancelled = false;

        loop {
            if !cancelled && cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
                info!(in_flight = tasks.len(), "Stop signal received, draining in-flight seconds");
                cancelled = true;
            }
            while !cancelled && fatal.is_none() && tasks.len() < max_parallel && next_dispatch < total {
                let i = next_dispatch;
                let job = render_job(prepared, store, &pool, i);
                let ctx = ctx.clone();
                tasks.spawn(async move { (i, ctx.execute(job).await) }.in_current_span());
                next_dispatch += 1;
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((i, Ok(outcome)))) => {
                        for (id, duration) in &outcome.probed {
                            pool.record_duration(id, *duration);
                        }
                        pending.insert(i, outcome);
                        let stale = self.commit_ready(store, &mut pool, &mut pending, progress_step).await?;
                        if let Some(i) = stale {
                            if !cancelled && fatal.is_none() {
                                let job = render_job(prepared, store, &pool, i);
                                let ctx = ctx.clone();
                                tasks.spawn(async move { (i, ctx.execute(job).await) }.in_current_span());
                            }
                        }
                    }
                    Some(Ok((i, Err(e)))) => {
                        if fatal.is_none() {
                            warn!(second = i, "Stopping dispatch: {}", e);
                            fatal = Some(e.into());
                        }
                    }
                    Some(Err(e)) => {
                        if fatal.is_none() {
                            fatal = Some(WorkerError::unavailable(format!("render task failed: {}", e)));
                        }
                    }
                    None => break,
                },
                changed = async {
                    match cancel.as_mut() {
                        Some(rx) => rx.changed().await,
                        None => std::future::pending().await,
                    }
                }, if !cancelled && cancel.is_some() => {
                    // The loop head reads the new value; a dropped sender
                    // means no stop signal can arrive anymore
                    if changed.is_err() {
                        cancel = None;
                    }
                }
            }
        }

        if let Some(err) = fatal {
            return Err(err);
        }
        if cancelled || self.committed < total {
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }

    /// Commit buffered outcomes that extend the contiguous prefix.
    ///
    /// Stops at a second whose pool snapshot predates the committed
    /// blacklist and returns its index for re-rendering.
    async fn commit_ready(
        &mut self,
        store: &mut CheckpointStore,
        pool: &mut SourcePool,
        pending: &mut BTreeMap<usize, SecondOutcome>,
        progress_step: usize,
    ) -> WorkerResult<Option<usize>> {
        while let Some(outcome) = pending.remove(&store.resume_index()) {
            let i = outcome.result.second_index;
            if outcome
                .pool_generation
                .is_some_and(|generation| generation != pool.generation())
            {
                debug!(second = i, "Blacklist grew while rendering, rendering again");
                return Ok(Some(i));
            }

            for id in &outcome.blacklisted {
                if !pool.blacklist(id) {
                    continue;
                }
                store.record_blacklist(id).await?;
                metrics::record_blacklisted();
                self.events.source_blacklisted(i, id);
            }

            store.record(i, &outcome.result.artifact_path).await?;
            self.committed = store.resume_index();

            metrics::record_second(outcome.result.status, outcome.elapsed.as_secs_f64());
            if outcome.result.overlay_dropped {
                metrics::record_overlay_dropped();
            }
            debug!(
                second = i,
                status = outcome.result.status.as_str(),
                source = %outcome.result.source.as_ref().map(|s| s.label()).unwrap_or_default(),
                "Committed second"
            );
            self.events.second_completed(&outcome.result);

            if self.committed % progress_step == 0 || self.committed == self.total {
                self.logger
                    .log_progress(&format!("{}/{} seconds rendered", self.committed, self.total));
            }
        }
        Ok(None)
    }
}

fn render_job(prepared: &Prepared, store: &CheckpointStore, pool: &SourcePool, i: usize) -> RenderJob {
    let timeline = &prepared.build.timeline;
    RenderJob {
        second_index: i,
        tempo: timeline.tempo_at(i).unwrap_or(timeline.base_tempo()),
        plan_entry: prepared.plan.for_second(i).cloned(),
        output: store.artifact_path(i),
        pool: pool.clone(),
    }
}
