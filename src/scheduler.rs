//! The refresh-driven overlay loop.
//!
//! Every tick: collect a finished inference (if any) and run it through the
//! [`OverlayContext`], start a new inference when the [`InferenceGate`]
//! allows it, then push the transform to the sink. Inference runs as its own
//! task so the tick never waits on the model.

use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::camera::{FrameSource, VideoFrame};
use crate::config::Config;
use crate::error::ConfigError;
use crate::mapping::Dimensions;
use crate::overlay::OverlaySink;
use crate::pipeline::{FrameReport, InferenceGate, OverlayContext};
use crate::pose::{Keypoint, PoseSource};

/// Runtime requests from the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopCommand {
    SelectGarment(String),
    ClearGarment,
    ResetTracking,
}

/// Counters accumulated over the loop's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub requests: u64,
    pub completed: u64,
    pub failures: u64,
    pub detected: u64,
    pub sink_updates: u64,
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// A new inference was started
    pub requested: bool,
    /// A finished inference was processed
    pub processed: Option<FrameReport>,
    /// The sink received a transform
    pub applied: bool,
}

type Observer = Box<dyn FnMut(&OverlayContext, &VideoFrame)>;

struct PendingInference {
    handle: JoinHandle<anyhow::Result<Vec<Keypoint>>>,
    source: Dimensions,
    frame: Option<VideoFrame>,
}

pub struct OverlayLoop<F, P, S> {
    context: OverlayContext,
    frames: F,
    poses: P,
    sink: S,
    gate: InferenceGate,
    tick: Duration,
    pending: Option<PendingInference>,
    commands: Option<mpsc::UnboundedReceiver<LoopCommand>>,
    observer: Option<Observer>,
    stats: LoopStats,
}

impl<F, P, S> OverlayLoop<F, P, S>
where
    F: FrameSource,
    P: PoseSource,
    S: OverlaySink,
{
    /// Fails when `config` does not pass [`Config::validate`], which also
    /// guarantees a finite positive refresh rate.
    pub fn new(config: &Config, frames: F, poses: P, sink: S) -> Result<Self, ConfigError> {
        let context = OverlayContext::new(config)?;
        Ok(Self {
            context,
            frames,
            poses,
            sink,
            gate: InferenceGate::new(Duration::from_millis(config.schedule.min_inference_interval_ms)),
            tick: Duration::from_secs_f64(1.0 / config.schedule.refresh_hz),
            pending: None,
            commands: None,
            observer: None,
            stats: LoopStats::default(),
        })
    }

    /// Accept garment / tracking commands from `commands`.
    pub fn with_commands(mut self, commands: mpsc::UnboundedReceiver<LoopCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Called with the context and source frame after every processed inference.
    pub fn with_observer(mut self, observer: impl FnMut(&OverlayContext, &VideoFrame) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn context(&self) -> &OverlayContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut OverlayContext {
        &mut self.context
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn inference_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// One tick of the loop.
    pub async fn step(&mut self) -> StepReport {
        self.stats.ticks += 1;
        let mut report = StepReport::default();

        self.drain_commands();

        if self.pending.as_ref().is_some_and(|p| p.handle.is_finished()) {
            if let Some(pending) = self.pending.take() {
                self.gate.finish();
                report.processed = self.complete(pending).await;
            }
        }

        let now = Instant::now();
        if self.gate.may_request(now) {
            report.requested = self.request(now);
        }

        match self.context.push_to_sink(&mut self.sink) {
            Ok(applied) => {
                report.applied = applied;
                if applied {
                    self.stats.sink_updates += 1;
                }
            }
            Err(e) => warn!("[sink] apply failed: {:#}", e),
        }

        report
    }

    fn drain_commands(&mut self) {
        let Some(commands) = self.commands.as_mut() else {
            return;
        };
        while let Ok(command) = commands.try_recv() {
            debug!("[loop] command {:?}", command);
            match command {
                LoopCommand::SelectGarment(id) => {
                    self.context.select_garment(&id);
                }
                LoopCommand::ClearGarment => self.context.clear_garment(),
                LoopCommand::ResetTracking => self.context.reset_tracking(),
            }
        }
    }

    fn request(&mut self, now: Instant) -> bool {
        let frame = match self.frames.grab() {
            Ok(Some(frame)) => frame,
            Ok(None) => return false,
            Err(e) => {
                warn!("[camera] grab failed: {:#}", e);
                return false;
            }
        };
        let source = frame.dimensions();
        if !frame.is_well_formed() || !source.is_usable() {
            warn!("[camera] skipping malformed {}x{} frame", frame.width, frame.height);
            return false;
        }

        let kept = self.observer.as_ref().map(|_| frame.clone());
        let handle = tokio::spawn(self.poses.estimate(frame));
        self.gate.begin(now);
        self.stats.requests += 1;
        self.pending = Some(PendingInference {
            handle,
            source,
            frame: kept,
        });
        true
    }

    async fn complete(&mut self, pending: PendingInference) -> Option<FrameReport> {
        let keypoints = match pending.handle.await {
            Ok(Ok(keypoints)) => keypoints,
            Ok(Err(e)) => {
                self.stats.failures += 1;
                warn!("[pose] inference failed: {:#}", e);
                return None;
            }
            Err(e) => {
                self.stats.failures += 1;
                warn!("[pose] inference task died: {}", e);
                return None;
            }
        };

        self.stats.completed += 1;
        let report = self.context.process(&keypoints, pending.source, self.sink.viewport());
        if report.detected {
            self.stats.detected += 1;
        }
        if let (Some(observer), Some(frame)) = (self.observer.as_mut(), pending.frame.as_ref()) {
            observer(&self.context, frame);
        }
        Some(report)
    }

    /// Tick until `shutdown` fires or the frame source closes. An inference
    /// still running at that point is awaited and its result discarded;
    /// camera, model and sink are released when the loop is dropped on return.
    pub async fn run(mut self, shutdown: CancellationToken) -> LoopStats {
        let mut interval = time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut rate_timer = Instant::now();
        let mut last = self.stats;

        info!("[loop] running at {:.0} Hz", 1.0 / self.tick.as_secs_f64());
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.step().await;
                }
            }
            if self.frames.is_closed() && self.pending.is_none() {
                info!("[loop] frame source closed");
                break;
            }

            let elapsed = rate_timer.elapsed();
            if elapsed >= Duration::from_secs(1) {
                let secs = elapsed.as_secs_f64();
                info!(
                    "[fps] loop={:.1} infer={:.1} detected={} failed={}",
                    (self.stats.ticks - last.ticks) as f64 / secs,
                    (self.stats.completed - last.completed) as f64 / secs,
                    self.stats.detected - last.detected,
                    self.stats.failures - last.failures,
                );
                last = self.stats;
                rate_timer = Instant::now();
            }
        }

        if let Some(pending) = self.pending.take() {
            // Frame no longer matters; wait so the model is idle before release
            let _ = pending.handle.await;
            debug!("[loop] discarded in-flight inference");
        }
        info!("[loop] stopped after {} ticks", self.stats.ticks);
        self.stats
    }
}
