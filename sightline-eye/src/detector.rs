//! Detector: pipeline orchestration and target queries

use crate::error::Result;
use crate::homography::HomographyMapper;
use crate::object::DetectedObject;
use crate::pipeline::{Frame, SharedPipeline};
use crate::processor::{draw_detections, FrameProcessor, PipelineState, VideoSource, VisionProcessor};
use crate::target::TargetInfo;
use crate::task::{Scheduler, VisionTask};
use parking_lot::Mutex;
use sightline_core::DetectorConfig;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Span};

/// Predicate used to drop false positives before localization.
pub type TargetFilter<'a, O> = &'a dyn Fn(&DetectedObject<O>) -> bool;

/// Ordering applied to the returned targets.
pub type TargetComparator<'a, O> = &'a dyn Fn(&TargetInfo<O>, &TargetInfo<O>) -> Ordering;

/// Owns the active pipeline slot and the optional ground-plane mapper, and
/// answers the control loop's target queries from whatever the scheduler
/// last published.
pub struct Detector<O> {
    name: String,
    image_width: u32,
    image_height: u32,
    trace_targets: bool,
    mapper: Option<HomographyMapper>,
    state: Arc<Mutex<PipelineState<O>>>,
    processor: FrameProcessor<O>,
    scheduler: Box<dyn Scheduler<O>>,
    span: Span,
}

impl<O: Send + Sync + 'static> Detector<O> {
    /// Create a detector whose processing is scheduled by a [`VisionTask`]
    /// pulling frames from `source`.
    pub fn with_video_source<V>(config: DetectorConfig, source: V) -> Result<Self>
    where
        V: VideoSource + 'static,
    {
        let num_buffers = config.num_image_buffers;
        let (width, height) = (config.image_width, config.image_height);
        let name = config.name.clone();
        Self::new(config, |processor| {
            VisionTask::new(&name, processor, source, num_buffers, width, height)
        })
    }

    /// Create a detector, handing its frame processor to `build_scheduler`.
    pub fn new<S, F>(config: DetectorConfig, build_scheduler: F) -> Result<Self>
    where
        S: Scheduler<O> + 'static,
        F: FnOnce(FrameProcessor<O>) -> Result<S>,
    {
        let span = info_span!("detector", name = %config.name);
        Self::with_span(config, span, build_scheduler)
    }

    /// Same as [`Detector::new`] but logging under the caller's span.
    pub fn with_span<S, F>(config: DetectorConfig, span: Span, build_scheduler: F) -> Result<Self>
    where
        S: Scheduler<O> + 'static,
        F: FnOnce(FrameProcessor<O>) -> Result<S>,
    {
        config.validate()?;

        let mapper = config
            .calibration
            .as_ref()
            .map(HomographyMapper::from_calibration)
            .transpose()?;

        let state = Arc::new(Mutex::new(PipelineState { pipeline: None }));
        let processor = FrameProcessor::new(Arc::clone(&state));
        let scheduler = build_scheduler(processor.clone())?;
        scheduler.set_processing_interval(config.processing_interval());
        scheduler.set_perf_report_enabled(config.perf_report);

        span.in_scope(|| {
            info!(
                width = config.image_width,
                height = config.image_height,
                homography = mapper.is_some(),
                "detector created"
            )
        });

        Ok(Self {
            name: config.name,
            image_width: config.image_width,
            image_height: config.image_height,
            trace_targets: config.trace_targets,
            mapper,
            state,
            processor,
            scheduler: Box::new(scheduler),
            span,
        })
    }
}

impl<O: Send + Sync> Detector<O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn homography_mapper(&self) -> Option<&HomographyMapper> {
        self.mapper.as_ref()
    }

    /// Install `pipeline` and start processing, or pass `None` to stop.
    ///
    /// Installing the pipeline that is already active does nothing. A newly
    /// installed pipeline is reset exactly once before its first cycle.
    ///
    /// Locks are taken pipeline first, then the management lock. The
    /// management lock is never held while waiting on a pipeline, so a slow
    /// cycle of the pipeline being installed never stalls queries or the
    /// vision task.
    pub fn set_pipeline(&self, pipeline: Option<SharedPipeline<O>>) {
        let _enter = self.span.enter();

        let Some(pipeline) = pipeline else {
            let mut state = self.state.lock();
            if state.pipeline.take().is_some() {
                debug!("pipeline cleared");
            }
            self.set_enabled_locked(false);
            return;
        };

        if self.is_installed(&pipeline) {
            return;
        }

        // Hold the new pipeline's own lock from before it becomes visible
        // until its reset is done, so the task cannot run it un-reset.
        let mut guard = pipeline.lock();
        {
            let mut state = self.state.lock();
            let unchanged = state
                .pipeline
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &pipeline));
            if unchanged {
                return;
            }
            state.pipeline = Some(Arc::clone(&pipeline));
        }

        guard.reset();
        debug!(pipeline = guard.name(), "pipeline installed");
        drop(guard);

        let state = self.state.lock();
        if state
            .pipeline
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &pipeline))
        {
            self.set_enabled_locked(true);
        }
    }

    fn is_installed(&self, pipeline: &SharedPipeline<O>) -> bool {
        self.state
            .lock()
            .pipeline
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, pipeline))
    }

    /// Currently installed pipeline.
    pub fn pipeline(&self) -> Option<SharedPipeline<O>> {
        self.state.lock().pipeline.clone()
    }

    /// Whether the vision task is running. A query returning no targets
    /// while this is true means nothing qualified, not that vision is off.
    pub fn is_enabled(&self) -> bool {
        self.scheduler.is_task_enabled()
    }

    /// Fire the scheduler only on an edge. Caller holds the state lock.
    fn set_enabled_locked(&self, enabled: bool) {
        let task_enabled = self.scheduler.is_task_enabled();
        if enabled && !task_enabled {
            self.scheduler.set_task_enabled(true);
            info!("vision enabled");
        } else if !enabled && task_enabled {
            self.scheduler.set_task_enabled(false);
            info!("vision disabled");
        }
    }

    /// Processing interval; zero runs cycles back-to-back.
    pub fn set_processing_interval(&self, interval: Duration) {
        self.scheduler.set_processing_interval(interval);
    }

    pub fn processing_interval(&self) -> Duration {
        self.scheduler.processing_interval()
    }

    /// Stream intermediate step `step` (0 = input frame, `None` = off) to the
    /// video output, with detection rects drawn on it if `annotate` is set.
    pub fn set_video_out_enabled(&self, step: Option<usize>, annotate: bool) {
        self.scheduler.set_video_out_enabled(step, annotate);
    }

    pub fn set_perf_report_enabled(&self, enabled: bool) {
        self.scheduler.set_perf_report_enabled(enabled);
    }

    /// Run the active pipeline on one frame.
    pub fn process_frame(&self, frame: &Frame) -> Result<Arc<[DetectedObject<O>]>> {
        self.processor.process_frame(frame)
    }

    /// Draw detection rects onto `frame`.
    pub fn annotate_frame(&self, frame: &mut Frame, detections: &[DetectedObject<O>]) {
        draw_detections(frame, detections);
    }

    pub fn intermediate_output(&self, step: usize) -> Option<Frame> {
        self.processor.intermediate_output(step)
    }

    /// Targets from the latest published detections.
    ///
    /// `filter` (if any) drops false positives. With a mapper configured,
    /// each survivor is localized on the floor, corrected for
    /// `object_height_offset` above the floor seen from `camera_height`;
    /// objects that cannot be localized are skipped. `comparator` (if any)
    /// sorts the result, otherwise detection order is kept. The result is
    /// empty, never absent, when nothing qualifies.
    pub fn get_targets(
        &self,
        filter: Option<TargetFilter<'_, O>>,
        comparator: Option<TargetComparator<'_, O>>,
        object_height_offset: f64,
        camera_height: f64,
    ) -> Vec<TargetInfo<O>> {
        let _enter = self.span.enter();
        let Some(objects) = self.scheduler.detected_objects() else {
            return Vec::new();
        };

        let mut targets = Vec::with_capacity(objects.len());
        for object in objects.iter() {
            if let Some(filter) = filter {
                if !filter(object) {
                    continue;
                }
            }

            let target = match &self.mapper {
                Some(mapper) => match TargetInfo::localized(
                    object.clone(),
                    self.image_width,
                    self.image_height,
                    mapper,
                    object_height_offset,
                    camera_height,
                ) {
                    Ok(target) => target,
                    Err(err) => {
                        warn!(error = %err, "skipping target");
                        continue;
                    }
                },
                None => TargetInfo::new(object.clone(), self.image_width, self.image_height),
            };
            targets.push(target);
        }

        if let Some(comparator) = comparator {
            if targets.len() > 1 {
                targets.sort_by(|a, b| comparator(a, b));
            }
        }

        if self.trace_targets {
            for (i, target) in targets.iter().enumerate() {
                info!("[{}] Target={}", i, target);
            }
        }

        targets
    }
}

impl<O> fmt::Display for Detector<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl<O> Drop for Detector<O> {
    fn drop(&mut self) {
        self.state.lock().pipeline = None;
        self.scheduler.set_task_enabled(false);
    }
}
