//! Interfaces between the detector and the vision task that drives it

use crate::error::Result;
use crate::object::{DetectedObject, Detections};
use crate::pipeline::{Frame, SharedPipeline};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use parking_lot::Mutex;
use std::sync::Arc;

const ANNOTATE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const ANNOTATE_RECT_THICKNESS: u32 = 3;

/// Frame processing surface the vision task calls on its own thread.
pub trait VisionProcessor<O>: Send + Sync {
    /// Detect objects in an acquired frame.
    fn process_frame(&self, frame: &Frame) -> Result<Detections<O>>;

    /// Overlay the detections on a frame headed for the video output.
    fn annotate_frame(&self, frame: &mut Frame, detections: &[DetectedObject<O>]);

    /// Debug frame of an intermediate processing step (0 is the input).
    fn intermediate_output(&self, step: usize) -> Option<Frame>;

    /// Detect objects in `frame` and, if `debug_step` is set, capture that
    /// step's output from the same run.
    fn process_cycle(&self, frame: &Frame, debug_step: Option<usize>) -> Result<ProcessedFrame<O>> {
        let detections = self.process_frame(frame)?;
        let debug_frame = debug_step.and_then(|step| self.intermediate_output(step));
        Ok(ProcessedFrame {
            detections,
            debug_frame,
        })
    }
}

/// Result of one processing cycle.
pub struct ProcessedFrame<O> {
    pub detections: Detections<O>,
    /// Output of the requested debug step, if the pipeline has one
    pub debug_frame: Option<Frame>,
}

/// Frame acquisition and display endpoint for the vision task.
pub trait VideoSource: Send {
    /// Fill `frame` with the next image. Returns false when none is ready.
    fn get_frame(&mut self, frame: &mut Frame) -> bool;

    /// Display a processed (possibly annotated) frame.
    fn put_frame(&mut self, frame: &Frame);
}

/// Pipeline slot guarded by the detector's management lock.
pub(crate) struct PipelineState<O> {
    pub(crate) pipeline: Option<SharedPipeline<O>>,
}

/// The detector side of the vision task: runs whichever pipeline is
/// currently installed.
pub struct FrameProcessor<O> {
    state: Arc<Mutex<PipelineState<O>>>,
}

impl<O> FrameProcessor<O> {
    pub(crate) fn new(state: Arc<Mutex<PipelineState<O>>>) -> Self {
        Self { state }
    }

    /// Snapshot of the installed pipeline. The management lock is released
    /// before the caller touches the pipeline, so a cycle in progress keeps
    /// the instance it started with even if a swap happens meanwhile.
    fn current(&self) -> Option<SharedPipeline<O>> {
        self.state.lock().pipeline.clone()
    }
}

impl<O> Clone for FrameProcessor<O> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<O: Send + Sync> VisionProcessor<O> for FrameProcessor<O> {
    fn process_frame(&self, frame: &Frame) -> Result<Detections<O>> {
        let Some(pipeline) = self.current() else {
            return Ok(Vec::new().into());
        };
        let mut pipeline = pipeline.lock();
        pipeline.process(frame)?;
        Ok(pipeline.detected_objects())
    }

    fn annotate_frame(&self, frame: &mut Frame, detections: &[DetectedObject<O>]) {
        draw_detections(frame, detections);
    }

    fn intermediate_output(&self, step: usize) -> Option<Frame> {
        let pipeline = self.current()?;
        let pipeline = pipeline.lock();
        pipeline.intermediate_output(step)
    }

    /// Runs and reads back one pipeline instance under a single lock, so a
    /// swap mid-cycle cannot mix two pipelines' output.
    fn process_cycle(&self, frame: &Frame, debug_step: Option<usize>) -> Result<ProcessedFrame<O>> {
        let Some(pipeline) = self.current() else {
            return Ok(ProcessedFrame {
                detections: Vec::new().into(),
                debug_frame: None,
            });
        };
        let mut pipeline = pipeline.lock();
        pipeline.process(frame)?;
        Ok(ProcessedFrame {
            detections: pipeline.detected_objects(),
            debug_frame: debug_step.and_then(|step| pipeline.intermediate_output(step)),
        })
    }
}

/// Draw each detection's bounding rect onto `frame`.
pub fn draw_detections<O>(frame: &mut Frame, detections: &[DetectedObject<O>]) {
    for object in detections {
        let rect = object.rect();
        for inset in 0..ANNOTATE_RECT_THICKNESS {
            let (Some(width), Some(height)) = (
                rect.width.checked_sub(2 * inset),
                rect.height.checked_sub(2 * inset),
            ) else {
                break;
            };
            if width == 0 || height == 0 {
                break;
            }
            let r = imageproc::rect::Rect::at(rect.x + inset as i32, rect.y + inset as i32)
                .of_size(width, height);
            draw_hollow_rect_mut(frame, r, ANNOTATE_COLOR);
        }
    }
}
