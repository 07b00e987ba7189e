//! Swappable detection pipeline contract

use crate::error::Result;
use crate::object::Detections;
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::Arc;

/// Image frame handed through the vision stack.
pub type Frame = RgbImage;

/// A pipeline shared between the detector (which installs and resets it)
/// and the vision task thread (which runs it).
pub type SharedPipeline<O> = Arc<Mutex<dyn Pipeline<O>>>;

/// One detection algorithm. Implementations own whatever scratch state
/// they need between stages; the detector never looks inside.
pub trait Pipeline<O>: Send {
    /// Clear internal state. Called once each time the pipeline is installed.
    fn reset(&mut self);

    /// Run every stage of the pipeline on `frame`.
    ///
    /// The frame is owned by the vision task and reused for later captures,
    /// so it must not be retained past the call.
    fn process(&mut self, frame: &Frame) -> Result<()>;

    /// Detections produced by the most recent [`Pipeline::process`].
    fn detected_objects(&self) -> Detections<O>;

    /// Output of stage `step` of the last run, 0 being the input frame.
    /// Returns `None` for steps the pipeline does not have.
    fn intermediate_output(&self, step: usize) -> Option<Frame>;

    fn name(&self) -> &str {
        "pipeline"
    }
}

/// Wrap a pipeline so it can be installed into a detector.
pub fn shared<O, P>(pipeline: P) -> SharedPipeline<O>
where
    P: Pipeline<O> + 'static,
{
    Arc::new(Mutex::new(pipeline))
}
