//! Vision task: the periodic worker that drives frame processing.
//!
//! A [`VisionTask`] owns one worker thread for its whole lifetime. While the
//! task is disabled the thread parks on its command channel; once enabled it
//! grabs a frame into the next buffer of its pool, hands it to the
//! [`VisionProcessor`], publishes the detections, optionally streams a debug
//! frame back to the [`VideoSource`], then sleeps out the rest of the
//! processing interval. Only this thread ever calls the processor, so cycles
//! never overlap.

use crate::error::{Result, VisionError};
use crate::object::Detections;
use crate::pipeline::Frame;
use crate::processor::{ProcessedFrame, VideoSource, VisionProcessor};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Span};

/// Wait between polls when the video source has no frame ready.
const IDLE_WAIT: Duration = Duration::from_millis(5);
const PERF_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// What the detector needs from whatever schedules its processing.
pub trait Scheduler<O>: Send + Sync {
    fn set_task_enabled(&self, enabled: bool);
    fn is_task_enabled(&self) -> bool;
    fn set_processing_interval(&self, interval: Duration);
    fn processing_interval(&self) -> Duration;
    /// Select the debug step streamed to the video output (`None` disables
    /// streaming) and whether detections are drawn on it.
    fn set_video_out_enabled(&self, step: Option<usize>, annotate: bool);
    fn set_perf_report_enabled(&self, enabled: bool);
    /// Latest published detections, `None` until a cycle has completed.
    fn detected_objects(&self) -> Option<Detections<O>>;
}

enum TaskCommand {
    Wake,
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default)]
struct VideoOut {
    step: Option<usize>,
    annotate: bool,
}

#[derive(Debug)]
struct PerfStats {
    window_start: Instant,
    frames: u64,
    process_time: Duration,
}

struct TaskShared<O> {
    enabled: AtomicBool,
    interval_ms: AtomicU64,
    perf_report: AtomicBool,
    video_out: Mutex<VideoOut>,
    detections: RwLock<Option<Detections<O>>>,
}

/// Thread backed [`Scheduler`].
pub struct VisionTask<O> {
    name: String,
    shared: Arc<TaskShared<O>>,
    commands: Sender<TaskCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<O: Send + Sync + 'static> VisionTask<O> {
    /// Spawn the worker thread with `num_buffers` frames of
    /// `width` × `height` pre-allocated. The task starts disabled.
    pub fn new<P, V>(
        name: &str,
        processor: P,
        source: V,
        num_buffers: usize,
        width: u32,
        height: u32,
    ) -> Result<Self>
    where
        P: VisionProcessor<O> + 'static,
        V: VideoSource + 'static,
    {
        if num_buffers == 0 {
            return Err(VisionError::Config("need at least one image buffer".to_string()));
        }

        let shared = Arc::new(TaskShared {
            enabled: AtomicBool::new(false),
            interval_ms: AtomicU64::new(0),
            perf_report: AtomicBool::new(false),
            video_out: Mutex::new(VideoOut::default()),
            detections: RwLock::new(None),
        });
        let (commands, receiver) = channel::unbounded();
        let buffers = (0..num_buffers).map(|_| Frame::new(width, height)).collect();

        let worker = Worker {
            shared: Arc::clone(&shared),
            processor,
            source,
            buffers,
            next_buffer: 0,
            commands: receiver,
            span: info_span!("vision_task", name = %name),
            stats: PerfStats {
                window_start: Instant::now(),
                frames: 0,
                process_time: Duration::ZERO,
            },
        };
        let handle = std::thread::Builder::new()
            .name(format!("{}-vision", name))
            .spawn(move || worker.run())?;

        Ok(Self {
            name: name.to_string(),
            shared,
            commands,
            handle: Mutex::new(Some(handle)),
        })
    }
}

impl<O> VisionTask<O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the worker thread and wait for it to exit. Idempotent.
    pub fn shutdown(&self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
        let _ = self.commands.send(TaskCommand::Shutdown);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                error!(task = %self.name, "vision task thread panicked");
            }
        }
    }
}

impl<O: Send + Sync> Scheduler<O> for VisionTask<O> {
    fn set_task_enabled(&self, enabled: bool) {
        // Flip under the snapshot lock so a cycle finishing concurrently
        // cannot republish after the clear.
        let mut detections = self.shared.detections.write();
        let was_enabled = self.shared.enabled.swap(enabled, Ordering::SeqCst);
        if !enabled {
            *detections = None;
        }
        drop(detections);

        if enabled && !was_enabled {
            debug!(task = %self.name, "vision task enabled");
            let _ = self.commands.send(TaskCommand::Wake);
        } else if !enabled && was_enabled {
            debug!(task = %self.name, "vision task disabled");
        }
    }

    fn is_task_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    fn set_processing_interval(&self, interval: Duration) {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.shared.interval_ms.store(ms, Ordering::Relaxed);
    }

    fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.shared.interval_ms.load(Ordering::Relaxed))
    }

    fn set_video_out_enabled(&self, step: Option<usize>, annotate: bool) {
        *self.shared.video_out.lock() = VideoOut { step, annotate };
    }

    fn set_perf_report_enabled(&self, enabled: bool) {
        self.shared.perf_report.store(enabled, Ordering::Relaxed);
    }

    fn detected_objects(&self) -> Option<Detections<O>> {
        self.shared.detections.read().clone()
    }
}

impl<O> Drop for VisionTask<O> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker<O, P, V> {
    shared: Arc<TaskShared<O>>,
    processor: P,
    source: V,
    buffers: Vec<Frame>,
    next_buffer: usize,
    commands: Receiver<TaskCommand>,
    span: Span,
    stats: PerfStats,
}

impl<O, P, V> Worker<O, P, V>
where
    P: VisionProcessor<O>,
    V: VideoSource,
{
    fn run(mut self) {
        let span = self.span.clone();
        let _enter = span.enter();
        info!("vision task started");

        loop {
            if !self.shared.enabled.load(Ordering::SeqCst) {
                match self.commands.recv() {
                    Ok(TaskCommand::Wake) => continue,
                    Ok(TaskCommand::Shutdown) | Err(_) => break,
                }
            }

            let start = Instant::now();
            let got_frame = self.cycle();

            let wait = if got_frame {
                self.processing_interval().saturating_sub(start.elapsed())
            } else {
                IDLE_WAIT
            };
            if !self.pause(wait) {
                break;
            }
        }

        info!("vision task stopped");
    }

    /// One acquire → process → publish → display pass. Returns false when
    /// the source had no frame.
    fn cycle(&mut self) -> bool {
        let index = self.next_buffer;
        self.next_buffer = (self.next_buffer + 1) % self.buffers.len();
        let frame = &mut self.buffers[index];

        if !self.source.get_frame(frame) {
            return false;
        }

        let video_out = *self.shared.video_out.lock();
        let started = Instant::now();
        let result = self.processor.process_cycle(frame, video_out.step);
        let elapsed = started.elapsed();

        match result {
            Ok(ProcessedFrame {
                detections,
                debug_frame,
            }) => {
                {
                    let mut published = self.shared.detections.write();
                    if self.shared.enabled.load(Ordering::SeqCst) {
                        *published = Some(Arc::clone(&detections));
                    }
                }
                if let Some(step) = video_out.step {
                    let output = match debug_frame {
                        Some(output) => Some(output),
                        None if step == 0 => Some(self.buffers[index].clone()),
                        None => None,
                    };
                    match output {
                        Some(mut output) => {
                            if video_out.annotate {
                                self.processor.annotate_frame(&mut output, &detections);
                            }
                            self.source.put_frame(&output);
                        }
                        None => debug!(step, "no intermediate output for step"),
                    }
                }
            }
            Err(err) => {
                // The cycle is dropped; the previous snapshot stays published.
                warn!(error = %err, "frame processing failed");
            }
        }

        self.record(elapsed);
        true
    }

    fn record(&mut self, elapsed: Duration) {
        self.stats.frames += 1;
        self.stats.process_time += elapsed;

        let window = self.stats.window_start.elapsed();
        if window < PERF_REPORT_INTERVAL {
            return;
        }
        if self.shared.perf_report.load(Ordering::Relaxed) {
            let frames = self.stats.frames as f64;
            info!(
                avg_process_ms = self.stats.process_time.as_secs_f64() * 1000.0 / frames,
                frame_rate = frames / window.as_secs_f64(),
                "vision performance"
            );
        }
        self.stats = PerfStats {
            window_start: Instant::now(),
            frames: 0,
            process_time: Duration::ZERO,
        };
    }

    fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.shared.interval_ms.load(Ordering::Relaxed))
    }

    /// Sleep for `wait` while staying responsive to shutdown. A stray wake
    /// does not cut the sleep short. Returns false when the task must exit.
    fn pause(&self, wait: Duration) -> bool {
        if wait.is_zero() {
            return match self.commands.try_recv() {
                Ok(TaskCommand::Shutdown) | Err(TryRecvError::Disconnected) => false,
                Ok(TaskCommand::Wake) | Err(TryRecvError::Empty) => true,
            };
        }
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            match self.commands.recv_timeout(remaining) {
                Ok(TaskCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => return false,
                Ok(TaskCommand::Wake) => continue,
                Err(RecvTimeoutError::Timeout) => return true,
            }
        }
    }
}
