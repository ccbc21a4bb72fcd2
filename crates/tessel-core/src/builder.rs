//! Offline baking of graph snapshots over a frame range.
//!
//! A [`Builder`] owns one worker thread and a job queue guarded by a
//! `parking_lot` mutex. Each [`BuildJob`] is baked by [`bake_job`] on a fresh
//! building-mode [`EvaluationContext`] with its own backend, so baking never
//! touches the interactive context's targets.
//!
//! ```rust,ignore
//! let builder = Builder::new(factory, BuilderConfig::default());
//! builder.submit(BuildJob::new("albedo", graph.clone(), vec![out], Box::new(sink)));
//! while builder.is_busy() != Some(false) { /* draw builder.poll_progress() */ }
//! ```

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::backend::BackendFactory;
use crate::codec::FrameSink;
use crate::context::{ContextConfig, DirtyFlags, EvaluationContext};
use crate::error::BuildError;
use crate::graph::StageCollection;
use crate::stage::StageId;

/// Baking settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Working width of default-sized targets.
    pub width: u32,
    /// Working height of default-sized targets.
    pub height: u32,
    /// Extra `evaluate` calls allowed per frame while native stages are pending.
    pub max_passes_per_frame: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            width: 4096,
            height: 4096,
            max_passes_per_frame: 16,
        }
    }
}

/// A graph snapshot to bake.
pub struct BuildJob {
    /// Display name.
    pub name: String,
    /// Snapshot owned by the job.
    pub graph: StageCollection,
    /// Stages whose pixels go to the sink each frame.
    pub outputs: Vec<StageId>,
    /// Receives the baked frames.
    pub sink: Box<dyn FrameSink + Send>,
}

impl BuildJob {
    /// Bundles a job.
    pub fn new(
        name: impl Into<String>,
        graph: StageCollection,
        outputs: Vec<StageId>,
        sink: Box<dyn FrameSink + Send>,
    ) -> Self {
        Self {
            name: name.into(),
            graph,
            outputs,
            sink,
        }
    }
}

impl std::fmt::Debug for BuildJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildJob")
            .field("name", &self.name)
            .field("stages", &self.graph.len())
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// Progress of one queued or running job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    /// Job name.
    pub name: String,
    /// `0..=1`.
    pub progress: f32,
    /// Being baked right now.
    pub running: bool,
}

/// Summary of a finished bake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BakeReport {
    /// Job name.
    pub name: String,
    /// Frames baked, in order.
    pub frames: Vec<i32>,
    /// `evaluate` calls issued.
    pub evaluations: usize,
    /// Frames handed to the sink, all outputs counted.
    pub written: usize,
}

/// Outcome of a job run by the worker.
#[derive(Debug)]
pub struct FinishedJob {
    /// Job name.
    pub name: String,
    /// Report or error.
    pub result: Result<BakeReport, BuildError>,
}

/// Bakes `job` on the calling thread.
///
/// For every frame of the job's range the graph's time and animation are
/// applied, every stage is forced dirty, and one `evaluate` runs (more only
/// while native executors report pending work). `on_progress` receives the
/// fraction of frames done.
pub fn bake_job(
    job: BuildJob,
    factory: &BackendFactory,
    config: BuilderConfig,
    mut on_progress: impl FnMut(f32),
) -> Result<BakeReport, BuildError> {
    let BuildJob {
        name,
        mut graph,
        outputs,
        mut sink,
    } = job;
    if let Some(&missing) = outputs.iter().find(|o| !graph.contains(**o)) {
        return Err(BuildError::MissingOutput(missing));
    }
    let range: Range<i32> = graph
        .frame_range()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| BuildError::EmptyFrameRange(name.clone()))?;
    tracing::info!(job = %name, frames = ?range, "bake started");

    let mut ctx = EvaluationContext::new(
        factory(),
        ContextConfig::building(config.width, config.height),
    );
    ctx.set_all_dirty(&graph, DirtyFlags::FORCED);
    for &output in &outputs {
        ctx.set_persistent(output, true);
    }

    let total = range.len();
    let mut report = BakeReport {
        name: name.clone(),
        ..BakeReport::default()
    };
    for (done, frame) in range.enumerate() {
        ctx.set_time(&graph, frame);
        for id in graph.apply_animation(frame) {
            ctx.set_dirty(&graph, id, DirtyFlags::PARAMETER, false);
        }
        ctx.set_all_dirty(&graph, DirtyFlags::FORCED);

        let mut pass = ctx.evaluate(&graph);
        report.evaluations += 1;
        let mut passes = 1;
        while !pass.is_idle()
            && passes < config.max_passes_per_frame
            && !(pass.executed.is_empty() && pass.pending.is_empty())
        {
            pass = ctx.evaluate(&graph);
            report.evaluations += 1;
            passes += 1;
        }
        if !pass.is_idle() {
            tracing::warn!(job = %name, frame, remaining = pass.remaining, "frame baked incomplete");
        }

        for &output in &outputs {
            let pixels = ctx
                .read_pixels(output)?
                .ok_or(BuildError::MissingOutput(output))?;
            sink.write_frame(output, frame, &pixels)?;
            report.written += 1;
        }
        report.frames.push(frame);
        on_progress((done + 1) as f32 / total as f32);
    }
    sink.finish()?;
    tracing::info!(job = %name, frames = report.frames.len(), "bake finished");
    Ok(report)
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<BuildJob>,
    progress: Vec<JobProgress>,
    finished: Vec<FinishedJob>,
    busy: bool,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    idle: Condvar,
}

/// Background baker with a single worker thread.
pub struct Builder {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Builder {
    /// Starts the worker. Every job gets a fresh backend from `factory`.
    pub fn new(factory: BackendFactory, config: BuilderConfig) -> Self {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || worker_loop(&worker_shared, &factory, config));
        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Queues a job.
    pub fn submit(&self, job: BuildJob) {
        let mut queue = self.shared.queue.lock();
        queue.progress.push(JobProgress {
            name: job.name.clone(),
            progress: 0.0,
            running: false,
        });
        tracing::debug!(job = %job.name, queued = queue.jobs.len() + 1, "job submitted");
        queue.jobs.push_back(job);
        self.shared.wake.notify_one();
    }

    /// Snapshot of queued and running jobs. `None` if the worker holds the
    /// lock right now.
    pub fn poll_progress(&self) -> Option<Vec<JobProgress>> {
        self.shared.queue.try_lock().map(|q| q.progress.clone())
    }

    /// Returns `Some(true)` while any job is queued or running. `None` if
    /// the worker holds the lock right now.
    pub fn is_busy(&self) -> Option<bool> {
        self.shared
            .queue
            .try_lock()
            .map(|q| q.busy || !q.jobs.is_empty())
    }

    /// Blocks until the queue is empty and the worker is idle.
    pub fn wait_idle(&self) {
        let mut queue = self.shared.queue.lock();
        while queue.busy || !queue.jobs.is_empty() {
            self.shared.idle.wait(&mut queue);
        }
    }

    /// Takes the results of jobs finished since the last call.
    pub fn take_finished(&self) -> Vec<FinishedJob> {
        std::mem::take(&mut self.shared.queue.lock().finished)
    }
}

impl Drop for Builder {
    /// Lets the running job finish; queued jobs are dropped.
    fn drop(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.jobs.clear();
            self.shared.wake.notify_all();
        }
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("builder worker panicked");
        }
    }
}

fn worker_loop(shared: &Shared, factory: &BackendFactory, config: BuilderConfig) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.shutdown {
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    queue.busy = true;
                    if let Some(entry) = queue.progress.first_mut() {
                        entry.running = true;
                    }
                    break job;
                }
                shared.wake.wait(&mut queue);
            }
        };

        let name = job.name.clone();
        let result = bake_job(job, factory, config, |progress| {
            if let Some(entry) = shared.queue.lock().progress.first_mut() {
                entry.progress = progress;
            }
        });
        if let Err(err) = &result {
            tracing::warn!(job = %name, %err, "bake failed");
        }

        let mut queue = shared.queue.lock();
        if !queue.progress.is_empty() {
            queue.progress.remove(0);
        }
        queue.finished.push(FinishedJob { name, result });
        queue.busy = false;
        if queue.jobs.is_empty() {
            shared.idle.notify_all();
        }
    }
}
