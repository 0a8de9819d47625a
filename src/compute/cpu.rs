//! CPU compute stream.
//!
//! A dedicated worker thread drains a task channel in submission order and
//! runs each kernel on a rayon pool. `synchronize` enqueues a fence and waits
//! for it, so the host never blocks at launch time.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};

use super::failure::{panic_message, FailureSlot};
use super::host_pool::HostBufferPool;
use super::kernels;
use super::stream::ComputeStream;
use super::upload::{BlockUpload, ExtractionParams, PointRecord, SliceParams, SliceUpload};
use crate::core::error::Error;
use crate::core::Result;

type Task = Box<dyn FnOnce() -> Result<()> + Send>;

/// In-order stream executing kernels on the host.
///
/// Do not call [`ComputeStream::synchronize`] from inside an async runtime;
/// it blocks the calling thread.
pub struct CpuStream {
    tasks: Option<mpsc::UnboundedSender<Task>>,
    worker: Option<JoinHandle<()>>,
    pool: Arc<HostBufferPool>,
    /// First task error since the last synchronize
    failure: FailureSlot,
}

impl CpuStream {
    /// Spawn the stream worker.
    ///
    /// `threads` sizes the kernel pool (None = one per core).
    pub fn new(threads: Option<usize>, initial_capacity: usize) -> Result<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("layercast-kernel-{}", i));
        if let Some(threads) = threads {
            builder = builder.num_threads(threads);
        }
        let kernel_pool = builder.build().map_err(|e| Error::Stream(e.to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let failure = FailureSlot::new();
        let worker_failure = failure.clone();

        let worker = std::thread::Builder::new()
            .name("layercast-stream".into())
            .spawn(move || {
                while let Some(task) = rx.blocking_recv() {
                    // A panicking kernel fails its own call; the worker keeps draining
                    let outcome = catch_unwind(AssertUnwindSafe(|| kernel_pool.install(task)));
                    let message = match outcome {
                        Ok(Ok(())) => continue,
                        Ok(Err(e)) => e.to_string(),
                        Err(payload) => format!("kernel panicked: {}", panic_message(payload.as_ref())),
                    };
                    log::error!("Stream task failed: {}", message);
                    worker_failure.record(message);
                }
                log::trace!("Stream worker exiting");
            })?;

        log::debug!(
            "CPU stream started ({} kernel threads)",
            threads.map_or_else(|| "auto".to_string(), |n| n.to_string())
        );

        Ok(Self {
            tasks: Some(tx),
            worker: Some(worker),
            pool: Arc::new(HostBufferPool::new(initial_capacity)),
            failure,
        })
    }

    fn submit(&self, task: Task) -> Result<()> {
        let tasks = self
            .tasks
            .as_ref()
            .ok_or_else(|| Error::Stream("stream is closed".into()))?;
        tasks
            .send(task)
            .map_err(|_| Error::Stream("stream worker has stopped".into()))
    }
}

impl ComputeStream for CpuStream {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn ensure_point_capacity(&mut self, capacity: usize) -> Result<()> {
        self.pool.ensure_capacity(capacity);
        Ok(())
    }

    fn point_capacity(&self) -> usize {
        self.pool.capacity()
    }

    fn launch_point_extraction(&mut self, upload: BlockUpload, params: &ExtractionParams) -> Result<()> {
        let pool = Arc::clone(&self.pool);
        let params = *params;
        let bound = upload.max_points();
        self.submit(Box::new(move || {
            let mut points = pool.points();
            if points.capacity() < bound {
                return Err(Error::Stream(format!(
                    "payload buffer holds {} records, launch needs {}",
                    points.capacity(),
                    bound
                )));
            }
            pool.reset_count();
            let slots = points.begin_launch(bound);
            kernels::extract_points(&upload, &params, slots, pool.count());
            Ok(())
        }))
    }

    fn launch_slice(&mut self, upload: SliceUpload, params: &SliceParams) -> Result<()> {
        let pool = Arc::clone(&self.pool);
        let params = *params;
        self.submit(Box::new(move || {
            let mut out = pool.slice();
            out.clear();
            out.resize(params.cell_count(), params.unknown_value);
            kernels::rasterize_slice(&upload, &params, &mut out);
            Ok(())
        }))
    }

    fn synchronize(&mut self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.submit(Box::new(move || {
            let _ = tx.send(());
            Ok(())
        }))?;
        rx.blocking_recv()
            .map_err(|_| Error::Stream("stream worker stopped before the fence".into()))?;

        match self.failure.take() {
            Some(message) => Err(Error::Stream(message)),
            None => Ok(()),
        }
    }

    fn read_point_count(&mut self) -> Result<usize> {
        Ok(self.pool.load_count())
    }

    fn read_points(&mut self, count: usize, out: &mut Vec<PointRecord>) -> Result<()> {
        let points = self.pool.points();
        let slots = points
            .slots()
            .get(..count)
            .ok_or_else(|| Error::Stream(format!("count {} exceeds payload capacity", count)))?;
        out.clear();
        out.reserve(count);
        for (i, slot) in slots.iter().enumerate() {
            let record = slot
                .get()
                .ok_or_else(|| Error::Stream(format!("payload slot {} was never written", i)))?;
            out.push(*record);
        }
        Ok(())
    }

    fn read_slice(&mut self, out: &mut Vec<f32>) -> Result<()> {
        out.clear();
        out.extend_from_slice(&self.pool.slice());
        Ok(())
    }
}

impl Drop for CpuStream {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.tasks.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Stream worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;
    use crate::compute::upload::GpuVoxel;
    use crate::voxel::index::VOXELS_PER_BLOCK;
    use crate::voxel::voxel::AcceptPredicate;

    fn upload_all_observed(blocks: usize) -> BlockUpload {
        let voxel = GpuVoxel {
            value: 0.0,
            payload: 0,
            observed: 1,
            _pad: 0,
        };
        BlockUpload {
            indices: (0..blocks as i32).map(|x| [x, 0, 0, 0]).collect(),
            voxels: vec![voxel; blocks * VOXELS_PER_BLOCK],
        }
    }

    fn params() -> ExtractionParams {
        ExtractionParams {
            aabb: Aabb::infinite(),
            predicate: AcceptPredicate::Observed,
            voxel_size: 0.1,
            block_size: 0.8,
        }
    }

    #[test]
    fn test_launches_run_in_order() {
        let mut stream = CpuStream::new(Some(2), 0).unwrap();
        stream.ensure_point_capacity(3 * VOXELS_PER_BLOCK).unwrap();

        // Second launch resets the count left by the first
        stream.launch_point_extraction(upload_all_observed(3), &params()).unwrap();
        stream.launch_point_extraction(upload_all_observed(1), &params()).unwrap();
        stream.synchronize().unwrap();

        let count = stream.read_point_count().unwrap();
        assert_eq!(count, VOXELS_PER_BLOCK);
        let mut out = Vec::new();
        stream.read_points(count, &mut out).unwrap();
        assert_eq!(out.len(), count);
    }

    #[test]
    fn test_launch_without_capacity_fails_at_sync() {
        let mut stream = CpuStream::new(Some(1), 0).unwrap();
        stream.launch_point_extraction(upload_all_observed(1), &params()).unwrap();
        assert!(matches!(stream.synchronize(), Err(Error::Stream(_))));
        // The error is reported once
        stream.synchronize().unwrap();
    }

    #[test]
    fn test_worker_survives_a_panicking_task() {
        let mut stream = CpuStream::new(Some(2), 0).unwrap();
        stream.submit(Box::new(|| -> Result<()> { panic!("kernel fault") })).unwrap();
        let err = stream.synchronize().unwrap_err();
        assert!(matches!(&err, Error::Stream(m) if m.contains("kernel fault")), "{err}");

        // Same stream keeps serving launches
        stream.ensure_point_capacity(VOXELS_PER_BLOCK).unwrap();
        stream.launch_point_extraction(upload_all_observed(1), &params()).unwrap();
        stream.synchronize().unwrap();
        assert_eq!(stream.read_point_count().unwrap(), VOXELS_PER_BLOCK);
    }

    #[test]
    fn test_zero_threads_means_automatic() {
        // num_threads(0) means "auto" in rayon, so the stream still starts
        let stream = CpuStream::new(Some(0), 16).unwrap();
        assert_eq!(stream.point_capacity(), 16);
    }
}
