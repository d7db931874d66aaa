// Standard library and external crates
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use bevy::log::{debug, error, warn};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use scene_capture::engine::pixel::PixelBuffer;

// Crate modules
use crate::compressor::ImageCompressor;
use crate::error::ExportError;

struct ExportJob {
    pixels: PixelBuffer,
    path: PathBuf,
}

#[derive(Debug, Default)]
struct ExportCounters {
    /// Accepted but not yet written or failed.
    pending: AtomicU32,
    failures: AtomicU32,
    written: AtomicU64,
}

/// Background image writer fed through a bounded FIFO queue.
///
/// One worker thread per capture session. `enqueue` never blocks: images
/// that do not fit are rejected and counted as failures, so flow control
/// belongs to the caller. `stop` closes the queue; the worker drains what
/// was accepted and then exits.
pub struct ImageExporter {
    sender: Option<Sender<ExportJob>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<ExportCounters>,
    compressor: ImageCompressor,
}

impl ImageExporter {
    pub fn spawn(compressor: ImageCompressor, capacity: usize) -> Result<Self, ExportError> {
        let (sender, receiver) = channel::bounded(capacity.max(1));
        let counters = Arc::new(ExportCounters::default());

        let worker_counters = Arc::clone(&counters);
        let worker = thread::Builder::new()
            .name("image-export".to_string())
            .spawn(move || run_worker(receiver, compressor, worker_counters))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            counters,
            compressor,
        })
    }

    pub fn compressor(&self) -> &ImageCompressor {
        &self.compressor
    }

    /// Queue an image without blocking. Returns false, and counts a
    /// failure, when the queue is full or the exporter has been stopped.
    pub fn enqueue(&self, pixels: PixelBuffer, path: PathBuf) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            warn!("Export of {} rejected, exporter stopped", path.display());
            self.counters.failures.fetch_add(1, Ordering::AcqRel);
            return false;
        };

        self.counters.pending.fetch_add(1, Ordering::AcqRel);
        match sender.try_send(ExportJob { pixels, path }) {
            Ok(()) => return true,
            Err(TrySendError::Full(job)) => {
                error!("Export queue full, {} dropped", job.path.display());
            }
            Err(TrySendError::Disconnected(job)) => {
                error!("Export worker is gone, {} dropped", job.path.display());
            }
        }
        self.counters.pending.fetch_sub(1, Ordering::AcqRel);
        self.counters.failures.fetch_add(1, Ordering::AcqRel);
        false
    }

    /// Approximate queue depth including the image being written.
    pub fn pending_count(&self) -> u32 {
        self.counters.pending.load(Ordering::Acquire)
    }

    pub fn is_exporting(&self) -> bool {
        self.pending_count() > 0
    }

    pub fn failure_count(&self) -> u32 {
        self.counters.failures.load(Ordering::Acquire)
    }

    pub fn written_count(&self) -> u64 {
        self.counters.written.load(Ordering::Acquire)
    }

    /// Close the queue. Accepted images are still written.
    pub fn stop(&mut self) {
        if self.sender.take().is_some() {
            debug!("Export queue closed with {} image(s) pending", self.pending_count());
        }
    }

    /// Stop and wait for the worker to drain.
    pub fn join(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Export worker panicked");
            }
        }
    }
}

impl Drop for ImageExporter {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_worker(receiver: Receiver<ExportJob>, compressor: ImageCompressor, counters: Arc<ExportCounters>) {
    for job in receiver.iter() {
        match compressor.write(&job.pixels, &job.path) {
            Ok(()) => {
                counters.written.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => {
                // Keep going, later frames may still succeed.
                counters.failures.fetch_add(1, Ordering::AcqRel);
                error!("Failed to export {}: {}", job.path.display(), e);
            }
        }
        counters.pending.fetch_sub(1, Ordering::AcqRel);
    }
    debug!(
        "Export worker finished, {} written",
        counters.written.load(Ordering::Acquire)
    );
}

#[cfg(test)]
mod tests {
    use scene_capture::config::ImageFormat;
    use scene_capture::engine::pixel::PixelFormat;

    use super::*;

    #[test]
    fn drains_queue_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = ImageExporter::spawn(ImageCompressor::new(ImageFormat::Png, 90), 8).unwrap();

        for index in 0..6 {
            let path = dir.path().join(format!("{:06}.png", index));
            assert!(exporter.enqueue(PixelBuffer::zeroed(8, 8, PixelFormat::Rgba8), path));
        }
        exporter.stop();
        assert!(!exporter.enqueue(
            PixelBuffer::zeroed(8, 8, PixelFormat::Rgba8),
            dir.path().join("late.png")
        ));

        exporter.join();
        assert!(!exporter.is_exporting());
        assert_eq!(exporter.written_count(), 6);
        assert_eq!(exporter.failure_count(), 1);
        assert!(dir.path().join("000005.png").exists());
        assert!(!dir.path().join("late.png").exists());
    }

    #[test]
    fn failed_write_is_counted_and_worker_continues() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_directory");
        std::fs::write(&blocker, b"file").unwrap();

        let mut exporter = ImageExporter::spawn(ImageCompressor::new(ImageFormat::Png, 90), 4).unwrap();
        exporter.enqueue(PixelBuffer::zeroed(2, 2, PixelFormat::R8), blocker.join("a.png"));
        exporter.enqueue(PixelBuffer::zeroed(2, 2, PixelFormat::R8), dir.path().join("b.png"));
        exporter.join();

        assert_eq!(exporter.failure_count(), 1);
        assert_eq!(exporter.written_count(), 1);
        assert!(dir.path().join("b.png").exists());
    }

    #[test]
    fn full_queue_rejects_instead_of_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = ImageExporter::spawn(ImageCompressor::new(ImageFormat::Png, 90), 1).unwrap();
        let images: Vec<PixelBuffer> = (0..16)
            .map(|_| PixelBuffer::zeroed(512, 512, PixelFormat::Rgba8))
            .collect();

        let accepted = images
            .into_iter()
            .enumerate()
            .filter(|(index, pixels)| {
                exporter.enqueue(pixels.clone(), dir.path().join(format!("{:06}.png", index)))
            })
            .count();
        exporter.join();

        assert!(accepted < 16, "a one-slot queue cannot take 16 images at once");
        assert_eq!(exporter.failure_count() as usize, 16 - accepted);
        assert_eq!(exporter.written_count() as usize, accepted);
    }
}
