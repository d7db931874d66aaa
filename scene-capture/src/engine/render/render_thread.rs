// Standard library and external crates
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bevy::log::{debug, error, info};
use bevy::math::UVec2;
use bevy::prelude::Resource;
use crossbeam::channel::{self, Sender};

// Crate modules
use super::{RenderPass, RenderSurface, RenderTargetId, SceneRenderer};
use crate::engine::camera::ViewInfo;
use crate::engine::pixel::{copy_surface, PixelBuffer, PixelFormat, ReadbackRequest};
use crate::engine::scene::RenderScene;
use crate::error::CaptureError;

/// Identifies which frame, viewpoint and extractor a readback belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReadbackTicket {
    pub frame_index: u64,
    pub viewpoint_index: usize,
    pub extractor_index: usize,
}

/// Completed readback, delivered back to the capture side.
#[derive(Debug)]
pub struct ReadbackResult {
    pub ticket: ReadbackTicket,
    pub pixels: Result<PixelBuffer, CaptureError>,
}

/// Work items for the render worker. Executed strictly in submission order.
pub enum RenderCommand {
    CreateTarget {
        id: RenderTargetId,
        size: UVec2,
        format: PixelFormat,
    },
    ReleaseTarget(RenderTargetId),
    RenderScene {
        target: RenderTargetId,
        pass: RenderPass,
        scene: Arc<RenderScene>,
        view: ViewInfo,
    },
    Readback {
        target: RenderTargetId,
        request: ReadbackRequest,
        ticket: ReadbackTicket,
        reply: Sender<ReadbackResult>,
    },
    Shutdown,
}

/// Owns the renderer and every render target.
pub struct RenderWorker {
    renderer: Box<dyn SceneRenderer>,
    targets: HashMap<RenderTargetId, RenderSurface>,
}

impl RenderWorker {
    pub fn new(renderer: Box<dyn SceneRenderer>) -> Self {
        Self {
            renderer,
            targets: HashMap::new(),
        }
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Run one command. Returns false once the worker should stop.
    pub fn execute(&mut self, command: RenderCommand) -> bool {
        match command {
            RenderCommand::CreateTarget { id, size, format } => {
                self.targets.insert(id, RenderSurface::new(size, format));
            }
            RenderCommand::ReleaseTarget(id) => {
                self.targets.remove(&id);
            }
            RenderCommand::RenderScene {
                target,
                pass,
                scene,
                view,
            } => match self.targets.get_mut(&target) {
                Some(surface) => self.renderer.render(pass, &scene, &view, surface),
                None => error!("Render pass {:?} targets missing surface {}", pass, target.0),
            },
            RenderCommand::Readback {
                target,
                request,
                ticket,
                reply,
            } => {
                let pixels = match self.targets.get(&target) {
                    Some(surface) => copy_surface(surface, &request),
                    None => Err(CaptureError::MissingRenderTarget(target.0)),
                };
                // Receiver gone means the capturer was despawned mid-frame.
                if reply.send(ReadbackResult { ticket, pixels }).is_err() {
                    debug!("Dropped readback for frame {}", ticket.frame_index);
                }
            }
            RenderCommand::Shutdown => return false,
        }
        true
    }
}

#[derive(Clone)]
enum QueueBackend {
    Threaded(Sender<RenderCommand>),
    Inline(Arc<Mutex<RenderWorker>>),
}

/// Cloneable submission handle shared by every capturer.
#[derive(Clone)]
pub struct RenderQueue {
    backend: QueueBackend,
    next_target: Arc<AtomicU64>,
}

impl RenderQueue {
    /// Queue a command. Returns false if the worker is gone.
    pub fn submit(&self, command: RenderCommand) -> bool {
        match &self.backend {
            QueueBackend::Threaded(sender) => sender.send(command).is_ok(),
            QueueBackend::Inline(worker) => match worker.lock() {
                Ok(mut worker) => {
                    worker.execute(command);
                    true
                }
                Err(_) => false,
            },
        }
    }

    pub fn allocate_target(&self) -> RenderTargetId {
        RenderTargetId(self.next_target.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate an id and queue creation of its surface.
    pub fn create_target(&self, size: UVec2, format: PixelFormat) -> Option<RenderTargetId> {
        let id = self.allocate_target();
        self.submit(RenderCommand::CreateTarget { id, size, format })
            .then_some(id)
    }

    pub fn release_target(&self, id: RenderTargetId) {
        self.submit(RenderCommand::ReleaseTarget(id));
    }
}

/// Render worker handle, inserted as a resource by the capture plugin.
#[derive(Resource)]
pub struct RenderThread {
    queue: RenderQueue,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    /// Run the renderer on its own thread.
    pub fn spawn(renderer: Box<dyn SceneRenderer>) -> Result<Self, CaptureError> {
        let (sender, receiver) = channel::unbounded::<RenderCommand>();
        let handle = std::thread::Builder::new()
            .name("scene-render".to_string())
            .spawn(move || {
                let mut worker = RenderWorker::new(renderer);
                for command in receiver.iter() {
                    if !worker.execute(command) {
                        break;
                    }
                }
                debug!("Render worker stopped");
            })?;

        info!("Render worker thread started");
        Ok(Self {
            queue: RenderQueue {
                backend: QueueBackend::Threaded(sender),
                next_target: Arc::new(AtomicU64::new(1)),
            },
            handle: Some(handle),
        })
    }

    /// Execute commands on the submitting thread, in call order.
    pub fn inline(renderer: Box<dyn SceneRenderer>) -> Self {
        Self {
            queue: RenderQueue {
                backend: QueueBackend::Inline(Arc::new(Mutex::new(RenderWorker::new(renderer)))),
                next_target: Arc::new(AtomicU64::new(1)),
            },
            handle: None,
        }
    }

    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.queue.submit(RenderCommand::Shutdown);
        if handle.join().is_err() {
            error!("Render worker panicked");
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::camera::CameraSettings;
    use bevy::prelude::Transform;

    struct FillRenderer;

    impl SceneRenderer for FillRenderer {
        fn render(
            &mut self,
            _pass: RenderPass,
            _scene: &RenderScene,
            _view: &ViewInfo,
            target: &mut RenderSurface,
        ) {
            for y in 0..target.height() {
                for x in 0..target.width() {
                    target.write_color(x, y, [1.0, 0.5, 0.0, 1.0]);
                }
            }
        }
    }

    fn render_and_read(queue: &RenderQueue) -> ReadbackResult {
        let camera = CameraSettings {
            width: 4,
            height: 2,
            ..Default::default()
        };
        let target = queue
            .create_target(camera.resolution(), PixelFormat::Bgra8)
            .unwrap();
        queue.submit(RenderCommand::RenderScene {
            target,
            pass: RenderPass::Color,
            scene: Arc::new(RenderScene::default()),
            view: ViewInfo::new(Transform::IDENTITY, &camera),
        });

        let (reply, receiver) = channel::bounded(1);
        queue.submit(RenderCommand::Readback {
            target,
            request: ReadbackRequest::default(),
            ticket: ReadbackTicket {
                frame_index: 7,
                ..Default::default()
            },
            reply,
        });
        receiver.recv().unwrap()
    }

    #[test]
    fn threaded_worker_executes_in_order() {
        let mut thread = RenderThread::spawn(Box::new(FillRenderer)).unwrap();
        let result = render_and_read(thread.queue());
        thread.shutdown();

        assert_eq!(result.ticket.frame_index, 7);
        let pixels = result.pixels.unwrap();
        assert_eq!(pixels.format(), PixelFormat::Bgra8);
        assert_eq!(pixels.pixel(3, 1), &[0, 128, 255, 255]);
    }

    #[test]
    fn inline_worker_reports_missing_target() {
        let thread = RenderThread::inline(Box::new(FillRenderer));
        let (reply, receiver) = channel::bounded(1);
        thread.queue().submit(RenderCommand::Readback {
            target: RenderTargetId(99),
            request: ReadbackRequest::default(),
            ticket: ReadbackTicket::default(),
            reply,
        });

        assert!(matches!(
            receiver.recv().unwrap().pixels,
            Err(CaptureError::MissingRenderTarget(99))
        ));
    }

    #[test]
    fn inline_worker_reads_back_rendered_surface() {
        let thread = RenderThread::inline(Box::new(FillRenderer));
        let pixels = render_and_read(thread.queue()).pixels.unwrap();
        assert_eq!((pixels.width(), pixels.height()), (4, 2));
    }
}
