mod rasterizer;
mod render_thread;
mod surface;

pub use rasterizer::SoftwareRasterizer;
pub use render_thread::{
    ReadbackResult, ReadbackTicket, RenderCommand, RenderQueue, RenderThread, RenderWorker,
};
pub use surface::RenderSurface;

use serde::{Deserialize, Serialize};

use crate::engine::camera::ViewInfo;
use crate::engine::scene::RenderScene;

/// Handle to a render target owned by the render worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u64);

/// What a render pass writes into its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderPass {
    /// Shaded scene colour.
    Color,
    /// Linear view depth in world units, 0 where nothing was hit.
    Depth,
    /// Class segmentation id per pixel.
    ClassMask,
    /// Instance segmentation id per pixel.
    InstanceMask,
}

/// Draws a scene snapshot into a render surface. Runs on the render worker.
pub trait SceneRenderer: Send + 'static {
    fn render(
        &mut self,
        pass: RenderPass,
        scene: &RenderScene,
        view: &ViewInfo,
        target: &mut RenderSurface,
    );
}
