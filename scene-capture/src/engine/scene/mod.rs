mod marker;
mod object;
mod snapshot;

pub use marker::SceneMarker;
pub use object::{CaptureObject, MeshData};
pub use snapshot::{RenderObject, RenderScene, SceneGeneration, SceneObject, SceneSnapshot};
