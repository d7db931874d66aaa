mod scene_manager;

pub use scene_manager::{
    MarkerFocus, SceneCaptured, SceneManager, SceneManagerRegistry, SceneManagerSettings,
    SceneManagerState,
};
