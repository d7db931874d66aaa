pub mod capture_systems;
pub mod manager_systems;
pub mod scene_tracking;
