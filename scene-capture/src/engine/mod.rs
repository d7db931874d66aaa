pub mod camera;
pub mod capture;
pub mod core;
pub mod cuboid;
pub mod manager;
pub mod pixel;
pub mod render;
pub mod scene;
pub mod segmentation;
pub mod systems;
