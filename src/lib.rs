pub mod app;
pub mod camera3d;
pub mod cli;
pub mod config;
pub mod geometry;
pub mod lightmap;
pub mod material;
pub mod overlay;
pub mod reflection_scheduler;
pub mod reflector;
pub mod renderer;
pub mod scene;
pub mod texture;

pub use app::{run, run_with_overrides, App};
