// Building blocks of the engine, from raw pixels up to rendered overlays.

// --- Frame primitives ---
pub mod face;
pub mod frame;
pub mod luma_plane;
pub mod pixel;

// --- Live capture ---
pub mod auto_capture;
pub mod camera;
pub mod capture_store;
pub mod frame_sampler;
pub mod landmarker;
pub mod live_heatmap;
pub mod quality;

// --- Concern map ---
pub mod analysis;
pub mod callout;
pub mod concern_map;
pub mod face_regions;
pub mod heatmap_image;

// --- Drawing ---
pub mod draw;
pub mod font;
pub mod raster;
