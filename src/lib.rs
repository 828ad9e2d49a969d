pub mod api;
pub mod classifier;
pub mod config;
pub mod cycle;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod geofence;
pub mod model;
pub mod state;
pub mod store;
pub mod transition;
