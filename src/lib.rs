pub mod app_state;
pub mod axis;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod handlers;
pub mod operations;
pub mod punch;
pub mod rebin;
pub mod routes;
pub mod telemetry;
pub mod volume;
pub mod window;

pub use axis::{Axis, AxisRange, AxisState};
pub use error::{ApiError, Result, WindowError};
pub use volume::{Quantity, Volume};
pub use window::VolumeWindow;
