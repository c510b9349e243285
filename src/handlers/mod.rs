pub mod binary;
pub mod chunk;
pub mod commands;
pub mod datasets;
pub mod export;
pub mod health;
pub mod operations;
pub mod slice;

pub use chunk::get_export_chunk;
pub use commands::{crop_dataset, edit_dataset, punch_dataset, rebin_dataset, reset_dataset};
pub use datasets::{close_dataset, get_dataset, load_dataset};
pub use export::export_dataset;
pub use health::hello;
pub use operations::get_operations;
pub use slice::{get_rebin_options, get_slice};
