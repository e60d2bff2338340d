mod data_format;
mod inventory;
mod results;

pub use data_format::DataFormat;
pub use inventory::*;
pub use results::*;
