// This module contains all the MNIST-specific code in the project

pub mod header;

mod label_map;
pub use label_map::{raster_file_name, LabelMap};

mod raster;
pub use raster::{read_raster, write_raster, Raster};

mod unpack_mnist;
pub use unpack_mnist::{unpack_mnist, UnpackSummary};
