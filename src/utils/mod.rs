pub mod coordinate;
pub mod image;
pub mod overlay;
pub mod utils;
