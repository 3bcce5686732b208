mod image;
mod outcome;

pub use image::*;
pub use outcome::*;
