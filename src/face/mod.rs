pub mod image;
pub mod matcher;

pub use self::image::FaceImage;
pub use matcher::{FaceMatcher, FacePolicy};
