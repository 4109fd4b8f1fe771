pub mod landmark;
pub mod source;

pub use landmark::{Landmark, LandmarkIndex, Landmarks};
pub use source::{parse_frame, Frame, FrameSource};
