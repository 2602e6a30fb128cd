pub mod decoder;
pub mod framer;

pub use decoder::{decode, resample, FormatHint};
pub use framer::{frame, frame_count, window, Framer, Frames};
