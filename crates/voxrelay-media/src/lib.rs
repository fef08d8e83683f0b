//! Speech pipeline — sentence segmentation, synthesis, paced audio delivery.

pub mod google_tts;
pub mod segmenter;
pub mod speech;
pub mod transmit;
