//! Audio preprocessing
//!
//! Prepares decoded audio for analysis:
//! - Channel mixing (multichannel to mono)

pub mod channel_mixer;
