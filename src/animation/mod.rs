//! 动画回放
//!
//! - interpolation: 两帧之间的插值
//! - playback: 回放游标与播放控制

pub mod interpolation;
mod playback;

pub use playback::{PlaybackConfig, PlaybackController, PlaybackState};
