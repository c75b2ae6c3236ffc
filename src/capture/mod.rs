//! 采集数据
//!
//! - frame: 帧、身体、关节采样
//! - frame_log: 二进制帧日志
//! - frame_store: 按时间排序的帧存储
//! - handoff / source: 实时采集线程与单槽交接

mod frame;
pub mod frame_log;
mod frame_store;
pub mod handoff;
pub mod source;

pub use frame::{Body, BodyId, Frame, JointSample, RawBody};
pub use frame_log::{FrameLogReader, FrameLogWriter};
pub use frame_store::{FrameQuery, FrameStore};
pub use handoff::{frame_slot, FrameReceiver, FrameSender};
pub use source::{CaptureSource, CaptureThread, RawCapture};
