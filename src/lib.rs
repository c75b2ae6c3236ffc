//! 动作捕捉运行时
//!
//! 模块划分：
//! - skeleton: 25 关节骨架定义、关节树、变换解算
//! - capture: 帧数据、二进制帧日志、帧存储、实时采集交接
//! - animation: 帧插值与回放控制
//! - physics: 布娃娃构建与物理世界
//! - session: 将以上部分串起来的会话对象

pub mod animation;
pub mod capture;
pub mod physics;
pub mod session;
pub mod skeleton;

use thiserror::Error;

/// 运行时错误
#[derive(Debug, Error)]
pub enum MocapError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 帧日志损坏或被截断
    #[error("Corrupt frame log: {0}")]
    CorruptLog(String),

    /// 实时追加的帧时间戳早于上一帧
    #[error("Out of order frame: timestamp {timestamp} after {previous}")]
    OutOfOrderFrame { previous: i64, timestamp: i64 },

    /// 身体缺少某个关节
    #[error("Incomplete skeleton: missing joint {0:?}")]
    IncompleteSkeleton(JointId),

    /// 帧存储为空
    #[error("Frame store is empty")]
    EmptyStore,

    /// 关节编号超出枚举范围
    #[error("Unknown joint id: {0}")]
    UnknownJoint(i32),
}

pub type Result<T> = std::result::Result<T, MocapError>;

pub use animation::{PlaybackConfig, PlaybackController, PlaybackState};
pub use capture::{Body, Frame, FrameQuery, FrameStore, JointSample};
pub use physics::{PhysicsConfig, Ragdoll, RagdollBuilder, RagdollWorld, RapierWorld};
pub use session::{Session, SessionConfig};
pub use skeleton::{JointId, JointLimit, JointNode, JointTransform, JointTree, TrackingState};
