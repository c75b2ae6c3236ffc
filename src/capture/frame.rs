//! 帧数据
//!
//! Frame / Body / JointSample 创建后不再修改；插值结果总是新建的帧。

use std::collections::BTreeMap;

use glam::{Quat, Vec2, Vec3};

use crate::skeleton::resolver;
use crate::skeleton::{JointId, JointTree, TrackingState, JOINT_COUNT};
use crate::Result;

/// 身体编号（采集设备的身体槽位）
pub type BodyId = u64;

/// 四元数模长平方低于此值视为朝向未知
const ORIENTATION_EPSILON: f32 = 1e-8;

// ============================================================================
// 关节采样
// ============================================================================

/// 单个关节的世界空间采样
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointSample {
    /// 世界位置
    pub position: Vec3,
    /// 世界朝向（零四元数表示未知）
    pub orientation: Quat,
    /// 追踪质量
    pub tracking: TrackingState,
}

impl Default for JointSample {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Self::UNKNOWN_ORIENTATION,
            tracking: TrackingState::NotTracked,
        }
    }
}

impl JointSample {
    /// 朝向未知
    pub const UNKNOWN_ORIENTATION: Quat = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);

    pub fn new(position: Vec3, orientation: Quat, tracking: TrackingState) -> Self {
        Self { position, orientation, tracking }
    }

    /// 是否带有有效朝向
    #[inline]
    pub fn has_orientation(&self) -> bool {
        self.orientation.length_squared() > ORIENTATION_EPSILON
    }

    #[inline]
    pub fn is_tracked(&self) -> bool {
        self.tracking == TrackingState::Tracked
    }

    /// 插值：位置线性、朝向球面（任一端朝向未知时取左端），追踪状态取左端
    pub fn blend(&self, other: &Self, t: f32) -> Self {
        let orientation = if self.has_orientation() && other.has_orientation() {
            self.orientation.normalize().slerp(other.orientation.normalize(), t).normalize()
        } else {
            self.orientation
        };
        Self {
            position: self.position.lerp(other.position, t),
            orientation,
            tracking: self.tracking,
        }
    }
}

// ============================================================================
// 身体
// ============================================================================

/// 一帧中的一个身体
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    samples: [JointSample; JOINT_COUNT],
    lean: Option<Vec2>,
    skeleton: JointTree,
}

impl Body {
    /// 从完整采样创建并解算关节树
    pub fn new(samples: [JointSample; JOINT_COUNT], lean: Option<Vec2>) -> Self {
        let skeleton = resolver::resolve(&samples);
        Self { samples, lean, skeleton }
    }

    /// 从任意顺序的采样创建，缺关节时报 IncompleteSkeleton
    pub fn from_samples<I>(samples: I, lean: Option<Vec2>) -> Result<Self>
    where
        I: IntoIterator<Item = (JointId, JointSample)>,
    {
        Ok(Self::new(resolver::collect_samples(samples)?, lean))
    }

    /// 直接使用已有关节树（插值用）
    pub(crate) fn from_parts(
        samples: [JointSample; JOINT_COUNT],
        lean: Option<Vec2>,
        skeleton: JointTree,
    ) -> Self {
        Self { samples, lean, skeleton }
    }

    #[inline]
    pub fn sample(&self, id: JointId) -> &JointSample {
        &self.samples[id.index()]
    }

    #[inline]
    pub fn samples(&self) -> &[JointSample; JOINT_COUNT] {
        &self.samples
    }

    #[inline]
    pub fn lean(&self) -> Option<Vec2> {
        self.lean
    }

    /// 本帧的关节树
    #[inline]
    pub fn skeleton(&self) -> &JointTree {
        &self.skeleton
    }

    /// 采样给出的关节世界位置
    #[inline]
    pub fn position(&self, id: JointId) -> Vec3 {
        self.samples[id.index()].position
    }
}

/// 采集端交给运行时的原始身体数据
#[derive(Clone, Debug, Default)]
pub struct RawBody {
    pub body_id: BodyId,
    pub lean: Option<Vec2>,
    pub joints: Vec<(JointId, JointSample)>,
}

// ============================================================================
// 帧
// ============================================================================

/// 一个采集时刻
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    timestamp: i64,
    bodies: BTreeMap<BodyId, Body>,
}

impl Frame {
    pub fn new(timestamp: i64, bodies: BTreeMap<BodyId, Body>) -> Self {
        Self { timestamp, bodies }
    }

    /// 没有身体的帧
    pub fn empty(timestamp: i64) -> Self {
        Self::new(timestamp, BTreeMap::new())
    }

    /// 从采集端原始数据构建
    pub fn from_raw<I>(timestamp: i64, raw_bodies: I) -> Result<Self>
    where
        I: IntoIterator<Item = RawBody>,
    {
        let mut bodies = BTreeMap::new();
        for raw in raw_bodies {
            bodies.insert(raw.body_id, Body::from_samples(raw.joints, raw.lean)?);
        }
        Ok(Self::new(timestamp, bodies))
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    pub fn bodies(&self) -> &BTreeMap<BodyId, Body> {
        &self.bodies
    }

    #[inline]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    /// 编号最小的身体
    pub fn first_body(&self) -> Option<(BodyId, &Body)> {
        self.bodies.iter().next().map(|(&id, body)| (id, body))
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}
