//! 骨架定义 - 25 关节人体骨架
//!
//! 关节编号、父子拓扑、关节角度限制和参考姿态都是常量，
//! 运行时不会改变。

use glam::Vec3;
use std::f32::consts::PI;

use crate::{MocapError, Result};

/// 关节总数
pub const JOINT_COUNT: usize = 25;

// ============================================================================
// 关节编号
// ============================================================================

/// 关节编号（顺序与采集设备的关节类型编号一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum JointId {
    SpineBase = 0,
    SpineMid = 1,
    Neck = 2,
    Head = 3,
    ShoulderLeft = 4,
    ElbowLeft = 5,
    WristLeft = 6,
    HandLeft = 7,
    ShoulderRight = 8,
    ElbowRight = 9,
    WristRight = 10,
    HandRight = 11,
    HipLeft = 12,
    KneeLeft = 13,
    AnkleLeft = 14,
    FootLeft = 15,
    HipRight = 16,
    KneeRight = 17,
    AnkleRight = 18,
    FootRight = 19,
    SpineShoulder = 20,
    HandTipLeft = 21,
    ThumbLeft = 22,
    HandTipRight = 23,
    ThumbRight = 24,
}

impl JointId {
    /// 按编号排列的全部关节
    pub const ALL: [JointId; JOINT_COUNT] = [
        JointId::SpineBase,
        JointId::SpineMid,
        JointId::Neck,
        JointId::Head,
        JointId::ShoulderLeft,
        JointId::ElbowLeft,
        JointId::WristLeft,
        JointId::HandLeft,
        JointId::ShoulderRight,
        JointId::ElbowRight,
        JointId::WristRight,
        JointId::HandRight,
        JointId::HipLeft,
        JointId::KneeLeft,
        JointId::AnkleLeft,
        JointId::FootLeft,
        JointId::HipRight,
        JointId::KneeRight,
        JointId::AnkleRight,
        JointId::FootRight,
        JointId::SpineShoulder,
        JointId::HandTipLeft,
        JointId::ThumbLeft,
        JointId::HandTipRight,
        JointId::ThumbRight,
    ];

    /// 根关节
    pub const ROOT: JointId = JointId::SpineBase;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<JointId> {
        Self::ALL.get(index).copied()
    }

    /// 父关节（根关节返回 None）
    pub fn parent(self) -> Option<JointId> {
        use JointId::*;
        let parent = match self {
            SpineBase => return None,
            SpineMid => SpineBase,
            SpineShoulder => SpineMid,
            Neck => SpineShoulder,
            Head => Neck,
            ShoulderLeft => SpineShoulder,
            ElbowLeft => ShoulderLeft,
            WristLeft => ElbowLeft,
            HandLeft => WristLeft,
            HandTipLeft => HandLeft,
            ThumbLeft => HandLeft,
            ShoulderRight => SpineShoulder,
            ElbowRight => ShoulderRight,
            WristRight => ElbowRight,
            HandRight => WristRight,
            HandTipRight => HandRight,
            ThumbRight => HandRight,
            HipLeft => SpineBase,
            KneeLeft => HipLeft,
            AnkleLeft => KneeLeft,
            FootLeft => AnkleLeft,
            HipRight => SpineBase,
            KneeRight => HipRight,
            AnkleRight => KneeRight,
            FootRight => AnkleRight,
        };
        Some(parent)
    }

    /// 子关节列表
    pub fn children(self) -> &'static [JointId] {
        use JointId::*;
        match self {
            SpineBase => &[SpineMid, HipLeft, HipRight],
            SpineMid => &[SpineShoulder],
            SpineShoulder => &[Neck, ShoulderLeft, ShoulderRight],
            Neck => &[Head],
            ShoulderLeft => &[ElbowLeft],
            ElbowLeft => &[WristLeft],
            WristLeft => &[HandLeft],
            HandLeft => &[HandTipLeft, ThumbLeft],
            ShoulderRight => &[ElbowRight],
            ElbowRight => &[WristRight],
            WristRight => &[HandRight],
            HandRight => &[HandTipRight, ThumbRight],
            HipLeft => &[KneeLeft],
            KneeLeft => &[AnkleLeft],
            AnkleLeft => &[FootLeft],
            HipRight => &[KneeRight],
            KneeRight => &[AnkleRight],
            AnkleRight => &[FootRight],
            Head | HandTipLeft | ThumbLeft | HandTipRight | ThumbRight | FootLeft | FootRight => &[],
        }
    }

    /// 是否为末端关节（手、脚、头）
    pub fn is_extremity(self) -> bool {
        EXTREMITIES.contains(&self)
    }

    /// 关节角度限制
    #[inline]
    pub fn limit(self) -> JointLimit {
        JOINT_LIMITS[self.index()]
    }
}

impl TryFrom<i32> for JointId {
    type Error = MocapError;

    fn try_from(raw: i32) -> Result<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(JointId::from_index)
            .ok_or(MocapError::UnknownJoint(raw))
    }
}

/// 深度优先顺序（父关节总在子关节之前）
pub const DEPTH_FIRST_ORDER: [JointId; JOINT_COUNT] = [
    JointId::SpineBase,
    JointId::SpineMid,
    JointId::SpineShoulder,
    JointId::Neck,
    JointId::Head,
    JointId::ShoulderLeft,
    JointId::ElbowLeft,
    JointId::WristLeft,
    JointId::HandLeft,
    JointId::HandTipLeft,
    JointId::ThumbLeft,
    JointId::ShoulderRight,
    JointId::ElbowRight,
    JointId::WristRight,
    JointId::HandRight,
    JointId::HandTipRight,
    JointId::ThumbRight,
    JointId::HipLeft,
    JointId::KneeLeft,
    JointId::AnkleLeft,
    JointId::FootLeft,
    JointId::HipRight,
    JointId::KneeRight,
    JointId::AnkleRight,
    JointId::FootRight,
];

/// 末端关节，布娃娃会为它们额外创建拖拽锚点
pub const EXTREMITIES: [JointId; 5] = [
    JointId::Head,
    JointId::HandLeft,
    JointId::HandRight,
    JointId::FootLeft,
    JointId::FootRight,
];

/// 全部父子关系 (parent, child)
pub fn topology() -> impl Iterator<Item = (JointId, JointId)> {
    DEPTH_FIRST_ORDER
        .iter()
        .filter_map(|&joint| joint.parent().map(|parent| (parent, joint)))
}

// ============================================================================
// 追踪状态
// ============================================================================

/// 单个关节的追踪质量
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrackingState {
    #[default]
    NotTracked = 0,
    Inferred = 1,
    Tracked = 2,
}

impl TrackingState {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::NotTracked),
            1 => Some(Self::Inferred),
            2 => Some(Self::Tracked),
            _ => None,
        }
    }

    #[inline]
    pub fn to_raw(self) -> i32 {
        self as i32
    }
}

// ============================================================================
// 关节限制
// ============================================================================

/// 关节相对旋转限制
///
/// 以 π 为单位归一化的欧拉角（X, Y, Z），使用时再换算成弧度。
/// 骨骼方向为本地 +Y，铰链关节绕本地 X 轴弯曲。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointLimit {
    pub lower: Vec3,
    pub upper: Vec3,
}

impl JointLimit {
    pub const fn new(lower: Vec3, upper: Vec3) -> Self {
        Self { lower, upper }
    }

    /// 下限（弧度）
    #[inline]
    pub fn lower_radians(&self) -> Vec3 {
        self.lower * PI
    }

    /// 上限（弧度）
    #[inline]
    pub fn upper_radians(&self) -> Vec3 {
        self.upper * PI
    }

    /// 每个轴的活动范围
    #[inline]
    pub fn range(&self) -> Vec3 {
        self.upper - self.lower
    }

    /// 所有轴都几乎不能转动
    pub fn is_rigid(&self) -> bool {
        self.range().max_element() <= RIGID_RANGE * 2.0 + f32::EPSILON
    }

    /// 只有一个轴能转动时返回该轴（0=X, 1=Y, 2=Z）
    pub fn hinge_axis(&self) -> Option<usize> {
        let range = self.range().to_array();
        let free: Vec<usize> = (0..3)
            .filter(|&axis| range[axis] > RIGID_RANGE * 2.0 + f32::EPSILON)
            .collect();
        match free.as_slice() {
            [axis] => Some(*axis),
            _ => None,
        }
    }
}

const RIGID_RANGE: f32 = 0.02;

const RIGID: JointLimit = JointLimit::new(
    Vec3::splat(-RIGID_RANGE),
    Vec3::splat(RIGID_RANGE),
);
const SHOULDER: JointLimit = JointLimit::new(Vec3::new(-0.5, -0.5, -0.5), Vec3::new(0.5, 0.5, 0.5));
const HIP: JointLimit = JointLimit::new(Vec3::new(-0.5, -0.25, -0.3), Vec3::new(0.5, 0.25, 0.3));
const ELBOW: JointLimit = JointLimit::new(
    Vec3::new(-0.8, -RIGID_RANGE, -RIGID_RANGE),
    Vec3::new(0.0, RIGID_RANGE, RIGID_RANGE),
);
const KNEE: JointLimit = JointLimit::new(
    Vec3::new(0.0, -RIGID_RANGE, -RIGID_RANGE),
    Vec3::new(0.8, RIGID_RANGE, RIGID_RANGE),
);

/// 关节限制表（按 JointId 编号排列）
///
/// 手工调好的常量，作为配置数据使用。
pub const JOINT_LIMITS: [JointLimit; JOINT_COUNT] = [
    RIGID,    // SpineBase
    RIGID,    // SpineMid
    RIGID,    // Neck
    RIGID,    // Head
    SHOULDER, // ShoulderLeft
    ELBOW,    // ElbowLeft
    RIGID,    // WristLeft
    RIGID,    // HandLeft
    SHOULDER, // ShoulderRight
    ELBOW,    // ElbowRight
    RIGID,    // WristRight
    RIGID,    // HandRight
    HIP,      // HipLeft
    KNEE,     // KneeLeft
    RIGID,    // AnkleLeft
    RIGID,    // FootLeft
    HIP,      // HipRight
    KNEE,     // KneeRight
    RIGID,    // AnkleRight
    RIGID,    // FootRight
    RIGID,    // SpineShoulder
    RIGID,    // HandTipLeft
    RIGID,    // ThumbLeft
    RIGID,    // HandTipRight
    RIGID,    // ThumbRight
];

/// 按原始编号查询限制，编号越界直接报错
pub fn limit_for_raw(raw: i32) -> Result<JointLimit> {
    JointId::try_from(raw).map(JointId::limit)
}

// ============================================================================
// 参考姿态
// ============================================================================

/// T 形参考姿态的世界坐标（米，Y 轴向上）
pub const BIND_POSE_POSITIONS: [Vec3; JOINT_COUNT] = [
    Vec3::new(0.0, 0.95, 0.0),     // SpineBase
    Vec3::new(0.0, 1.20, 0.0),     // SpineMid
    Vec3::new(0.0, 1.52, 0.0),     // Neck
    Vec3::new(0.0, 1.68, 0.0),     // Head
    Vec3::new(-0.18, 1.42, 0.0),   // ShoulderLeft
    Vec3::new(-0.45, 1.42, 0.0),   // ElbowLeft
    Vec3::new(-0.70, 1.42, 0.0),   // WristLeft
    Vec3::new(-0.78, 1.42, 0.0),   // HandLeft
    Vec3::new(0.18, 1.42, 0.0),    // ShoulderRight
    Vec3::new(0.45, 1.42, 0.0),    // ElbowRight
    Vec3::new(0.70, 1.42, 0.0),    // WristRight
    Vec3::new(0.78, 1.42, 0.0),    // HandRight
    Vec3::new(-0.09, 0.92, 0.0),   // HipLeft
    Vec3::new(-0.09, 0.50, 0.0),   // KneeLeft
    Vec3::new(-0.09, 0.08, 0.0),   // AnkleLeft
    Vec3::new(-0.09, 0.02, 0.12),  // FootLeft
    Vec3::new(0.09, 0.92, 0.0),    // HipRight
    Vec3::new(0.09, 0.50, 0.0),    // KneeRight
    Vec3::new(0.09, 0.08, 0.0),    // AnkleRight
    Vec3::new(0.09, 0.02, 0.12),   // FootRight
    Vec3::new(0.0, 1.45, 0.0),     // SpineShoulder
    Vec3::new(-0.88, 1.42, 0.0),   // HandTipLeft
    Vec3::new(-0.80, 1.42, 0.05),  // ThumbLeft
    Vec3::new(0.88, 1.42, 0.0),    // HandTipRight
    Vec3::new(0.80, 1.42, 0.05),   // ThumbRight
];
