//! 骨骼系统
//!
//! 核心设计思想：
//! - JointNode: 单个关节节点，按 JointId 编号存放
//! - JointTree: 关节树（arena），父子关系用编号表示
//! - resolver: 把世界空间采样解算为本地变换

mod joint_node;
mod joint_tree;
pub mod resolver;
pub mod schema;

pub use joint_node::{JointFlags, JointNode};
pub use joint_tree::JointTree;
pub use schema::{JointId, JointLimit, TrackingState, JOINT_COUNT};

use glam::{Mat4, Quat, Vec3};

// ============================================================================
// 公共类型定义
// ============================================================================

/// 关节本地变换
///
/// 组合顺序：先旋转，再平移，最后整体缩放。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for JointTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl JointTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::IDENTITY }
    }

    #[inline]
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self { translation, rotation, scale: Vec3::ONE }
    }

    /// 转换为 4x4 矩阵
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale(self.scale) * Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// 从矩阵分解
    #[inline]
    pub fn from_matrix(m: Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self { translation, rotation, scale }
    }

    /// 两个变换之间插值：平移、缩放线性插值，旋转球面插值
    pub fn blend(&self, other: &Self, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t).normalize(),
            scale: self.scale.lerp(other.scale, t),
        }
    }

    /// 吸附数值噪声
    ///
    /// 缩放接近 1、旋转分量接近 0/±1、平移分量接近 0 时取精确值。
    pub fn snapped(&self) -> Self {
        let scale = Vec3::from_array(self.scale.to_array().map(|v| snap(v, &[1.0])));
        let translation = Vec3::from_array(self.translation.to_array().map(|v| snap(v, &[0.0])));
        let rotation = Quat::from_array(self.rotation.to_array().map(|v| snap(v, &[0.0, 1.0, -1.0])));
        let rotation = if rotation.length_squared() > 0.0 {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };
        Self { translation, rotation, scale }
    }
}

/// 吸附阈值
pub const SNAP_EPSILON: f32 = 1e-3;

#[inline]
fn snap(value: f32, targets: &[f32]) -> f32 {
    targets
        .iter()
        .copied()
        .find(|target| (value - target).abs() < SNAP_EPSILON)
        .unwrap_or(value)
}
