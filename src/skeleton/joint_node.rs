//! 关节节点
//!
//! JointNode 是关节树的基本单元，每个 JointId 对应一个节点。
//! 父子关系只保存编号，所有权方向是根到叶。

use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};

use super::schema::{JointId, TrackingState};
use super::JointTransform;

// ============================================================================
// 关节标志
// ============================================================================

bitflags! {
    /// 关节标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct JointFlags: u32 {
        /// 根关节
        const ROOT = 1 << 0;
        /// 末端关节（手、脚、头）
        const EXTREMITY = 1 << 1;
        /// 刚性关节（限制范围接近 0）
        const RIGID = 1 << 2;
        /// 调试高亮
        const HIGHLIGHTED = 1 << 3;
        /// 朝向由骨骼方向推导（采样朝向未知）
        const DERIVED_ORIENTATION = 1 << 4;
    }
}

/// 默认调试颜色
pub const DEFAULT_COLOR: Vec4 = Vec4::new(0.8, 0.8, 0.8, 1.0);

// ============================================================================
// 关节节点
// ============================================================================

/// 关节节点
///
/// - 静态数据：编号、父子关系、标志（来自骨架定义）
/// - 动态数据：每帧重新填充的本地变换、骨长和追踪状态
#[derive(Clone, Debug, PartialEq)]
pub struct JointNode {
    // ========================================
    // 静态数据（初始化后不变）
    // ========================================
    /// 关节编号
    pub id: JointId,

    /// 父关节（根关节为 None）
    pub parent: Option<JointId>,

    /// 子关节
    pub children: &'static [JointId],

    /// 关节标志
    pub flags: JointFlags,

    // ========================================
    // 动态数据（每帧更新）
    // ========================================
    /// 本地变换（相对父关节）
    local: JointTransform,

    /// 骨长：父关节原点在本关节本地坐标系中的距离
    bone_length: f32,

    /// 追踪状态
    pub tracking: TrackingState,

    /// 调试颜色
    pub color: Vec4,
}

impl JointNode {
    pub fn new(id: JointId) -> Self {
        let mut flags = JointFlags::empty();
        if id.parent().is_none() {
            flags |= JointFlags::ROOT;
        }
        if id.is_extremity() {
            flags |= JointFlags::EXTREMITY;
        }
        if id.limit().is_rigid() {
            flags |= JointFlags::RIGID;
        }

        Self {
            id,
            parent: id.parent(),
            children: id.children(),
            flags,
            local: JointTransform::IDENTITY,
            bone_length: 0.0,
            tracking: TrackingState::NotTracked,
            color: DEFAULT_COLOR,
        }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn local_transform(&self) -> &JointTransform {
        &self.local
    }

    #[inline]
    pub fn local_matrix(&self) -> Mat4 {
        self.local.to_matrix()
    }

    /// 设置本地变换，同时刷新骨长
    pub fn set_local_transform(&mut self, local: JointTransform) {
        self.local = local;
        self.bone_length = self.compute_bone_length();
    }

    #[inline]
    pub fn bone_length(&self) -> f32 {
        self.bone_length
    }

    /// 父关节原点在本地坐标系中的位置（骨骼指向父关节的向量）
    pub fn parent_offset(&self) -> Vec3 {
        if self.is_root() {
            return Vec3::ZERO;
        }
        self.local.to_matrix().inverse().transform_point3(Vec3::ZERO)
    }

    fn compute_bone_length(&self) -> f32 {
        let length = self.parent_offset().length();
        if length.is_finite() {
            length
        } else {
            0.0
        }
    }

    // ========================================
    // 调试显示
    // ========================================

    #[inline]
    pub fn is_highlighted(&self) -> bool {
        self.flags.contains(JointFlags::HIGHLIGHTED)
    }

    pub fn set_highlight(&mut self, color: Option<Vec4>) {
        match color {
            Some(color) => {
                self.flags.insert(JointFlags::HIGHLIGHTED);
                self.color = color;
            }
            None => {
                self.flags.remove(JointFlags::HIGHLIGHTED);
                self.color = DEFAULT_COLOR;
            }
        }
    }
}
