//! 布娃娃
//!
//! 从参考骨架一次性构建：每个关节一个刚体，每对父子关节一个约束，
//! 头、手、脚额外各有一个锚点约束（初始禁用）。
//! 之后每个 tick 只更新锚点目标并读回刚体位姿。

use glam::{Mat4, Quat, Vec3};

use super::config::PhysicsConfig;
use super::world::{AnchorDesc, BodyDesc, JointDesc, RagdollWorld};
use crate::capture::Body;
use crate::skeleton::schema::DEPTH_FIRST_ORDER;
use crate::skeleton::{JointId, JointLimit, JointTransform, JointTree, JOINT_COUNT};

/// 布娃娃刚体
#[derive(Debug, Clone, PartialEq)]
pub struct RagdollBody<B> {
    /// 对应的关节
    pub joint: JointId,
    /// 父刚体在 Ragdoll::bodies 中的下标
    pub parent: Option<usize>,
    pub handle: B,
    /// 盒子半边长
    pub half_extents: Vec3,
    /// 骨骼中点（刚体局部空间），即指向父关节向量的一半
    pub half_offset: Vec3,
    /// 当前世界位置
    pub position: Vec3,
    /// 当前世界朝向
    pub rotation: Quat,
}

impl<B> RagdollBody<B> {
    #[inline]
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

/// 约束类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// 父子关节约束（parent 为父刚体下标）
    Joint { parent: usize },
    /// 末端锚点约束
    Anchor,
}

/// 布娃娃约束
#[derive(Debug, Clone, PartialEq)]
pub struct RagdollConstraint<C> {
    pub joint: JointId,
    /// 所属（子）刚体的下标
    pub body: usize,
    pub kind: ConstraintKind,
    pub handle: C,
    /// 父子约束的旋转限制；锚点没有限制
    pub limit: Option<JointLimit>,
    pub enabled: bool,
    /// 锚点当前目标
    pub target: Option<Vec3>,
}

// ============================================================================
// 构建
// ============================================================================

/// 布娃娃构建器
///
/// build 消耗构建器本身，同一个骨架实例只会向世界注册一次。
pub struct RagdollBuilder<'a> {
    skeleton: &'a JointTree,
    config: PhysicsConfig,
}

impl<'a> RagdollBuilder<'a> {
    pub fn new(skeleton: &'a JointTree, config: &PhysicsConfig) -> Self {
        Self {
            skeleton,
            config: config.clone(),
        }
    }

    /// 深度优先遍历骨架，注册全部刚体、约束和锚点
    pub fn build<W: RagdollWorld>(self, world: &mut W) -> Ragdoll<W> {
        let world_matrices = self.skeleton.world_matrices();
        let mut bodies: Vec<RagdollBody<W::BodyHandle>> = Vec::with_capacity(JOINT_COUNT);
        let mut body_index = [0usize; JOINT_COUNT];

        // 第一步：刚体
        for &id in DEPTH_FIRST_ORDER.iter() {
            let node = self.skeleton.node(id);
            let JointTransform { translation: position, rotation, .. } =
                JointTransform::from_matrix(world_matrices[id.index()]);
            let rotation = rotation.normalize();

            // 指向父关节的骨骼向量，在本关节局部空间
            let to_parent = match node.parent {
                Some(parent) => {
                    let parent_position = world_matrices[parent.index()].w_axis.truncate();
                    rotation.inverse() * (parent_position - position)
                }
                None => Vec3::ZERO,
            };
            let half_offset = to_parent * 0.5;
            let length = to_parent.length().max(self.config.min_bone_length);
            let half_extents = Vec3::new(
                self.config.bone_thickness * 0.5,
                length * 0.5,
                self.config.bone_thickness * 0.5,
            );
            // 盒子的长轴（Y）沿骨骼方向
            let collider_rotation = if to_parent.length_squared() > f32::EPSILON {
                Quat::from_rotation_arc(Vec3::Y, to_parent.normalize())
            } else {
                Quat::IDENTITY
            };

            let handle = world.add_body(&BodyDesc {
                joint: id,
                position,
                rotation,
                half_extents,
                collider_offset: half_offset,
                collider_rotation,
                density: self.config.body_density,
            });

            body_index[id.index()] = bodies.len();
            bodies.push(RagdollBody {
                joint: id,
                parent: node.parent.map(|parent| body_index[parent.index()]),
                handle,
                half_extents,
                half_offset,
                position,
                rotation,
            });
        }

        // 第二步：父子约束，枢轴是两者共享的父关节位置，限制以参考姿态为零点
        let mut constraints = Vec::with_capacity(JOINT_COUNT - 1 + EXTREMITY_COUNT);
        if self.config.joints_enabled {
            for (index, body) in bodies.iter().enumerate() {
                let Some(parent) = body.parent else {
                    continue;
                };
                let limit = body.joint.limit();
                let handle = world.add_joint(&JointDesc {
                    joint: body.joint,
                    parent: bodies[parent].handle,
                    child: body.handle,
                    parent_anchor: Vec3::ZERO,
                    child_anchor: body.half_offset * 2.0,
                    rest_rotation: (bodies[parent].rotation.inverse() * body.rotation).normalize(),
                    limit,
                });
                constraints.push(RagdollConstraint {
                    joint: body.joint,
                    body: index,
                    kind: ConstraintKind::Joint { parent },
                    handle,
                    limit: Some(limit),
                    enabled: true,
                    target: None,
                });
            }
        }

        // 第三步：末端锚点（禁用，等待实时追踪数据）
        let mut anchors = [None; JOINT_COUNT];
        for &id in DEPTH_FIRST_ORDER.iter().filter(|id| id.is_extremity()) {
            let index = body_index[id.index()];
            let body = &bodies[index];
            let handle = world.add_anchor(&AnchorDesc {
                joint: id,
                body: body.handle,
                local_anchor: Vec3::ZERO,
                target: body.position,
            });
            anchors[id.index()] = Some(constraints.len());
            constraints.push(RagdollConstraint {
                joint: id,
                body: index,
                kind: ConstraintKind::Anchor,
                handle,
                limit: None,
                enabled: false,
                target: None,
            });
        }

        log::info!(
            "布娃娃构建完成: {} 刚体, {} 关节约束, {} 锚点",
            bodies.len(),
            constraints.len() - EXTREMITY_COUNT,
            EXTREMITY_COUNT
        );

        Ragdoll {
            bodies,
            body_index,
            constraints,
            anchors,
        }
    }
}

const EXTREMITY_COUNT: usize = crate::skeleton::schema::EXTREMITIES.len();

// ============================================================================
// 运行时
// ============================================================================

/// 已注册到物理世界的布娃娃
pub struct Ragdoll<W: RagdollWorld> {
    bodies: Vec<RagdollBody<W::BodyHandle>>,
    /// JointId → bodies 下标
    body_index: [usize; JOINT_COUNT],
    constraints: Vec<RagdollConstraint<W::ConstraintHandle>>,
    /// JointId → constraints 下标（只有末端关节有）
    anchors: [Option<usize>; JOINT_COUNT],
}

impl<W: RagdollWorld> Ragdoll<W> {
    /// 深度优先顺序的刚体
    #[inline]
    pub fn bodies(&self) -> &[RagdollBody<W::BodyHandle>] {
        &self.bodies
    }

    #[inline]
    pub fn body(&self, id: JointId) -> &RagdollBody<W::BodyHandle> {
        &self.bodies[self.body_index[id.index()]]
    }

    #[inline]
    pub fn constraints(&self) -> &[RagdollConstraint<W::ConstraintHandle>] {
        &self.constraints
    }

    /// 某个末端关节的锚点约束
    pub fn anchor(&self, id: JointId) -> Option<&RagdollConstraint<W::ConstraintHandle>> {
        self.anchors[id.index()].map(|index| &self.constraints[index])
    }

    pub fn joint_constraint_count(&self) -> usize {
        self.constraints
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::Joint { .. }))
            .count()
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.iter().flatten().count()
    }

    /// 当前启用的锚点数
    pub fn active_anchor_count(&self) -> usize {
        self.anchors
            .iter()
            .flatten()
            .filter(|&&index| self.constraints[index].enabled)
            .count()
    }

    /// 用实时身体驱动锚点
    ///
    /// 末端关节被稳定追踪时把锚点目标移到追踪位置并启用，否则禁用，
    /// 让肢体只受关节约束和重力支配。
    pub fn sync_targets(&mut self, world: &mut W, body: &Body) {
        for index in self.anchors.iter().flatten().copied() {
            let constraint = &mut self.constraints[index];
            let sample = body.sample(constraint.joint);

            if sample.is_tracked() {
                world.set_anchor_target(constraint.handle, sample.position);
                constraint.target = Some(sample.position);
                if !constraint.enabled {
                    world.set_constraint_enabled(constraint.handle, true);
                    constraint.enabled = true;
                }
            } else if constraint.enabled {
                world.set_constraint_enabled(constraint.handle, false);
                constraint.enabled = false;
            }
        }
    }

    /// 禁用全部锚点（没有驱动身体时）
    pub fn release_anchors(&mut self, world: &mut W) {
        for index in self.anchors.iter().flatten().copied() {
            let constraint = &mut self.constraints[index];
            if constraint.enabled {
                world.set_constraint_enabled(constraint.handle, false);
                constraint.enabled = false;
            }
        }
    }

    /// 物理步进后读回刚体位姿
    pub fn read_back(&mut self, world: &W) {
        for body in &mut self.bodies {
            if let Some((position, rotation)) = world.body_transform(body.handle) {
                body.position = position;
                body.rotation = rotation;
            }
        }
    }

    /// 全部刚体的世界矩阵（按 JointId 编号排列），供渲染使用
    pub fn world_matrices(&self) -> [Mat4; JOINT_COUNT] {
        let mut matrices = [Mat4::IDENTITY; JOINT_COUNT];
        for body in &self.bodies {
            matrices[body.joint.index()] = body.world_matrix();
        }
        matrices
    }
}
