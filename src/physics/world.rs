//! 物理世界
//!
//! RagdollWorld 是布娃娃与物理引擎之间的接缝：布娃娃只通过它注册刚体、
//! 约束和锚点，并在每个 tick 读回刚体位姿。RapierWorld 是基于 rapier3d 的实现。
//!
//! | 布娃娃概念 | Rapier |
//! |-----------|--------|
//! | 骨骼刚体 | 动态 RigidBody + 盒子 Collider |
//! | 父子约束 | 球关节（锁定线性轴）+ 角度限制 |
//! | 锚点约束 | 运动学锚点刚体 + 球关节，初始禁用 |

use std::fmt::Debug;

use glam::{Quat, Vec3};
use rapier3d::na::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use rapier3d::prelude::*;

use super::config::PhysicsConfig;
use crate::skeleton::{JointId, JointLimit};

// ============================================================================
// 描述结构
// ============================================================================

/// 刚体描述
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    /// 对应的关节
    pub joint: JointId,
    /// 刚体原点的世界位置（关节位置）
    pub position: Vec3,
    /// 刚体的世界朝向（关节朝向）
    pub rotation: Quat,
    /// 盒子半边长
    pub half_extents: Vec3,
    /// 盒子中心在刚体局部空间的位置
    pub collider_offset: Vec3,
    /// 盒子在刚体局部空间的朝向
    pub collider_rotation: Quat,
    /// 密度
    pub density: f32,
}

/// 父子约束描述
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointDesc<B> {
    pub joint: JointId,
    pub parent: B,
    pub child: B,
    /// 枢轴在父刚体局部空间的位置
    pub parent_anchor: Vec3,
    /// 枢轴在子刚体局部空间的位置
    pub child_anchor: Vec3,
    /// 静止时子刚体相对父刚体的朝向，旋转限制以它为零点
    pub rest_rotation: Quat,
    /// 相对旋转限制
    pub limit: JointLimit,
}

/// 锚点约束描述
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorDesc<B> {
    pub joint: JointId,
    pub body: B,
    /// 锚点在刚体局部空间的位置
    pub local_anchor: Vec3,
    /// 初始目标（世界坐标）
    pub target: Vec3,
}

// ============================================================================
// 物理引擎接缝
// ============================================================================

/// 布娃娃使用的物理世界
///
/// 只在消费线程上调用。锚点约束创建时处于禁用状态。
pub trait RagdollWorld {
    type BodyHandle: Copy + Debug + PartialEq;
    type ConstraintHandle: Copy + Debug + PartialEq;

    fn add_body(&mut self, desc: &BodyDesc) -> Self::BodyHandle;

    fn add_joint(&mut self, desc: &JointDesc<Self::BodyHandle>) -> Self::ConstraintHandle;

    fn add_anchor(&mut self, desc: &AnchorDesc<Self::BodyHandle>) -> Self::ConstraintHandle;

    /// 移动锚点目标（世界坐标）
    fn set_anchor_target(&mut self, anchor: Self::ConstraintHandle, target: Vec3);

    fn set_constraint_enabled(&mut self, constraint: Self::ConstraintHandle, enabled: bool);

    /// 刚体当前的世界位姿 (位置, 朝向)
    fn body_transform(&self, body: Self::BodyHandle) -> Option<(Vec3, Quat)>;

    /// 推进 dt 秒
    fn step(&mut self, dt: f32);
}

// ============================================================================
// Rapier 实现
// ============================================================================

/// 碰撞组：地面
const GROUND_GROUP: Group = Group::GROUP_1;
/// 碰撞组：布娃娃（只和地面碰撞，不自碰撞）
const RAGDOLL_GROUP: Group = Group::GROUP_2;

/// 基于 rapier3d 的物理世界
pub struct RapierWorld {
    physics_pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,

    gravity: Vector<Real>,
    config: PhysicsConfig,
    /// 已执行的子步总数
    substeps: u64,
}

impl RapierWorld {
    /// 创建物理世界（可选地面）
    pub fn new(config: &PhysicsConfig) -> Self {
        let mut rigid_body_set = RigidBodySet::new();
        let mut collider_set = ColliderSet::new();

        if let Some(height) = config.ground_height {
            // 用一个很大的静态盒子当地面，上表面在 height
            let ground = RigidBodyBuilder::fixed()
                .translation(vector![0.0, height - 50.0, 0.0])
                .build();
            let ground_handle = rigid_body_set.insert(ground);
            let ground_collider = ColliderBuilder::cuboid(1000.0, 50.0, 1000.0)
                .collision_groups(InteractionGroups::new(GROUND_GROUP, Group::ALL))
                .build();
            collider_set.insert_with_parent(ground_collider, ground_handle, &mut rigid_body_set);
        }

        let integration_parameters = IntegrationParameters {
            dt: config.fixed_dt(),
            ..Default::default()
        };

        if config.debug_log {
            log::info!(
                "[Rapier] 物理世界创建: FPS={}, 重力Y={}, 地面={:?}",
                config.physics_fps,
                config.gravity_y,
                config.ground_height
            );
        }

        Self {
            physics_pipeline: PhysicsPipeline::new(),
            integration_parameters,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set,
            collider_set,
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: vector![0.0, config.gravity_y, 0.0],
            config: config.clone(),
            substeps: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// 动态 + 运动学 + 静态刚体总数
    #[inline]
    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    #[inline]
    pub fn constraint_count(&self) -> usize {
        self.impulse_joint_set.len()
    }

    /// 已执行的子步总数
    #[inline]
    pub fn substeps(&self) -> u64 {
        self.substeps
    }

    /// 约束当前是否启用
    pub fn is_constraint_enabled(&self, constraint: ImpulseJointHandle) -> bool {
        self.impulse_joint_set
            .get(constraint)
            .map(|joint| joint.data.is_enabled())
            .unwrap_or(false)
    }
}

impl RagdollWorld for RapierWorld {
    type BodyHandle = RigidBodyHandle;
    type ConstraintHandle = ImpulseJointHandle;

    fn add_body(&mut self, desc: &BodyDesc) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .position(to_isometry(desc.position, desc.rotation))
            .linear_damping(self.config.linear_damping)
            .angular_damping(self.config.angular_damping)
            .build();
        let handle = self.rigid_body_set.insert(body);

        let collider = ColliderBuilder::cuboid(desc.half_extents.x, desc.half_extents.y, desc.half_extents.z)
            .position(to_isometry(desc.collider_offset, desc.collider_rotation))
            .density(desc.density)
            .collision_groups(InteractionGroups::new(RAGDOLL_GROUP, GROUND_GROUP))
            .build();
        self.collider_set.insert_with_parent(collider, handle, &mut self.rigid_body_set);

        if self.config.debug_log {
            log::debug!(
                "[Rapier] 刚体 {:?}: 位置=({:.3}, {:.3}, {:.3}), 半边长=({:.3}, {:.3}, {:.3})",
                desc.joint,
                desc.position.x, desc.position.y, desc.position.z,
                desc.half_extents.x, desc.half_extents.y, desc.half_extents.z
            );
        }
        handle
    }

    fn add_joint(&mut self, desc: &JointDesc<RigidBodyHandle>) -> ImpulseJointHandle {
        let lower = desc.limit.lower_radians();
        let upper = desc.limit.upper_radians();
        let joint = GenericJointBuilder::new(JointAxesMask::LOCKED_SPHERICAL_AXES)
            .local_frame1(to_isometry(desc.parent_anchor, desc.rest_rotation))
            .local_frame2(to_isometry(desc.child_anchor, Quat::IDENTITY))
            .limits(JointAxis::AngX, [lower.x, upper.x])
            .limits(JointAxis::AngY, [lower.y, upper.y])
            .limits(JointAxis::AngZ, [lower.z, upper.z])
            .contacts_enabled(false)
            .build();
        self.impulse_joint_set.insert(desc.parent, desc.child, joint, true)
    }

    fn add_anchor(&mut self, desc: &AnchorDesc<RigidBodyHandle>) -> ImpulseJointHandle {
        // 锚点本身是一个没有碰撞体的运动学刚体
        let anchor = RigidBodyBuilder::kinematic_position_based()
            .translation(to_vector(desc.target))
            .build();
        let anchor_handle = self.rigid_body_set.insert(anchor);

        let mut joint = GenericJointBuilder::new(JointAxesMask::LOCKED_SPHERICAL_AXES)
            .local_anchor1(Point::origin())
            .local_anchor2(to_point(desc.local_anchor))
            .contacts_enabled(false)
            .build();
        joint.set_enabled(false);
        self.impulse_joint_set.insert(anchor_handle, desc.body, joint, true)
    }

    fn set_anchor_target(&mut self, anchor: ImpulseJointHandle, target: Vec3) {
        let Some(anchor_body) = self.impulse_joint_set.get(anchor).map(|joint| joint.body1) else {
            log::warn!("[Rapier] 锚点 {:?} 不存在", anchor);
            return;
        };
        if let Some(body) = self.rigid_body_set.get_mut(anchor_body) {
            body.set_next_kinematic_translation(to_vector(target));
        }
    }

    fn set_constraint_enabled(&mut self, constraint: ImpulseJointHandle, enabled: bool) {
        let Some(joint) = self.impulse_joint_set.get_mut(constraint) else {
            log::warn!("[Rapier] 约束 {:?} 不存在", constraint);
            return;
        };
        if joint.data.is_enabled() == enabled {
            return;
        }
        joint.data.set_enabled(enabled);
        let (body1, body2) = (joint.body1, joint.body2);
        for handle in [body1, body2] {
            if let Some(body) = self.rigid_body_set.get_mut(handle) {
                body.wake_up(true);
            }
        }
    }

    fn body_transform(&self, body: RigidBodyHandle) -> Option<(Vec3, Quat)> {
        self.rigid_body_set.get(body).map(|rb| from_isometry(rb.position()))
    }

    /// 固定步长子步推进，子步数受 max_substep_count 限制
    fn step(&mut self, dt: f32) {
        let substeps = self.config.substeps_for(dt);

        for _ in 0..substeps {
            self.physics_pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                &mut self.ccd_solver,
                None,
                &(),
                &(),
            );
        }
        self.substeps += substeps as u64;

        if self.config.debug_log {
            log::debug!("[Rapier] step dt={:.4} 子步={}", dt, substeps);
        }
    }
}

// ============================================================================
// glam ↔ nalgebra
// ============================================================================

#[inline]
fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

#[inline]
fn to_point(v: Vec3) -> Point<Real> {
    point![v.x, v.y, v.z]
}

fn to_isometry(translation: Vec3, rotation: Quat) -> Isometry3<Real> {
    let q = rotation.normalize();
    Isometry3::from_parts(
        Translation3::new(translation.x, translation.y, translation.z),
        UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z)),
    )
}

fn from_isometry(iso: &Isometry3<Real>) -> (Vec3, Quat) {
    let t = iso.translation.vector;
    let q = iso.rotation.quaternion();
    (Vec3::new(t.x, t.y, t.z), Quat::from_xyzw(q.i, q.j, q.k, q.w))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_ground() -> PhysicsConfig {
        PhysicsConfig {
            ground_height: None,
            ..Default::default()
        }
    }

    fn box_at(joint: JointId, position: Vec3) -> BodyDesc {
        BodyDesc {
            joint,
            position,
            rotation: Quat::IDENTITY,
            half_extents: Vec3::splat(0.05),
            collider_offset: Vec3::ZERO,
            collider_rotation: Quat::IDENTITY,
            density: 1000.0,
        }
    }

    #[test]
    fn test_isometry_conversion() {
        let rotation = Quat::from_rotation_y(0.7);
        let (t, r) = from_isometry(&to_isometry(Vec3::new(1.0, 2.0, 3.0), rotation));
        assert!(t.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(r.abs_diff_eq(rotation, 1e-6));
    }

    #[test]
    fn test_free_fall() {
        let mut world = RapierWorld::new(&no_ground());
        let body = world.add_body(&box_at(JointId::Head, Vec3::new(0.0, 10.0, 0.0)));
        world.step(1.0 / 60.0);
        world.step(1.0 / 60.0);
        let (position, _) = world.body_transform(body).unwrap();
        assert!(position.y < 10.0);
        assert_eq!(world.substeps(), 2);
    }

    #[test]
    fn test_anchor_starts_disabled() {
        let mut world = RapierWorld::new(&no_ground());
        let body = world.add_body(&box_at(JointId::HandLeft, Vec3::ZERO));
        let anchor = world.add_anchor(&AnchorDesc {
            joint: JointId::HandLeft,
            body,
            local_anchor: Vec3::ZERO,
            target: Vec3::ZERO,
        });
        assert!(!world.is_constraint_enabled(anchor));
        world.set_constraint_enabled(anchor, true);
        assert!(world.is_constraint_enabled(anchor));
        // 锚点刚体 + 手
        assert_eq!(world.body_count(), 2);
    }

    #[test]
    fn test_anchor_holds_body() {
        let mut world = RapierWorld::new(&no_ground());
        let body = world.add_body(&box_at(JointId::HandLeft, Vec3::new(0.0, 1.0, 0.0)));
        let anchor = world.add_anchor(&AnchorDesc {
            joint: JointId::HandLeft,
            body,
            local_anchor: Vec3::ZERO,
            target: Vec3::new(0.0, 1.0, 0.0),
        });
        world.set_constraint_enabled(anchor, true);
        for _ in 0..30 {
            world.step(1.0 / 60.0);
        }
        let (position, _) = world.body_transform(body).unwrap();
        assert!(position.abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 0.05), "{:?}", position);
    }

    #[test]
    fn test_joint_registered() {
        let mut world = RapierWorld::new(&no_ground());
        let parent = world.add_body(&box_at(JointId::ShoulderLeft, Vec3::ZERO));
        let child = world.add_body(&box_at(JointId::ElbowLeft, Vec3::new(0.3, 0.0, 0.0)));
        let joint = world.add_joint(&JointDesc {
            joint: JointId::ElbowLeft,
            parent,
            child,
            parent_anchor: Vec3::ZERO,
            child_anchor: Vec3::new(-0.3, 0.0, 0.0),
            rest_rotation: Quat::IDENTITY,
            limit: JointId::ElbowLeft.limit(),
        });
        assert!(world.is_constraint_enabled(joint));
        assert_eq!(world.constraint_count(), 1);
    }

    #[test]
    fn test_joint_rest_pose_is_stable() {
        // 子刚体静止时相对父刚体转了 90°，超出肘部限制；以静止朝向为零点时不应被拉回
        let config = PhysicsConfig {
            gravity_y: 0.0,
            ..no_ground()
        };
        let mut world = RapierWorld::new(&config);
        let rest_rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let parent = world.add_body(&box_at(JointId::ShoulderLeft, Vec3::ZERO));
        let child = world.add_body(&BodyDesc {
            rotation: rest_rotation,
            ..box_at(JointId::ElbowLeft, Vec3::new(0.3, 0.0, 0.0))
        });
        world.add_joint(&JointDesc {
            joint: JointId::ElbowLeft,
            parent,
            child,
            parent_anchor: Vec3::ZERO,
            child_anchor: rest_rotation.inverse() * Vec3::new(-0.3, 0.0, 0.0),
            rest_rotation,
            limit: JointId::ElbowLeft.limit(),
        });
        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }
        let (position, rotation) = world.body_transform(child).unwrap();
        assert!(position.abs_diff_eq(Vec3::new(0.3, 0.0, 0.0), 1e-3), "{:?}", position);
        assert!(rotation.angle_between(rest_rotation) < 1e-2);
    }
}
