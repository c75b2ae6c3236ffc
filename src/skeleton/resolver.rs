//! 变换解算 - 世界空间采样 → 关节树本地变换
//!
//! 从根到叶深度优先：
//! 1. 根关节：单位旋转，平移 = 世界位置
//! 2. 其他关节：本地旋转 = parent_rot⁻¹ * Q，本地平移 = 父世界变换下的本地坐标
//! 3. 朝向未知（零四元数）时，用骨骼方向和世界上方向构造基
//! 4. 吸附数值噪声，骨长随本地变换刷新

use glam::{Mat3, Mat4, Quat, Vec3};

use super::joint_node::JointFlags;
use super::joint_tree::JointTree;
use super::schema::{JointId, TrackingState, DEPTH_FIRST_ORDER, JOINT_COUNT};
use super::JointTransform;
use crate::capture::JointSample;
use crate::{MocapError, Result};

/// 构造推导基时使用的世界上方向
const WORLD_UP: Vec3 = Vec3::Y;
/// 骨骼方向与上方向平行时的备用轴
const WORLD_FORWARD: Vec3 = Vec3::Z;

/// 把按关节给出的采样整理为完整数组，缺失任何关节都报错
pub fn collect_samples<I>(samples: I) -> Result<[JointSample; JOINT_COUNT]>
where
    I: IntoIterator<Item = (JointId, JointSample)>,
{
    let mut slots: [Option<JointSample>; JOINT_COUNT] = [None; JOINT_COUNT];
    for (id, sample) in samples {
        slots[id.index()] = Some(sample);
    }

    let mut complete = [JointSample::default(); JOINT_COUNT];
    for id in JointId::ALL {
        complete[id.index()] = slots[id.index()].ok_or(MocapError::IncompleteSkeleton(id))?;
    }
    Ok(complete)
}

/// 解算一个身体的关节树
pub fn resolve(samples: &[JointSample; JOINT_COUNT]) -> JointTree {
    let mut tree = JointTree::new();
    let mut world = [Mat4::IDENTITY; JOINT_COUNT];

    for &id in DEPTH_FIRST_ORDER.iter() {
        let sample = &samples[id.index()];
        let mut derived = false;

        let local = match id.parent() {
            None => JointTransform::from_translation(sample.position),
            Some(parent) => {
                let parent_world = world[parent.index()];
                let (_, parent_rotation, _) = parent_world.to_scale_rotation_translation();

                let orientation = if sample.has_orientation() {
                    sample.orientation.normalize()
                } else {
                    derived = true;
                    derive_orientation(parent_world, parent_rotation, sample.position)
                };

                JointTransform::from_rotation_translation(
                    parent_rotation.inverse() * orientation,
                    parent_world.inverse().transform_point3(sample.position),
                )
            }
        }
        .snapped();

        let node = tree.node_mut(id);
        node.set_local_transform(local);
        node.tracking = sample.tracking;
        node.flags.set(JointFlags::DERIVED_ORIENTATION, derived);

        world[id.index()] = match id.parent() {
            Some(parent) => world[parent.index()] * local.to_matrix(),
            None => local.to_matrix(),
        };
    }

    tree
}

/// 只有位置时解算（朝向全部由骨骼方向推导）
pub fn resolve_positions(positions: &[Vec3; JOINT_COUNT]) -> JointTree {
    let samples = positions.map(|position| JointSample {
        position,
        orientation: JointSample::UNKNOWN_ORIENTATION,
        tracking: TrackingState::Tracked,
    });
    resolve(&samples)
}

/// 根据父关节到本关节的方向推导世界朝向
///
/// 骨骼方向作为 +Y，与世界上方向叉乘得到 +X，再补出 +Z。
/// 两点重合时沿用父关节朝向。
fn derive_orientation(parent_world: Mat4, parent_rotation: Quat, position: Vec3) -> Quat {
    let parent_position = parent_world.w_axis.truncate();
    let Some(direction) = (position - parent_position).try_normalize() else {
        return parent_rotation;
    };

    let side = WORLD_UP
        .cross(direction)
        .try_normalize()
        .or_else(|| WORLD_FORWARD.cross(direction).try_normalize())
        .unwrap_or(Vec3::X);
    let forward = side.cross(direction);

    Quat::from_mat3(&Mat3::from_cols(side, direction, forward)).normalize()
}
