//! 关节树 - 以 JointId 编号寻址的节点数组
//!
//! 拓扑固定，与骨架定义一致；每帧只替换节点的本地变换和追踪状态。
//! 世界变换：local_to_world = parent.local_to_world * local_to_parent

use glam::{Mat4, Vec3, Vec4};

use super::joint_node::JointNode;
use super::schema::{self, JointId, JOINT_COUNT, DEPTH_FIRST_ORDER};

/// 关节树
#[derive(Clone, Debug, PartialEq)]
pub struct JointTree {
    nodes: Vec<JointNode>,
}

impl Default for JointTree {
    fn default() -> Self {
        Self::new()
    }
}

impl JointTree {
    /// 创建所有节点处于单位变换的关节树
    pub fn new() -> Self {
        Self {
            nodes: JointId::ALL.iter().map(|&id| JointNode::new(id)).collect(),
        }
    }

    /// T 形参考姿态
    pub fn bind_pose() -> Self {
        super::resolver::resolve_positions(&schema::BIND_POSE_POSITIONS)
    }

    #[inline]
    pub fn node(&self, id: JointId) -> &JointNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: JointId) -> &mut JointNode {
        &mut self.nodes[id.index()]
    }

    #[inline]
    pub fn root(&self) -> &JointNode {
        self.node(JointId::ROOT)
    }

    /// 按编号顺序遍历节点
    pub fn nodes(&self) -> impl Iterator<Item = &JointNode> {
        self.nodes.iter()
    }

    /// 按深度优先顺序遍历节点（父节点先于子节点）
    pub fn depth_first(&self) -> impl Iterator<Item = &JointNode> {
        DEPTH_FIRST_ORDER.iter().map(move |&id| self.node(id))
    }

    /// 全部父子关系 (parent, child)
    pub fn edges(&self) -> impl Iterator<Item = (JointId, JointId)> + '_ {
        self.depth_first()
            .filter_map(|node| node.parent.map(|parent| (parent, node.id)))
    }

    // ========================================
    // 变换
    // ========================================

    /// 设置本地变换（骨长随之刷新）
    pub fn set_local_transform(&mut self, id: JointId, local: super::JointTransform) {
        self.node_mut(id).set_local_transform(local);
    }

    /// 沿父链组合得到世界变换
    pub fn world_transform(&self, id: JointId) -> Mat4 {
        let node = self.node(id);
        match node.parent {
            Some(parent) => self.world_transform(parent) * node.local_matrix(),
            None => node.local_matrix(),
        }
    }

    #[inline]
    pub fn world_position(&self, id: JointId) -> Vec3 {
        self.world_transform(id).w_axis.truncate()
    }

    /// 一次性计算全部世界矩阵（按 JointId 编号排列）
    pub fn world_matrices(&self) -> [Mat4; JOINT_COUNT] {
        let mut world = [Mat4::IDENTITY; JOINT_COUNT];
        for &id in DEPTH_FIRST_ORDER.iter() {
            let node = self.node(id);
            world[id.index()] = match node.parent {
                Some(parent) => world[parent.index()] * node.local_matrix(),
                None => node.local_matrix(),
            };
        }
        world
    }

    /// 全部骨长（按 JointId 编号排列）
    pub fn bone_lengths(&self) -> [f32; JOINT_COUNT] {
        let mut lengths = [0.0; JOINT_COUNT];
        for node in &self.nodes {
            lengths[node.id.index()] = node.bone_length();
        }
        lengths
    }

    // ========================================
    // 调试显示
    // ========================================

    /// 高亮某个关节
    pub fn highlight(&mut self, id: JointId, color: Vec4) {
        self.node_mut(id).set_highlight(Some(color));
    }

    /// 清除所有高亮
    pub fn clear_highlights(&mut self) {
        for node in &mut self.nodes {
            node.set_highlight(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::JointTransform;
    use glam::Quat;

    #[test]
    fn test_topology_matches_schema() {
        let tree = JointTree::new();
        let edges: Vec<_> = tree.edges().collect();
        let expected: Vec<_> = schema::topology().collect();
        assert_eq!(edges, expected);
    }

    #[test]
    fn test_world_transform_composition() {
        let mut tree = JointTree::new();
        tree.set_local_transform(JointId::SpineBase, JointTransform::from_translation(Vec3::new(0.0, 1.0, 0.0)));
        tree.set_local_transform(
            JointId::SpineMid,
            JointTransform::from_rotation_translation(
                Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
                Vec3::new(0.0, 0.5, 0.0),
            ),
        );
        tree.set_local_transform(JointId::SpineShoulder, JointTransform::from_translation(Vec3::new(0.0, 0.5, 0.0)));

        // SpineMid 绕 Z 转 90°，其子节点的 +Y 偏移变成世界 -X
        let p = tree.world_position(JointId::SpineShoulder);
        assert!(p.abs_diff_eq(Vec3::new(-0.5, 1.5, 0.0), 1e-5));

        let world = tree.world_matrices();
        for id in JointId::ALL {
            assert!(world[id.index()].abs_diff_eq(tree.world_transform(id), 1e-5));
        }
    }

    #[test]
    fn test_bind_pose_bone_lengths() {
        let tree = JointTree::bind_pose();
        let lengths = tree.bone_lengths();
        assert_eq!(lengths[JointId::SpineBase.index()], 0.0);
        // 肘到肩 0.27 米
        assert!((lengths[JointId::ElbowLeft.index()] - 0.27).abs() < 1e-4);
        assert!((lengths[JointId::KneeRight.index()] - 0.42).abs() < 1e-4);

        for id in JointId::ALL {
            let expected = schema::BIND_POSE_POSITIONS[id.index()];
            assert!(tree.world_position(id).abs_diff_eq(expected, 1e-4), "{:?}", id);
        }
    }

    #[test]
    fn test_highlight() {
        let mut tree = JointTree::new();
        tree.highlight(JointId::KneeLeft, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert!(tree.node(JointId::KneeLeft).is_highlighted());
        tree.clear_highlights();
        assert!(tree.nodes().all(|n| !n.is_highlighted()));
    }
}
