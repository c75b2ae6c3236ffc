//! 帧插值
//!
//! 两帧之间：平移、缩放线性插值，旋转球面插值并归一化，
//! 追踪状态取左帧（查询时刻之前的状态）。
//! 只在两帧都出现的身体才会出现在结果中。

use std::collections::BTreeMap;

use crate::capture::{Body, Frame, JointSample};
use crate::skeleton::schema::DEPTH_FIRST_ORDER;
use crate::skeleton::{JointTree, JOINT_COUNT};

/// 插值系数 t = (query - left) / (right - left)
///
/// 两帧时间戳相同时返回 0，结果限制在 [0, 1]。
/// 差值在 i128 中计算，任意两个 i64 时间戳都不会溢出。
pub fn blend_factor(left: i64, right: i64, query: i64) -> f32 {
    let span = right as i128 - left as i128;
    if span == 0 {
        return 0.0;
    }
    let offset = query as i128 - left as i128;
    (offset as f64 / span as f64).clamp(0.0, 1.0) as f32
}

/// 在 timestamp 处插值两帧
pub fn interpolate_frames(left: &Frame, right: &Frame, timestamp: i64) -> Frame {
    let t = blend_factor(left.timestamp(), right.timestamp(), timestamp);
    blend_frames(left, right, t, timestamp)
}

/// 以系数 t 混合两帧，结果帧使用给定的时间戳
pub fn blend_frames(left: &Frame, right: &Frame, t: f32, timestamp: i64) -> Frame {
    let bodies: BTreeMap<_, _> = left
        .bodies()
        .iter()
        .filter_map(|(id, l)| right.body(*id).map(|r| (*id, blend_bodies(l, r, t))))
        .collect();
    Frame::new(timestamp, bodies)
}

/// 混合两个身体
pub fn blend_bodies(left: &Body, right: &Body, t: f32) -> Body {
    let mut samples = [JointSample::default(); JOINT_COUNT];
    for (i, sample) in samples.iter_mut().enumerate() {
        *sample = left.samples()[i].blend(&right.samples()[i], t);
    }

    let lean = match (left.lean(), right.lean()) {
        (Some(l), Some(r)) => Some(l.lerp(r, t)),
        (l, _) => l,
    };

    Body::from_parts(samples, lean, blend_trees(left.skeleton(), right.skeleton(), t))
}

/// 同步遍历两棵关节树，生成新的关节树
///
/// 结构与输入完全相同，只有节点数值不同；不与输入共享任何节点。
pub fn blend_trees(left: &JointTree, right: &JointTree, t: f32) -> JointTree {
    let mut tree = JointTree::new();
    for &id in DEPTH_FIRST_ORDER.iter() {
        let (l, r) = (left.node(id), right.node(id));
        let node = tree.node_mut(id);
        node.set_local_transform(l.local_transform().blend(r.local_transform(), t));
        node.tracking = l.tracking;
        node.flags = l.flags;
        node.color = l.color;
    }
    tree
}
