//! 物理模块
//!
//! - config: 扁平化物理配置
//! - world: 物理引擎接缝 RagdollWorld 与 rapier3d 实现
//! - ragdoll: 从骨架构建布娃娃并在每个 tick 同步

mod config;
pub mod ragdoll;
pub mod world;

pub use config::PhysicsConfig;
pub use ragdoll::{Ragdoll, RagdollBuilder};
pub use world::{RagdollWorld, RapierWorld};
