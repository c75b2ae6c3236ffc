//! 物理配置
//!
//! 所有参数扁平化，作为普通值传给 RapierWorld / RagdollBuilder，不使用全局状态。

/// 物理配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    // ========== 重力 ==========
    /// 重力 Y 分量（负数向下），默认 -9.81（单位：米）
    pub gravity_y: f32,

    // ========== 模拟参数 ==========
    /// 物理 FPS，默认 60.0
    pub physics_fps: f32,
    /// 每次 step 最大子步数，默认 5
    pub max_substep_count: u32,

    // ========== 布娃娃形状 ==========
    /// 骨骼盒子的截面边长（米），默认 0.06
    pub bone_thickness: f32,
    /// 骨骼长度过短时使用的最小盒子长度，默认 0.02
    pub min_bone_length: f32,
    /// 刚体密度（kg/m³），默认 1000.0
    pub body_density: f32,
    /// 刚体线性阻尼，默认 0.5
    pub linear_damping: f32,
    /// 刚体角阻尼，默认 0.8
    pub angular_damping: f32,

    // ========== 场景 ==========
    /// 地面高度，None 表示没有地面
    pub ground_height: Option<f32>,

    // ========== 调试 ==========
    /// 是否启用父子关节约束，默认 true
    pub joints_enabled: bool,
    /// 是否输出逐步调试日志，默认 false
    pub debug_log: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity_y: -9.81,

            physics_fps: 60.0,
            max_substep_count: 5,

            bone_thickness: 0.06,
            min_bone_length: 0.02,
            body_density: 1000.0,
            linear_damping: 0.5,
            angular_damping: 0.8,

            ground_height: Some(0.0),

            joints_enabled: true,
            debug_log: false,
        }
    }
}

impl PhysicsConfig {
    /// 固定时间步长（秒）
    #[inline]
    pub fn fixed_dt(&self) -> f32 {
        1.0 / self.physics_fps.max(1.0)
    }

    /// 一帧 dt 需要的子步数（至少 1，最多 max_substep_count）
    pub fn substeps_for(&self, delta_time: f32) -> u32 {
        if delta_time <= 0.0 {
            return 0;
        }
        // 吸收浮点误差，避免 1/30 秒被算成 3 个 1/60 子步
        let steps = (delta_time / self.fixed_dt() - 1e-4).ceil() as u32;
        steps.clamp(1, self.max_substep_count.max(1))
    }
}
