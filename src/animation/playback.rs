//! 回放控制
//!
//! 游标是一个时间戳，只在帧存储的时间范围内移动。
//! 每个 tick 调用 advance(dt)，拿到当前时刻（可能是插值得到的）帧。

use std::sync::Arc;

use crate::capture::{FrameQuery, FrameStore};
use crate::Result;

/// 回放配置
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// 播放速率（1.0 = 实时，负数倒放）
    pub rate: f64,
    /// 到达末尾后是否从头循环
    pub looping: bool,
    /// 每秒时间戳刻度数，默认 10_000_000（100ns 刻度）
    pub ticks_per_second: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            looping: false,
            ticks_per_second: 10_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// 回放控制器
pub struct PlaybackController {
    store: Arc<FrameStore>,
    config: PlaybackConfig,
    range: (i64, i64),
    cursor: i64,
    /// 不足一个刻度的累积量
    remainder: f64,
    state: PlaybackState,
}

impl PlaybackController {
    /// 创建控制器，游标停在首帧，初始为暂停
    pub fn new(store: Arc<FrameStore>, config: PlaybackConfig) -> Result<Self> {
        let range = store.time_range()?;
        Ok(Self {
            store,
            config,
            range,
            cursor: range.0,
            remainder: 0.0,
            state: PlaybackState::Paused,
        })
    }

    #[inline]
    pub fn store(&self) -> &Arc<FrameStore> {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[inline]
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    #[inline]
    pub fn time_range(&self) -> (i64, i64) {
        self.range
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.config.rate = rate;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.config.looping = looping;
    }

    /// 开始播放；已经播完（非循环）时从头开始
    pub fn play(&mut self) {
        if self.is_finished() {
            self.cursor = if self.config.rate < 0.0 { self.range.1 } else { self.range.0 };
            self.remainder = 0.0;
        }
        self.state = PlaybackState::Playing;
    }

    pub fn pause(&mut self) {
        self.state = PlaybackState::Paused;
    }

    pub fn toggle(&mut self) {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.play(),
        }
    }

    /// 跳转到指定时间戳（限制在时间范围内）
    pub fn seek(&mut self, timestamp: i64) {
        self.cursor = timestamp.clamp(self.range.0, self.range.1);
        self.remainder = 0.0;
    }

    /// 非循环播放时游标已到达播放方向的终点
    pub fn is_finished(&self) -> bool {
        if self.config.looping {
            return false;
        }
        if self.config.rate < 0.0 {
            self.cursor <= self.range.0
        } else {
            self.cursor >= self.range.1
        }
    }

    /// 推进 dt 秒并返回当前帧
    ///
    /// 暂停时游标不动。非循环播放到达终点后自动暂停。
    pub fn advance(&mut self, dt: f32) -> Result<FrameQuery<'_>> {
        if self.state == PlaybackState::Playing {
            self.step(dt);
        }
        self.current_frame()
    }

    /// 当前游标处的帧
    pub fn current_frame(&self) -> Result<FrameQuery<'_>> {
        self.store.frame_at(self.cursor)
    }

    fn step(&mut self, dt: f32) {
        let delta = dt as f64 * self.config.rate * self.config.ticks_per_second + self.remainder;
        let ticks = delta.trunc();
        self.remainder = delta - ticks;

        let (start, end) = self.range;
        let target = self.cursor.saturating_add(ticks as i64);

        if (start..=end).contains(&target) {
            self.cursor = target;
            return;
        }

        let span = end as i128 - start as i128;
        if self.config.looping && span > 0 {
            // 结果落在 [start, end) 内，转回 i64 不会截断
            self.cursor = (start as i128 + (target as i128 - start as i128).rem_euclid(span)) as i64;
        } else {
            self.cursor = target.clamp(start, end);
            self.remainder = 0.0;
            self.state = PlaybackState::Paused;
            log::debug!("回放到达终点: {}", self.cursor);
        }
    }
}
