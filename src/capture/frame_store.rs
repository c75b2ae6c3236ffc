//! 帧存储 - 按时间戳排序的帧序列
//!
//! 从日志加载后只读，可以用 Arc 在多个消费者之间共享。

use std::io::Read;
use std::path::Path;

use super::frame::Frame;
use super::frame_log::FrameLogReader;
use crate::animation::interpolation;
use crate::{MocapError, Result};

/// 按时间查询的结果
#[derive(Debug, Clone, PartialEq)]
pub enum FrameQuery<'a> {
    /// 时间戳正好命中
    Exact(&'a Frame),
    /// 超出范围，取首帧或末帧
    Clamped(&'a Frame),
    /// 两帧之间插值得到的新帧
    Blended(Frame),
}

impl FrameQuery<'_> {
    #[inline]
    pub fn frame(&self) -> &Frame {
        match self {
            FrameQuery::Exact(frame) | FrameQuery::Clamped(frame) => frame,
            FrameQuery::Blended(frame) => frame,
        }
    }

    pub fn into_owned(self) -> Frame {
        match self {
            FrameQuery::Exact(frame) | FrameQuery::Clamped(frame) => frame.clone(),
            FrameQuery::Blended(frame) => frame,
        }
    }

    #[inline]
    pub fn is_blended(&self) -> bool {
        matches!(self, FrameQuery::Blended(_))
    }
}

/// 帧存储
#[derive(Debug, Clone, Default)]
pub struct FrameStore {
    frames: Vec<Frame>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从任意顺序的帧创建（稳定排序）
    pub fn from_frames(mut frames: Vec<Frame>) -> Self {
        frames.sort_by_key(Frame::timestamp);
        Self { frames }
    }

    /// 从日志文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self::from_frames(FrameLogReader::load(path.as_ref())?);
        log::info!(
            "帧日志加载完成: {} ({} 帧)",
            path.as_ref().display(),
            store.len()
        );
        Ok(store)
    }

    pub fn load_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self::from_frames(FrameLogReader::load_from_reader(reader)?))
    }

    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_frames(FrameLogReader::load_from_bytes(bytes)?))
    }

    /// 实时追加，时间戳不能早于最后一帧
    pub fn append(&mut self, frame: Frame) -> Result<()> {
        if let Some(last) = self.frames.last() {
            if frame.timestamp() < last.timestamp() {
                return Err(MocapError::OutOfOrderFrame {
                    previous: last.timestamp(),
                    timestamp: frame.timestamp(),
                });
            }
        }
        self.frames.push(frame);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// (最小时间戳, 最大时间戳)
    pub fn time_range(&self) -> Result<(i64, i64)> {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => Ok((first.timestamp(), last.timestamp())),
            _ => Err(MocapError::EmptyStore),
        }
    }

    /// 查询任意时刻的帧
    ///
    /// 二分查找第一个时间戳不小于 timestamp 的帧：
    /// - 命中 → 原帧
    /// - 早于首帧 / 晚于末帧 → 首帧 / 末帧
    /// - 其余 → 前后两帧插值
    pub fn frame_at(&self, timestamp: i64) -> Result<FrameQuery<'_>> {
        if self.frames.is_empty() {
            return Err(MocapError::EmptyStore);
        }

        let index = self.frames.partition_point(|f| f.timestamp() < timestamp);

        if let Some(frame) = self.frames.get(index) {
            if frame.timestamp() == timestamp {
                return Ok(FrameQuery::Exact(frame));
            }
        }

        if index == 0 {
            return Ok(FrameQuery::Clamped(&self.frames[0]));
        }
        if index == self.frames.len() {
            return Ok(FrameQuery::Clamped(&self.frames[index - 1]));
        }

        let left = &self.frames[index - 1];
        let right = &self.frames[index];
        Ok(FrameQuery::Blended(interpolation::interpolate_frames(left, right, timestamp)))
    }
}
