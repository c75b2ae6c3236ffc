//! 二进制帧日志 - 读取与写入
//!
//! 小端序，记录重复直到文件结尾：
//! ```text
//! record := timestamp:i64 bodyCount:i32 body{bodyCount}
//! body   := isTracked:u8 [leanX:f32 leanY:f32 joint{25}]
//! joint  := jointType:i32 trackingState:i32 pos:f32x3 rot:f32x4(xyzw)
//! ```
//! 记录读到一半遇到文件结尾视为日志损坏。

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec2, Vec3};

use super::frame::{Body, BodyId, Frame, JointSample};
use crate::skeleton::{JointId, TrackingState, JOINT_COUNT};
use crate::{MocapError, Result};

/// 单个关节在日志中的字节数
pub const JOINT_RECORD_SIZE: usize = 4 + 4 + 3 * 4 + 4 * 4;

// ============================================================================
// 读取
// ============================================================================

/// 帧日志读取器
pub struct FrameLogReader;

impl FrameLogReader {
    /// 从文件路径加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<Frame>> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        Self::load_from_reader(&mut reader)
    }

    /// 从 Reader 加载（读到结尾）
    pub fn load_from_reader<R: Read>(reader: &mut R) -> Result<Vec<Frame>> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::load_from_bytes(&bytes)
    }

    /// 从字节切片加载
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Vec<Frame>> {
        let mut cursor = Cursor::new(bytes);
        let mut frames = Vec::new();

        while (cursor.position() as usize) < bytes.len() {
            let record_index = frames.len();
            let frame = read_record(&mut cursor).map_err(|e| match e {
                MocapError::CorruptLog(msg) => {
                    MocapError::CorruptLog(format!("record {}: {}", record_index, msg))
                }
                other => other,
            })?;
            frames.push(frame);
        }

        Ok(frames)
    }
}

fn corrupt(what: &str) -> impl FnOnce(io::Error) -> MocapError + '_ {
    move |e| MocapError::CorruptLog(format!("failed to read {}: {}", what, e))
}

/// 读取一条记录
fn read_record<R: Read>(reader: &mut R) -> Result<Frame> {
    let timestamp = reader.read_i64::<LittleEndian>().map_err(corrupt("timestamp"))?;
    let body_count = reader.read_i32::<LittleEndian>().map_err(corrupt("body count"))?;
    if body_count < 0 {
        return Err(MocapError::CorruptLog(format!("negative body count {}", body_count)));
    }

    let mut bodies = BTreeMap::new();
    for slot in 0..body_count {
        if let Some(body) = read_body(reader)? {
            bodies.insert(slot as BodyId, body);
        }
    }

    Ok(Frame::new(timestamp, bodies))
}

/// 读取一个身体槽位，未追踪的槽位返回 None
fn read_body<R: Read>(reader: &mut R) -> Result<Option<Body>> {
    let is_tracked = reader.read_u8().map_err(corrupt("tracked flag"))?;
    if is_tracked == 0 {
        return Ok(None);
    }

    let lean_x = reader.read_f32::<LittleEndian>().map_err(corrupt("lean"))?;
    let lean_y = reader.read_f32::<LittleEndian>().map_err(corrupt("lean"))?;

    let mut joints = Vec::with_capacity(JOINT_COUNT);
    for _ in 0..JOINT_COUNT {
        joints.push(read_joint(reader)?);
    }

    Body::from_samples(joints, Some(Vec2::new(lean_x, lean_y))).map(Some)
}

/// 读取一个关节
fn read_joint<R: Read>(reader: &mut R) -> Result<(JointId, JointSample)> {
    let raw_id = reader.read_i32::<LittleEndian>().map_err(corrupt("joint type"))?;
    let raw_state = reader.read_i32::<LittleEndian>().map_err(corrupt("tracking state"))?;

    let mut values = [0.0f32; 7];
    reader
        .read_f32_into::<LittleEndian>(&mut values)
        .map_err(corrupt("joint transform"))?;

    let id = JointId::try_from(raw_id)
        .map_err(|_| MocapError::CorruptLog(format!("unknown joint type {}", raw_id)))?;
    let tracking = TrackingState::from_raw(raw_state)
        .ok_or_else(|| MocapError::CorruptLog(format!("unknown tracking state {}", raw_state)))?;

    let sample = JointSample {
        position: Vec3::new(values[0], values[1], values[2]),
        orientation: Quat::from_xyzw(values[3], values[4], values[5], values[6]),
        tracking,
    };
    Ok((id, sample))
}

// ============================================================================
// 写入
// ============================================================================

/// 帧日志写入器
pub struct FrameLogWriter<W: Write> {
    writer: W,
    records: usize,
}

impl FrameLogWriter<BufWriter<File>> {
    /// 创建日志文件
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path.as_ref())?)))
    }
}

impl<W: Write> FrameLogWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// 已写入的记录数
    #[inline]
    pub fn records(&self) -> usize {
        self.records
    }

    /// 写入一帧
    ///
    /// 身体按编号顺序紧凑写入槽位 0..n，编号本身不写入日志；
    /// 重新加载后身体编号即槽位号。
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let body_count = i32::try_from(frame.body_count()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("too many bodies in frame {}: {}", frame.timestamp(), frame.body_count()),
            )
        })?;

        self.writer.write_i64::<LittleEndian>(frame.timestamp())?;
        self.writer.write_i32::<LittleEndian>(body_count)?;

        for body in frame.bodies().values() {
            self.write_body(body)?;
        }

        self.records += 1;
        Ok(())
    }

    fn write_body(&mut self, body: &Body) -> Result<()> {
        let lean = body.lean().unwrap_or(Vec2::ZERO);
        self.writer.write_u8(1)?;
        self.writer.write_f32::<LittleEndian>(lean.x)?;
        self.writer.write_f32::<LittleEndian>(lean.y)?;

        for id in JointId::ALL {
            let sample = body.sample(id);
            self.writer.write_i32::<LittleEndian>(id.index() as i32)?;
            self.writer.write_i32::<LittleEndian>(sample.tracking.to_raw())?;
            for v in sample.position.to_array() {
                self.writer.write_f32::<LittleEndian>(v)?;
            }
            for v in sample.orientation.to_array() {
                self.writer.write_f32::<LittleEndian>(v)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// 取回底层 Writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// 把一组帧编码为字节
pub fn encode_frames<'a, I>(frames: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a Frame>,
{
    let mut writer = FrameLogWriter::new(Vec::new());
    for frame in frames {
        writer.write_frame(frame)?;
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::RawBody;

    fn body_joints(state_of: impl Fn(JointId) -> TrackingState) -> Vec<(JointId, JointSample)> {
        JointId::ALL
            .into_iter()
            .map(|id| {
                let i = id.index() as f32;
                let orientation = if id.index() % 4 == 0 {
                    JointSample::UNKNOWN_ORIENTATION
                } else {
                    Quat::from_rotation_y(i * 0.1)
                };
                let sample = JointSample::new(Vec3::new(i * 0.01, 1.0 + i * 0.05, 2.0), orientation, state_of(id));
                (id, sample)
            })
            .collect()
    }

    fn sample_frame(timestamp: i64) -> Frame {
        let states = [TrackingState::NotTracked, TrackingState::Inferred, TrackingState::Tracked];
        Frame::from_raw(
            timestamp,
            vec![
                RawBody {
                    body_id: 0,
                    lean: Some(Vec2::new(0.25, -0.5)),
                    joints: body_joints(|id| states[id.index() % 3]),
                },
                RawBody {
                    body_id: 3,
                    lean: Some(Vec2::ZERO),
                    joints: body_joints(|_| TrackingState::Tracked),
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let frames = vec![sample_frame(1000), sample_frame(2000), Frame::empty(3000)];
        let bytes = encode_frames(&frames).unwrap();
        let loaded = FrameLogReader::load_from_bytes(&bytes).unwrap();

        assert_eq!(loaded.len(), 3);
        for (a, b) in frames.iter().zip(&loaded) {
            assert_eq!(a.timestamp(), b.timestamp());
            assert_eq!(a.body_count(), b.body_count());
            // 编号变成槽位号，顺序不变
            for (slot, (body, (&id, other))) in a.bodies().values().zip(b.bodies()).enumerate() {
                assert_eq!(id, slot as BodyId);
                assert_eq!(body.lean(), other.lean());
                for joint in JointId::ALL {
                    let (x, y) = (body.sample(joint), other.sample(joint));
                    assert_eq!(x.tracking, y.tracking);
                    assert!(x.position.abs_diff_eq(y.position, 1e-6));
                    assert!(x.orientation.abs_diff_eq(y.orientation, 1e-6));
                }
            }
        }
    }

    #[test]
    fn test_bodies_written_densely() {
        let frame = sample_frame(10);
        let bytes = encode_frames([&frame]).unwrap();

        // 编号 0 和 3 写成槽位 0 和 1，中间没有空槽位
        let body_size = 1 + 8 + JOINT_COUNT * JOINT_RECORD_SIZE;
        assert_eq!(bytes.len(), 8 + 4 + 2 * body_size);
        assert_eq!(i32::from_le_bytes(bytes[8..12].try_into().unwrap()), 2);
    }

    #[test]
    fn test_large_body_ids_recorded() {
        let raw = |body_id| RawBody {
            body_id,
            lean: None,
            joints: body_joints(|_| TrackingState::Tracked),
        };
        let frame = Frame::from_raw(5, vec![raw(u64::MAX), raw(1 << 56)]).unwrap();
        let bytes = encode_frames([&frame]).unwrap();
        let body_size = 1 + 8 + JOINT_COUNT * JOINT_RECORD_SIZE;
        assert_eq!(bytes.len(), 8 + 4 + 2 * body_size);

        let loaded = FrameLogReader::load_from_bytes(&bytes).unwrap();
        assert_eq!(loaded[0].bodies().keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_truncated_record_is_corrupt() {
        let bytes = encode_frames([&sample_frame(1), &sample_frame(2)]).unwrap();
        for cut in [1, 7, 13, bytes.len() / 2 + 3, bytes.len() - 1] {
            let result = FrameLogReader::load_from_bytes(&bytes[..cut]);
            assert!(matches!(result, Err(MocapError::CorruptLog(_))), "cut at {}", cut);
        }
    }

    #[test]
    fn test_empty_stream() {
        assert!(FrameLogReader::load_from_bytes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_joint_type_is_corrupt() {
        let mut bytes = encode_frames([&sample_frame(1)]).unwrap();
        // 第一个身体第一个关节的类型编号
        let offset = 8 + 4 + 1 + 8;
        bytes[offset..offset + 4].copy_from_slice(&99i32.to_le_bytes());
        let err = FrameLogReader::load_from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, MocapError::CorruptLog(msg) if msg.contains("record 0")));
    }

    #[test]
    fn test_duplicate_joint_is_incomplete() {
        let mut bytes = encode_frames([&sample_frame(1)]).unwrap();
        // 把 SpineMid 改成 SpineBase，导致缺少 SpineMid
        let offset = 8 + 4 + 1 + 8 + JOINT_RECORD_SIZE;
        bytes[offset..offset + 4].copy_from_slice(&0i32.to_le_bytes());
        let err = FrameLogReader::load_from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, MocapError::IncompleteSkeleton(JointId::SpineMid)));
    }
}
