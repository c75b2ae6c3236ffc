//! 会话 - 把数据源、回放、录制和布娃娃串在一起
//!
//! 每个 tick（单一消费线程）：
//! 1. 取当前帧：有实时数据时取最新实时帧，否则取回放游标处的帧
//! 2. 选出驱动身体，更新布娃娃锚点
//! 3. 物理步进并读回刚体位姿

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use crate::animation::{PlaybackConfig, PlaybackController};
use crate::capture::{Body, BodyId, Frame, FrameLogWriter, FrameReceiver, FrameStore};
use crate::physics::{PhysicsConfig, Ragdoll, RagdollBuilder, RagdollWorld, RapierWorld};
use crate::skeleton::JointTree;
use crate::Result;

/// 驱动布娃娃的身体选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrivingBody {
    /// 编号最小的身体
    #[default]
    First,
    /// 指定编号的身体，不在帧中时不驱动
    Id(BodyId),
}

impl DrivingBody {
    pub fn select<'a>(&self, frame: &'a Frame) -> Option<&'a Body> {
        match *self {
            DrivingBody::First => frame.first_body().map(|(_, body)| body),
            DrivingBody::Id(id) => frame.body(id),
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub playback: PlaybackConfig,
    pub physics: PhysicsConfig,
    /// 设置后每个实时帧都会追加写入该日志
    pub recording_path: Option<PathBuf>,
    pub driving_body: DrivingBody,
}

/// 实时数据源：接收端 + 只追加的实时帧存储
struct LiveFeed {
    receiver: FrameReceiver,
    store: FrameStore,
}

/// 会话
pub struct Session {
    config: SessionConfig,
    playback: Option<PlaybackController>,
    live: Option<LiveFeed>,
    recorder: Option<FrameLogWriter<BufWriter<File>>>,
    world: RapierWorld,
    ragdoll: Ragdoll<RapierWorld>,
    reference: JointTree,
    current: Option<Frame>,
}

impl Session {
    /// 创建会话，布娃娃由参考姿态构建
    pub fn new(config: SessionConfig) -> Result<Self> {
        let recorder = match &config.recording_path {
            Some(path) => {
                log::info!("录制到: {}", path.display());
                Some(FrameLogWriter::create(path)?)
            }
            None => None,
        };

        let reference = JointTree::bind_pose();
        let mut world = RapierWorld::new(&config.physics);
        let ragdoll = RagdollBuilder::new(&reference, &config.physics).build(&mut world);

        Ok(Self {
            config,
            playback: None,
            live: None,
            recorder,
            world,
            ragdoll,
            reference,
            current: None,
        })
    }

    /// 挂载录制好的帧存储，回放从首帧开始
    pub fn load_recording(&mut self, store: Arc<FrameStore>) -> Result<()> {
        let mut playback = PlaybackController::new(store, self.config.playback.clone())?;
        playback.play();
        self.playback = Some(playback);
        Ok(())
    }

    /// 挂载实时采集接收端
    pub fn attach_live(&mut self, receiver: FrameReceiver) {
        self.live = Some(LiveFeed {
            receiver,
            store: FrameStore::new(),
        });
    }

    /// 断开实时数据并通知采集线程退出
    pub fn detach_live(&mut self) -> Option<FrameStore> {
        self.live.take().map(|live| {
            live.receiver.shutdown();
            live.store
        })
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn playback(&self) -> Option<&PlaybackController> {
        self.playback.as_ref()
    }

    #[inline]
    pub fn playback_mut(&mut self) -> Option<&mut PlaybackController> {
        self.playback.as_mut()
    }

    /// 目前收到的实时帧
    pub fn live_store(&self) -> Option<&FrameStore> {
        self.live.as_ref().map(|live| &live.store)
    }

    #[inline]
    pub fn ragdoll(&self) -> &Ragdoll<RapierWorld> {
        &self.ragdoll
    }

    #[inline]
    pub fn world(&self) -> &RapierWorld {
        &self.world
    }

    /// 构建布娃娃用的参考骨架
    #[inline]
    pub fn reference_skeleton(&self) -> &JointTree {
        &self.reference
    }

    /// 最近一个 tick 使用的帧
    #[inline]
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    /// 当前驱动布娃娃的身体
    pub fn driving_body(&self) -> Option<&Body> {
        self.current
            .as_ref()
            .and_then(|frame| self.config.driving_body.select(frame))
    }

    /// 推进一个 tick
    pub fn tick(&mut self, dt: f32) -> Result<()> {
        if let Some(frame) = self.poll_live()? {
            self.current = Some(frame);
        } else if self.live.is_none() {
            if let Some(playback) = self.playback.as_mut() {
                self.current = Some(playback.advance(dt)?.into_owned());
            }
        }

        match self
            .current
            .as_ref()
            .and_then(|frame| self.config.driving_body.select(frame))
        {
            Some(body) => self.ragdoll.sync_targets(&mut self.world, body),
            None => self.ragdoll.release_anchors(&mut self.world),
        }

        self.world.step(dt);
        self.ragdoll.read_back(&self.world);
        Ok(())
    }

    /// 取最新实时帧：录制、追加到实时存储
    fn poll_live(&mut self) -> Result<Option<Frame>> {
        let Some(live) = self.live.as_mut() else {
            return Ok(None);
        };
        let Some(frame) = live.receiver.try_take() else {
            return Ok(None);
        };

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.write_frame(&frame)?;
        }
        live.store.append(frame.clone())?;
        log::debug!("实时帧 t={} ({} 身体)", frame.timestamp(), frame.body_count());
        Ok(Some(frame))
    }

    /// 刷新录制文件
    pub fn flush(&mut self) -> Result<()> {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.flush()?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("录制文件刷新失败: {}", e);
        }
        if let Some(live) = &self.live {
            live.receiver.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{frame_slot, FrameLogReader, JointSample, RawBody};
    use crate::skeleton::schema::BIND_POSE_POSITIONS;
    use crate::skeleton::{JointId, TrackingState};
    use crate::MocapError;
    use glam::Quat;

    fn tracked_frame(timestamp: i64, body_id: BodyId) -> Frame {
        let raw = RawBody {
            body_id,
            lean: None,
            joints: JointId::ALL
                .into_iter()
                .map(|id| {
                    (
                        id,
                        JointSample::new(BIND_POSE_POSITIONS[id.index()], Quat::IDENTITY, TrackingState::Tracked),
                    )
                })
                .collect(),
        };
        Frame::from_raw(timestamp, vec![raw]).unwrap()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mocap_engine_{}_{}.bin", name, std::process::id()))
    }

    #[test]
    fn test_idle_session_steps_physics() {
        let mut session = Session::new(SessionConfig::default()).unwrap();
        session.tick(1.0 / 60.0).unwrap();
        assert!(session.current_frame().is_none());
        assert_eq!(session.ragdoll().active_anchor_count(), 0);
        assert_eq!(session.world().substeps(), 1);
    }

    #[test]
    fn test_recorded_playback_drives_anchors() {
        let store = Arc::new(FrameStore::from_frames(vec![tracked_frame(0, 3), tracked_frame(10_000_000, 3)]));
        let mut session = Session::new(SessionConfig::default()).unwrap();
        session.load_recording(store).unwrap();

        session.tick(0.5).unwrap();
        let frame = session.current_frame().unwrap();
        assert_eq!(frame.timestamp(), 5_000_000);
        assert!(session.driving_body().is_some());
        assert_eq!(session.ragdoll().active_anchor_count(), 5);
    }

    #[test]
    fn test_driving_body_policy() {
        let frame = tracked_frame(0, 7);
        assert!(DrivingBody::First.select(&frame).is_some());
        assert!(DrivingBody::Id(7).select(&frame).is_some());
        assert!(DrivingBody::Id(1).select(&frame).is_none());

        let config = SessionConfig {
            driving_body: DrivingBody::Id(1),
            ..Default::default()
        };
        let mut session = Session::new(config).unwrap();
        session.load_recording(Arc::new(FrameStore::from_frames(vec![frame]))).unwrap();
        session.tick(0.1).unwrap();
        assert_eq!(session.ragdoll().active_anchor_count(), 0);
    }

    #[test]
    fn test_live_frames_recorded() {
        let path = temp_path("live");
        let config = SessionConfig {
            recording_path: Some(path.clone()),
            ..Default::default()
        };
        let (tx, rx) = frame_slot();
        let mut session = Session::new(config).unwrap();
        session.attach_live(rx);

        for t in [100, 200, 300] {
            tx.publish(tracked_frame(t, 0));
            session.tick(1.0 / 60.0).unwrap();
        }
        // 没有新帧时保持最近一帧
        session.tick(1.0 / 60.0).unwrap();
        assert_eq!(session.current_frame().map(Frame::timestamp), Some(300));
        assert_eq!(session.live_store().map(FrameStore::len), Some(3));
        assert_eq!(session.ragdoll().active_anchor_count(), 5);

        drop(session);
        let frames = FrameLogReader::load(&path).unwrap();
        let timestamps: Vec<_> = frames.iter().map(Frame::timestamp).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_live_large_body_id_recorded() {
        let path = temp_path("large_id");
        let config = SessionConfig {
            recording_path: Some(path.clone()),
            ..Default::default()
        };
        let (tx, rx) = frame_slot();
        let mut session = Session::new(config).unwrap();
        session.attach_live(rx);

        tx.publish(tracked_frame(100, u64::MAX));
        session.tick(1.0 / 60.0).unwrap();
        assert_eq!(session.ragdoll().active_anchor_count(), 5);

        drop(session);
        let frames = FrameLogReader::load(&path).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].body(0).is_some());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_live_out_of_order_is_error() {
        let (tx, rx) = frame_slot();
        let mut session = Session::new(SessionConfig::default()).unwrap();
        session.attach_live(rx);

        tx.publish(Frame::empty(50));
        session.tick(0.01).unwrap();
        tx.publish(Frame::empty(40));
        assert!(matches!(
            session.tick(0.01),
            Err(MocapError::OutOfOrderFrame { previous: 50, timestamp: 40 })
        ));
    }

    #[test]
    fn test_detach_live_shuts_down_sender() {
        let (tx, rx) = frame_slot();
        let mut session = Session::new(SessionConfig::default()).unwrap();
        session.attach_live(rx);
        let store = session.detach_live().unwrap();
        assert!(store.is_empty());
        assert!(tx.is_shutdown());
    }
}
