//! 采集线程
//!
//! 采集设备是不透明的生产者，只需实现 CaptureSource。
//! 专用线程把原始采样解算成 Frame 后交给单槽交接。

use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};

use super::frame::{Body, Frame, RawBody};
use super::handoff::{FrameSender, ShutdownHandle};

/// 一个采集时刻的原始数据
#[derive(Clone, Debug, Default)]
pub struct RawCapture {
    pub timestamp: i64,
    pub bodies: Vec<RawBody>,
}

/// 采集数据源
pub trait CaptureSource: Send + 'static {
    /// 取下一批采样，可以阻塞；返回 None 表示采集结束
    fn next_capture(&mut self) -> Option<RawCapture>;
}

/// 把原始数据构建为帧
///
/// 缺关节的身体单独丢弃，不影响同一帧的其他身体。
pub fn build_frame(capture: RawCapture) -> Frame {
    let mut bodies = BTreeMap::new();
    for raw in capture.bodies {
        let body_id = raw.body_id;
        match Body::from_samples(raw.joints, raw.lean) {
            Ok(body) => {
                bodies.insert(body_id, body);
            }
            Err(e) => {
                log::warn!("身体 {} 被丢弃 (t={}): {}", body_id, capture.timestamp, e);
            }
        }
    }
    Frame::new(capture.timestamp, bodies)
}

/// 采集线程句柄
pub struct CaptureThread {
    handle: Option<JoinHandle<u64>>,
    shutdown: ShutdownHandle,
}

impl CaptureThread {
    /// 启动采集线程
    pub fn spawn<S: CaptureSource>(mut source: S, sender: FrameSender) -> std::io::Result<Self> {
        let shutdown = sender.shutdown_handle();
        let handle = thread::Builder::new()
            .name("mocap-capture".into())
            .spawn(move || {
                let mut published = 0u64;
                while !sender.is_shutdown() {
                    let Some(capture) = source.next_capture() else {
                        log::info!("采集结束，共发布 {} 帧", published);
                        break;
                    };
                    if sender.publish(build_frame(capture)) {
                        log::debug!("消费端未及时取帧，旧帧被覆盖");
                    }
                    published += 1;
                }
                published
            })?;

        Ok(Self { handle: Some(handle), shutdown })
    }

    /// 请求停止并等待线程退出，返回发布的帧数
    pub fn stop(mut self) -> u64 {
        self.shutdown.shutdown();
        self.join_inner()
    }

    /// 等待数据源自然结束
    pub fn join(mut self) -> u64 {
        self.join_inner()
    }

    fn join_inner(&mut self) -> u64 {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(published)) => published,
            Some(Err(_)) => {
                log::warn!("采集线程异常退出");
                0
            }
            None => 0,
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        self.join_inner();
    }
}
