//! 单槽帧交接 - 采集线程 → 消费线程
//!
//! 只保留最新一帧：消费者来不及取时新帧直接覆盖旧帧，
//! 不会排队也不会读到半帧。关闭标志会立即唤醒等待者。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::frame::Frame;

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    shutdown: bool,
    /// 被覆盖（未被消费）的帧数
    dropped: u64,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Shared {
    fn shutdown(&self) {
        self.slot.lock().shutdown = true;
        self.ready.notify_all();
    }

    fn is_shutdown(&self) -> bool {
        self.slot.lock().shutdown
    }
}

/// 创建一对发送端 / 接收端
///
/// 两端都不能克隆：恰好一个写者、一个读者。
pub fn frame_slot() -> (FrameSender, FrameReceiver) {
    let shared = Arc::new(Shared::default());
    (
        FrameSender { shared: shared.clone() },
        FrameReceiver { shared },
    )
}

// ============================================================================
// 发送端
// ============================================================================

/// 发送端（采集线程持有）
pub struct FrameSender {
    shared: Arc<Shared>,
}

impl FrameSender {
    /// 发布一帧，返回是否覆盖了尚未被消费的旧帧
    ///
    /// 关闭后发布的帧被丢弃。
    pub fn publish(&self, frame: Frame) -> bool {
        let overwritten = {
            let mut slot = self.shared.slot.lock();
            if slot.shutdown {
                return false;
            }
            let overwritten = slot.frame.replace(frame).is_some();
            if overwritten {
                slot.dropped += 1;
            }
            overwritten
        };
        self.shared.ready.notify_one();
        overwritten
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    /// 只能用来关闭的句柄
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { shared: self.shared.clone() }
    }
}

impl Drop for FrameSender {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

// ============================================================================
// 接收端
// ============================================================================

/// 接收端（消费线程持有）
pub struct FrameReceiver {
    shared: Arc<Shared>,
}

impl FrameReceiver {
    /// 取走最新帧，不阻塞
    pub fn try_take(&self) -> Option<Frame> {
        self.shared.slot.lock().frame.take()
    }

    /// 等待下一帧，超时或关闭时返回 None
    ///
    /// 关闭前已发布、尚未取走的最后一帧仍会交付，之后才返回 None。
    pub fn wait_take(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(frame) = slot.frame.take() {
                return Some(frame);
            }
            if slot.shutdown {
                return None;
            }
            if self.shared.ready.wait_until(&mut slot, deadline).timed_out() {
                return None;
            }
        }
    }

    /// 被覆盖丢弃的帧数
    pub fn dropped_frames(&self) -> u64 {
        self.shared.slot.lock().dropped
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

/// 关闭句柄
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<Shared>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_overwrite_latest() {
        let (tx, rx) = frame_slot();
        assert!(!tx.publish(Frame::empty(1)));
        assert!(tx.publish(Frame::empty(2)));
        assert!(tx.publish(Frame::empty(3)));

        assert_eq!(rx.try_take().map(|f| f.timestamp()), Some(3));
        assert_eq!(rx.try_take(), None);
        assert_eq!(rx.dropped_frames(), 2);
    }

    #[test]
    fn test_wait_across_threads() {
        let (tx, rx) = frame_slot();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.publish(Frame::empty(7));
        });

        let frame = rx.wait_take(Duration::from_secs(5));
        assert_eq!(frame.map(|f| f.timestamp()), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn test_wait_timeout() {
        let (_tx, rx) = frame_slot();
        assert_eq!(rx.wait_take(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_shutdown_wakes_waiter() {
        let (tx, rx) = frame_slot();
        let handle = tx.shutdown_handle();
        let waiter = thread::spawn(move || rx.wait_take(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        handle.shutdown();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(start.elapsed() < Duration::from_secs(5));

        // 关闭后发布无效
        assert!(!tx.publish(Frame::empty(1)));
        assert!(tx.is_shutdown());
    }

    #[test]
    fn test_sender_drop_shuts_down() {
        let (tx, rx) = frame_slot();
        drop(tx);
        assert!(rx.is_shutdown());
        assert_eq!(rx.wait_take(Duration::from_secs(30)), None);
    }

    #[test]
    fn test_last_frame_delivered_after_sender_drop() {
        let (tx, rx) = frame_slot();
        tx.publish(Frame::empty(1));
        tx.publish(Frame::empty(2));
        drop(tx);

        let start = Instant::now();
        assert_eq!(rx.wait_take(Duration::from_secs(30)).map(|f| f.timestamp()), Some(2));
        assert_eq!(rx.wait_take(Duration::from_secs(30)), None);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
