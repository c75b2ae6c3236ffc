//! 帧日志回放工具
//!
//! 加载二进制帧日志，按固定 tick 回放并驱动布娃娃，输出驱动身体和布娃娃的状态。
//!
//! ```text
//! cargo run --features replay --bin replay -- capture.bin --rate 0.5 --fps 30
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use mocap_engine::capture::FrameStore;
use mocap_engine::physics::PhysicsConfig;
use mocap_engine::session::{DrivingBody, Session, SessionConfig};
use mocap_engine::skeleton::JointId;
use mocap_engine::{PlaybackConfig, Result};

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay a skeletal frame log through the ragdoll")]
struct Cli {
    /// 帧日志路径
    log: PathBuf,
    /// 播放速率
    #[arg(long, default_value_t = 1.0)]
    rate: f64,
    /// 循环播放
    #[arg(long)]
    looping: bool,
    /// tick 频率
    #[arg(long, default_value_t = 60.0)]
    fps: f32,
    /// 最长运行时间（秒），循环播放时必须给出
    #[arg(long)]
    seconds: Option<f32>,
    /// 只用指定编号的身体驱动布娃娃
    #[arg(long)]
    body: Option<u64>,
    /// 不创建地面
    #[arg(long)]
    no_ground: bool,
    /// 输出物理调试日志
    #[arg(long)]
    debug_physics: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let store = Arc::new(FrameStore::load(&cli.log)?);
    let (start, end) = store.time_range()?;
    log::info!("时间范围: {} .. {} ({} 帧)", start, end, store.len());

    let mut physics = PhysicsConfig {
        debug_log: cli.debug_physics,
        ..Default::default()
    };
    if cli.no_ground {
        physics.ground_height = None;
    }

    let config = SessionConfig {
        playback: PlaybackConfig {
            rate: cli.rate,
            looping: cli.looping,
            ..Default::default()
        },
        physics,
        recording_path: None,
        driving_body: cli.body.map(DrivingBody::Id).unwrap_or_default(),
    };

    let mut session = Session::new(config)?;
    session.load_recording(store)?;

    let dt = 1.0 / cli.fps.max(1.0);
    let max_ticks = cli.seconds.map(|s| (s / dt).ceil() as u64);
    let report_every = cli.fps.max(1.0).round() as u64;
    let mut ticks = 0u64;

    loop {
        session.tick(dt)?;
        ticks += 1;

        if ticks % report_every == 0 {
            report(&session, ticks);
        }

        let finished = session.playback().map_or(true, |p| p.is_finished());
        if finished || max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }
    }

    report(&session, ticks);
    log::info!("回放结束: {} tick", ticks);
    Ok(())
}

fn report(session: &Session, ticks: u64) {
    let cursor = session.playback().map(|p| p.cursor()).unwrap_or_default();
    let ragdoll_head = session.ragdoll().body(JointId::Head).position;
    match session.driving_body() {
        Some(body) => {
            let head = body.position(JointId::Head);
            log::info!(
                "tick {} t={} 头部=({:.3}, {:.3}, {:.3}) 布娃娃头部=({:.3}, {:.3}, {:.3}) 锚点={}",
                ticks,
                cursor,
                head.x, head.y, head.z,
                ragdoll_head.x, ragdoll_head.y, ragdoll_head.z,
                session.ragdoll().active_anchor_count()
            );
        }
        None => {
            log::info!(
                "tick {} t={} 无驱动身体 布娃娃头部=({:.3}, {:.3}, {:.3})",
                ticks,
                cursor,
                ragdoll_head.x, ragdoll_head.y, ragdoll_head.z
            );
        }
    }
}
