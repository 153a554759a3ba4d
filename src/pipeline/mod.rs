/// 视频处理流水线 (Video Processing Pipeline)
///
/// 每路视频流 (IN / OUT) 一个独立线程, 互不共享跟踪状态:
/// - Stream:     读帧 → 采样 → 检测 → 跟踪 → 上报
/// - Controller: start / stop / 状态查询
/// - EventLog:   事件通道 → 单消费者 (最近N条 + 回调)
pub mod controller;
pub mod event_log;
pub mod stream;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Local};

use crate::error::ControlError;

pub use controller::{CapabilityFactory, PipelineController};
pub use event_log::{EventCallback, EventLog, EventSink};
pub use stream::{PipelineStats, StreamPipeline};

// ========== 流标签 ==========

/// 车道方向
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamLabel {
    In,
    Out,
}

impl StreamLabel {
    pub const ALL: [StreamLabel; 2] = [StreamLabel::In, StreamLabel::Out];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamLabel::In => "in",
            StreamLabel::Out => "out",
        }
    }
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamLabel {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(StreamLabel::In),
            "out" => Ok(StreamLabel::Out),
            _ => Err(ControlError::UnknownStream(s.to_string())),
        }
    }
}

// ========== 流水线状态 ==========

/// Idle → Connecting → Running → Stopping → Idle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Connecting = 1,
    Running = 2,
    Stopping = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Connecting,
            2 => PipelineState::Running,
            3 => PipelineState::Stopping,
            _ => PipelineState::Idle,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "空闲",
            PipelineState::Connecting => "连接中",
            PipelineState::Running => "运行中",
            PipelineState::Stopping => "停止中",
        }
    }
}

/// 跨线程共享的流水线状态
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(PipelineState::Idle as u8))
    }

    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// 仅当当前状态为 `from` 时切换
    pub fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

// ========== 事件 ==========

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Connected,
    Disconnected,
    Detection,
    Report,
    Error,
}

/// 流水线事件 (连接、断开、检测、上报结果、错误)
#[derive(Clone, Debug)]
pub struct PipelineEvent {
    pub timestamp: DateTime<Local>,
    pub stream: StreamLabel,
    pub kind: EventKind,
    pub message: String,
}

impl PipelineEvent {
    pub fn new(stream: StreamLabel, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            stream,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stream.as_str().to_uppercase(), self.message)
    }
}
