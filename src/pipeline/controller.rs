//! 流水线控制器 - IN / OUT 两路的 start / stop / 状态查询
//!
//! 每路一个线程; 检测器、识别器和视频源在线程内部创建, 只归该线程所有。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use super::event_log::{EventCallback, EventLog};
use super::stream::{PipelineStats, StreamPipeline};
use super::{EventKind, PipelineEvent, PipelineState, StateCell, StreamLabel};
use crate::config::AppConfig;
use crate::detection::DetectionAdapter;
use crate::error::{ControlError, InferenceError};
use crate::input::StreamSource;
use crate::reporter::Reporter;

type SourceFn = dyn Fn(StreamLabel) -> Box<dyn StreamSource> + Send + Sync;
type AdapterFn = dyn Fn(StreamLabel) -> Result<DetectionAdapter, InferenceError> + Send + Sync;

/// 每路流水线的能力构造器 (视频源 + 检测适配器)
#[derive(Clone)]
pub struct CapabilityFactory {
    source: Arc<SourceFn>,
    adapter: Arc<AdapterFn>,
}

impl CapabilityFactory {
    pub fn new<S, A>(source: S, adapter: A) -> Self
    where
        S: Fn(StreamLabel) -> Box<dyn StreamSource> + Send + Sync + 'static,
        A: Fn(StreamLabel) -> Result<DetectionAdapter, InferenceError> + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(source),
            adapter: Arc::new(adapter),
        }
    }
}

struct RunningPipeline {
    state: Arc<StateCell>,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<PipelineStats>,
}

impl RunningPipeline {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// 流水线控制器
pub struct PipelineController {
    config: AppConfig,
    factory: CapabilityFactory,
    reporter: Arc<dyn Reporter>,
    pipelines: Mutex<HashMap<StreamLabel, RunningPipeline>>,
    events: EventLog,
}

impl PipelineController {
    pub fn new(
        config: AppConfig,
        factory: CapabilityFactory,
        reporter: Arc<dyn Reporter>,
        callback: Option<EventCallback>,
    ) -> Self {
        let events = EventLog::new(config.event_log_capacity, callback);
        Self {
            config,
            factory,
            reporter,
            pipelines: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn pipelines(&self) -> MutexGuard<'_, HashMap<StreamLabel, RunningPipeline>> {
        // 持锁期间不会panic, 中毒时直接取回数据
        self.pipelines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 启动一路流水线
    pub fn start(&self, label: StreamLabel, url: &str) -> Result<(), ControlError> {
        let mut pipelines = self.pipelines();
        if pipelines.get(&label).is_some_and(RunningPipeline::is_alive) {
            return Err(ControlError::AlreadyRunning(label));
        }
        // 回收已自然结束的上一轮
        if let Some(finished) = pipelines.remove(&label) {
            let _ = finished.handle.join();
        }

        let stream_config = self.config.stream_config(url);
        stream_config.validate()?;

        let state = Arc::new(StateCell::new());
        state.set(PipelineState::Connecting);
        let cancel = Arc::new(AtomicBool::new(false));

        let factory = self.factory.clone();
        let reporter = self.reporter.clone();
        let sink = self.events.sink();
        let thread_state = state.clone();
        let thread_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name(format!("pipeline-{}", label))
            .spawn(move || {
                let adapter = match (factory.adapter)(label) {
                    Ok(adapter) => adapter,
                    Err(e) => {
                        sink.emit(label, EventKind::Error, format!("❌ 检测器初始化失败: {}", e));
                        thread_state.set(PipelineState::Idle);
                        return PipelineStats::default();
                    }
                };
                let source = (factory.source)(label);

                let mut pipeline =
                    StreamPipeline::new(label, stream_config, adapter, reporter, sink)
                        .with_control(thread_state, thread_cancel);
                pipeline.run(source.as_ref())
            })?;

        pipelines.insert(
            label,
            RunningPipeline {
                state,
                cancel,
                handle,
            },
        );
        tracing::info!("▶️ [{}] 流水线已启动", label);
        Ok(())
    }

    /// 停止一路流水线并等待其退出
    ///
    /// 正在阻塞读帧时最多延迟一次读帧时长。
    pub fn stop(&self, label: StreamLabel) -> Result<PipelineStats, ControlError> {
        let running = self
            .pipelines()
            .remove(&label)
            .ok_or(ControlError::NotRunning(label))?;

        running.cancel.store(true, Ordering::Relaxed);
        if !running
            .state
            .transition(PipelineState::Running, PipelineState::Stopping)
        {
            running
                .state
                .transition(PipelineState::Connecting, PipelineState::Stopping);
        }

        let state = running.state.clone();
        let stats = Self::join(label, running);
        tracing::info!("⏹️ [{}] 流水线已停止 (状态: {})", label, state.get().name());
        Ok(stats)
    }

    /// 停止所有流水线
    pub fn stop_all(&self) {
        let drained: Vec<(StreamLabel, RunningPipeline)> = self.pipelines().drain().collect();
        for (label, running) in drained {
            running.cancel.store(true, Ordering::Relaxed);
            Self::join(label, running);
        }
    }

    /// 等待一路流水线自然结束 (不发送停止请求)
    pub fn wait(&self, label: StreamLabel) -> Option<PipelineStats> {
        let running = self.pipelines().remove(&label)?;
        Some(Self::join(label, running))
    }

    fn join(label: StreamLabel, running: RunningPipeline) -> PipelineStats {
        match running.handle.join() {
            Ok(stats) => stats,
            Err(_) => {
                tracing::error!("❌ [{}] 流水线线程panic", label);
                running.state.set(PipelineState::Idle);
                PipelineStats::default()
            }
        }
    }

    pub fn is_running(&self, label: StreamLabel) -> bool {
        self.pipelines()
            .get(&label)
            .is_some_and(RunningPipeline::is_alive)
    }

    pub fn state(&self, label: StreamLabel) -> PipelineState {
        self.pipelines()
            .get(&label)
            .map(|running| running.state.get())
            .unwrap_or(PipelineState::Idle)
    }

    /// 最近的事件 (从旧到新)
    pub fn recent_events(&self) -> Vec<PipelineEvent> {
        self.events.recent()
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.stop_all();
    }
}
