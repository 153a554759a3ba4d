//! 单路视频流水线 (Stream Pipeline)
//! 职责: 打开视频流 → 逐帧读取 → 每N帧推理 → 跟踪 → 上报新稳定的车牌

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::event_log::EventSink;
use super::{EventKind, PipelineState, StateCell, StreamLabel};
use crate::config::StreamConfig;
use crate::detection::DetectionAdapter;
use crate::input::{Frame, StreamSource};
use crate::reporter::{PlateEvent, ReportOutcome, Reporter};
use crate::tracking::CentroidTracker;

/// 单次运行统计
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_read: u64,
    pub frames_sampled: u64,
    pub inference_failures: u64,
    pub reports_sent: u64,
    pub reports_delivered: u64,
    pub tracks_created: u64,
}

pub struct StreamPipeline {
    label: StreamLabel,
    config: StreamConfig,
    adapter: DetectionAdapter,
    tracker: CentroidTracker,
    reporter: Arc<dyn Reporter>,
    events: EventSink,
    state: Arc<StateCell>,
    cancel: Arc<AtomicBool>,

    // 每个跟踪ID最近一次上报的文本
    last_reported: HashMap<u64, String>,
    stats: PipelineStats,
}

impl StreamPipeline {
    pub fn new(
        label: StreamLabel,
        config: StreamConfig,
        adapter: DetectionAdapter,
        reporter: Arc<dyn Reporter>,
        events: EventSink,
    ) -> Self {
        let tracker = CentroidTracker::new(config.tracker.clone());
        Self {
            label,
            config,
            adapter,
            tracker,
            reporter,
            events,
            state: Arc::new(StateCell::new()),
            cancel: Arc::new(AtomicBool::new(false)),
            last_reported: HashMap::new(),
            stats: PipelineStats::default(),
        }
    }

    /// 与控制器共享状态与停止标志
    pub fn with_control(mut self, state: Arc<StateCell>, cancel: Arc<AtomicBool>) -> Self {
        self.state = state;
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn tracker(&self) -> &CentroidTracker {
        &self.tracker
    }

    /// 运行到视频流结束或收到停止请求
    pub fn run(&mut self, source: &dyn StreamSource) -> PipelineStats {
        // 控制器启动时已置为 Connecting; 线程启动前被停止则不再打开视频源
        let connecting = self
            .state
            .transition(PipelineState::Idle, PipelineState::Connecting)
            || self.state.get() == PipelineState::Connecting;
        if !connecting || self.cancel.load(Ordering::Relaxed) {
            self.emit(EventKind::Disconnected, "🛑 启动前已停止");
            self.state.set(PipelineState::Idle);
            return self.stats.clone();
        }
        tracing::info!(
            "🎬 [{}] 连接视频流: {} (检测器={}, 识别器={}, 每{}帧推理)",
            self.label,
            self.config.url,
            self.adapter.detector_name(),
            self.adapter.recognizer_name(),
            self.config.sample_interval
        );

        let mut stream = match source.open(&self.config.url) {
            Ok(stream) => stream,
            Err(e) => {
                self.emit(EventKind::Error, format!("❌ {}", e));
                self.state.set(PipelineState::Idle);
                return self.stats.clone();
            }
        };

        // 连接期间已请求停止
        if !self.state.transition(PipelineState::Connecting, PipelineState::Running) {
            stream.close();
            self.emit(EventKind::Disconnected, "🛑 连接完成前已停止");
            self.state.set(PipelineState::Idle);
            return self.stats.clone();
        }
        self.emit(EventKind::Connected, format!("✅ 已连接 {}", self.config.url));

        let started = Instant::now();
        let sample_interval = self.config.sample_interval.max(1) as u64;
        let reason = loop {
            if self.cancel.load(Ordering::Relaxed) {
                break "收到停止请求".to_string();
            }

            let frame = match stream.read() {
                Ok(frame) => frame,
                Err(e) => break e.to_string(),
            };
            self.stats.frames_read += 1;

            if self.stats.frames_read % sample_interval != 0 {
                continue;
            }
            self.process_frame(&frame);
        };

        self.state.set(PipelineState::Stopping);
        stream.close();

        self.emit(
            EventKind::Disconnected,
            format!(
                "🔌 已断开: {} | 读帧{} 推理{} 上报{} | 用时{:.1}s",
                reason,
                self.stats.frames_read,
                self.stats.frames_sampled,
                self.stats.reports_sent,
                started.elapsed().as_secs_f64()
            ),
        );
        tracing::debug!("[{}] {}", self.label, self.tracker.stats());
        self.state.set(PipelineState::Idle);
        self.stats.clone()
    }

    /// 处理一个采样帧
    pub fn process_frame(&mut self, frame: &Frame) {
        self.stats.frames_sampled += 1;

        let records = match self.adapter.process(frame) {
            Ok(records) => records,
            Err(e) => {
                // 推理失败按空检测处理
                self.stats.inference_failures += 1;
                self.emit(EventKind::Error, format!("⚠️ 推理失败: {}", e));
                Vec::new()
            }
        };

        let before = self.tracker.next_id();
        let positions = self.tracker.update(&records);
        self.stats.tracks_created += self.tracker.next_id() - before;

        // 已注销对象不再记忆
        self.last_reported.retain(|id, _| positions.contains_key(id));

        let pending: Vec<PlateEvent> = self
            .tracker
            .objects()
            .filter(|object| !object.stabilized_text.is_empty())
            .filter(|object| self.last_reported.get(&object.id) != Some(&object.stabilized_text))
            .map(|object| {
                PlateEvent::new(
                    object.stabilized_text.clone(),
                    self.label,
                    object.confidence,
                    object.id,
                )
            })
            .collect();

        for event in pending {
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: PlateEvent) {
        self.emit(
            EventKind::Detection,
            format!(
                "🚗 车牌 {} (跟踪#{}, 置信度{:.2})",
                event.plate_text, event.track_id, event.confidence
            ),
        );

        // 单次尝试, 无论结果如何都不再重发同一文本
        self.last_reported
            .insert(event.track_id, event.plate_text.clone());
        self.stats.reports_sent += 1;

        match self.reporter.report(&event) {
            ReportOutcome::Delivered => {
                self.stats.reports_delivered += 1;
                self.emit(EventKind::Report, format!("📤 上报成功: {}", event.plate_text));
            }
            ReportOutcome::Rejected(code) => {
                self.emit(
                    EventKind::Error,
                    format!("❌ 上报被拒: {} (HTTP {})", event.plate_text, code),
                );
            }
            ReportOutcome::TransportFailed(reason) => {
                self.emit(
                    EventKind::Error,
                    format!("❌ 上报失败: {} ({})", event.plate_text, reason),
                );
            }
        }
    }

    fn emit(&self, kind: EventKind, message: impl Into<String>) {
        self.events.emit(self.label, kind, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::detection::{Candidate, PlateDetector, PlateRecognizer, Recognition};
    use crate::error::InferenceError;
    use crate::input::SimulatedSource;
    use crate::error::StreamError;
    use crate::input::FrameStream;
    use crate::pipeline::EventLog;
    use crate::tracking::BoundingBox;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct OneBox;

    impl PlateDetector for OneBox {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Candidate>, InferenceError> {
            Ok(vec![Candidate::new(BoundingBox::new(10, 10, 20, 8))])
        }
    }

    /// 依次返回脚本中的文本, 用完后重复最后一个
    struct Script(Vec<&'static str>, usize);

    impl PlateRecognizer for Script {
        fn recognize(&mut self, _region: &Frame) -> Result<Option<Recognition>, InferenceError> {
            let i = self.1.min(self.0.len() - 1);
            self.1 += 1;
            Ok(Some(Recognition::new(self.0[i], 0.9)))
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<PlateEvent>>);

    impl Reporter for Recording {
        fn report(&self, event: &PlateEvent) -> ReportOutcome {
            self.0.lock().unwrap().push(event.clone());
            ReportOutcome::Delivered
        }
    }

    fn pipeline(texts: Vec<&'static str>, reporter: Arc<Recording>) -> StreamPipeline {
        let adapter = DetectionAdapter::new(
            Box::new(OneBox),
            Box::new(Script(texts, 0)),
            AdapterConfig::default(),
        );
        let mut config = StreamConfig::new("sim://in");
        config.sample_interval = 1;
        StreamPipeline::new(StreamLabel::In, config, adapter, reporter, EventSink::detached())
    }

    #[test]
    fn test_reports_only_on_stabilized_change() {
        let reporter = Arc::new(Recording::default());
        let mut p = pipeline(vec!["AB1", "AB1", "CD2", "CD2", "CD2"], reporter.clone());
        let frame = Frame::new(64, 32);
        for _ in 0..5 {
            p.process_frame(&frame);
        }

        // 第4帧 2:2 平局仍取先出现的 AB1, 第5帧 CD2 胜出
        let texts: Vec<String> = reporter
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.plate_text.clone())
            .collect();
        assert_eq!(texts, vec!["AB1", "CD2"]);
        assert_eq!(p.tracker().track_count(), 1);
    }

    #[test]
    fn test_run_samples_every_nth_frame() {
        let reporter = Arc::new(Recording::default());
        let mut p = pipeline(vec!["10AA123"], reporter.clone());
        p.config.sample_interval = 30;

        let source = SimulatedSource {
            width: 64,
            height: 32,
            fps: None,
            max_frames: Some(95),
            plate: None,
        };
        let stats = p.run(&source);

        assert_eq!(stats.frames_read, 95);
        assert_eq!(stats.frames_sampled, 3);
        assert_eq!(stats.reports_sent, 1);
        assert_eq!(stats.tracks_created, 1);
        assert_eq!(p.state(), PipelineState::Idle);
    }

    /// 记录打开次数的视频源
    struct CountingSource {
        inner: SimulatedSource,
        opened: AtomicUsize,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                inner: SimulatedSource {
                    fps: None,
                    max_frames: Some(10),
                    ..SimulatedSource::default()
                },
                opened: AtomicUsize::new(0),
            }
        }
    }

    impl StreamSource for CountingSource {
        fn open(&self, url: &str) -> Result<Box<dyn FrameStream>, StreamError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.inner.open(url)
        }
    }

    fn connected_events(events: &EventLog) -> usize {
        events
            .recent()
            .iter()
            .filter(|e| e.kind == EventKind::Connected)
            .count()
    }

    #[test]
    fn test_cancel_before_first_frame() {
        let reporter = Arc::new(Recording::default());
        let mut p = pipeline(vec!["10AA123"], reporter.clone());
        p.cancel_flag().store(true, Ordering::Relaxed);

        let source = CountingSource::new();
        let stats = p.run(&source);
        assert_eq!(stats.frames_read, 0);
        assert_eq!(source.opened.load(Ordering::SeqCst), 0);
        assert_eq!(p.state(), PipelineState::Idle);
        assert!(reporter.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stopping_state_is_not_overwritten() {
        let mut events = EventLog::new(16, None);
        let reporter = Arc::new(Recording::default());
        let state = Arc::new(StateCell::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let mut p = pipeline(vec!["10AA123"], reporter.clone())
            .with_control(state.clone(), cancel.clone());
        p.events = events.sink();

        // 控制器在线程进入 run 之前完成了 stop
        state.set(PipelineState::Connecting);
        cancel.store(true, Ordering::Relaxed);
        assert!(state.transition(PipelineState::Connecting, PipelineState::Stopping));

        let source = CountingSource::new();
        let stats = p.run(&source);
        assert_eq!(stats.frames_read, 0);
        assert_eq!(source.opened.load(Ordering::SeqCst), 0);
        assert_eq!(state.get(), PipelineState::Idle);

        drop(p);
        events.shutdown();
        assert_eq!(connected_events(&events), 0);
    }

    #[test]
    fn test_controller_set_connecting_is_kept() {
        let reporter = Arc::new(Recording::default());
        let state = Arc::new(StateCell::new());
        state.set(PipelineState::Connecting);
        let mut p = pipeline(vec!["10AA123"], reporter)
            .with_control(state.clone(), Arc::new(AtomicBool::new(false)));

        let source = CountingSource::new();
        let stats = p.run(&source);
        assert_eq!(source.opened.load(Ordering::SeqCst), 1);
        assert_eq!(stats.frames_read, 10);
        assert_eq!(state.get(), PipelineState::Idle);
    }
}
