//! 端到端场景: 脚本化视频源 / 检测器 / 识别器 + 记录型上报器

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anpr::config::{AdapterConfig, AppConfig, StreamConfig};
use anpr::detection::{Candidate, DetectionAdapter, PlateDetector, PlateRecognizer, Recognition};
use anpr::error::{InferenceError, StreamError};
use anpr::input::{Frame, FrameStream, SimulatedSource, StreamSource};
use anpr::pipeline::{
    CapabilityFactory, EventCallback, EventKind, EventLog, EventSink, PipelineController,
    PipelineState, StreamLabel, StreamPipeline,
};
use anpr::reporter::{PlateEvent, ReportOutcome, Reporter};
use anpr::tracking::BoundingBox;

// ========== 测试替身 ==========

/// 质心在 (100, 100) 附近抖动 (<5px) 的车牌框
struct JitterDetector {
    calls: usize,
}

impl PlateDetector for JitterDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Candidate>, InferenceError> {
        const OFFSETS: [(i32, i32); 4] = [(0, 0), (3, -2), (-2, 3), (1, 1)];
        let (dx, dy) = OFFSETS[self.calls % OFFSETS.len()];
        self.calls += 1;
        Ok(vec![Candidate::with_confidence(
            BoundingBox::new(70 + dx, 90 + dy, 60, 20),
            0.8,
        )])
    }
}

/// 每隔一次失败的检测器
struct FlakyDetector {
    inner: JitterDetector,
    calls: usize,
}

impl PlateDetector for FlakyDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Candidate>, InferenceError> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            return Err(InferenceError::Detector("模型推理失败".into()));
        }
        self.inner.detect(frame)
    }
}

struct FixedText(&'static str);

impl PlateRecognizer for FixedText {
    fn recognize(&mut self, _region: &Frame) -> Result<Option<Recognition>, InferenceError> {
        Ok(Some(Recognition::new(self.0, 0.9)))
    }
}

#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<PlateEvent>>,
}

impl RecordingReporter {
    fn events(&self) -> Vec<PlateEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &PlateEvent) -> ReportOutcome {
        self.events.lock().unwrap().push(event.clone());
        ReportOutcome::Delivered
    }
}

/// 始终返回固定失败结果并计数的上报器
struct FailingReporter {
    outcome: ReportOutcome,
    attempts: Mutex<Vec<String>>,
}

impl FailingReporter {
    fn new(outcome: ReportOutcome) -> Self {
        Self {
            outcome,
            attempts: Mutex::new(Vec::new()),
        }
    }
}

impl Reporter for FailingReporter {
    fn report(&self, event: &PlateEvent) -> ReportOutcome {
        self.attempts.lock().unwrap().push(event.plate_text.clone());
        self.outcome.clone()
    }
}

/// 永远无法打开的视频源
struct UnreachableSource;

impl StreamSource for UnreachableSource {
    fn open(&self, url: &str) -> Result<Box<dyn FrameStream>, StreamError> {
        Err(StreamError::Open {
            url: url.to_string(),
            reason: "连接被拒绝".into(),
        })
    }
}

fn finite_source(frames: u64) -> SimulatedSource {
    SimulatedSource {
        width: 320,
        height: 240,
        fps: None,
        max_frames: Some(frames),
        plate: None,
    }
}

fn jitter_adapter(text: &'static str) -> DetectionAdapter {
    DetectionAdapter::new(
        Box::new(JitterDetector { calls: 0 }),
        Box::new(FixedText(text)),
        AdapterConfig::default(),
    )
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

// ========== 场景 ==========

#[test]
fn single_plate_across_sampled_frames_reports_once() {
    let reporter = Arc::new(RecordingReporter::default());
    let mut config = StreamConfig::new("sim://in");
    config.sample_interval = 30;

    let mut pipeline = StreamPipeline::new(
        StreamLabel::In,
        config,
        jitter_adapter("10AA123"),
        reporter.clone(),
        EventSink::detached(),
    );
    let stats = pipeline.run(&finite_source(90));

    assert_eq!(stats.frames_read, 90);
    assert_eq!(stats.frames_sampled, 3);
    assert_eq!(stats.tracks_created, 1);

    let tracker = pipeline.tracker();
    assert_eq!(tracker.track_count(), 1);
    let object = tracker.objects().next().unwrap();
    assert_eq!(object.stabilized_text, "10AA123");
    assert_eq!(object.text_history.len(), 3);

    let events = reporter.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].plate_text, "10AA123");
    assert_eq!(events[0].stream_label, StreamLabel::In);
    assert_eq!(events[0].track_id, object.id);
    assert!((events[0].confidence - 0.9).abs() < 1e-6);
}

#[test]
fn inference_failures_do_not_stop_the_stream() {
    let reporter = Arc::new(RecordingReporter::default());
    let mut config = StreamConfig::new("sim://out");
    config.sample_interval = 1;

    let adapter = DetectionAdapter::new(
        Box::new(FlakyDetector {
            inner: JitterDetector { calls: 0 },
            calls: 0,
        }),
        Box::new(FixedText("20BB456")),
        AdapterConfig::default(),
    );
    let mut pipeline = StreamPipeline::new(
        StreamLabel::Out,
        config,
        adapter,
        reporter.clone(),
        EventSink::detached(),
    );
    let stats = pipeline.run(&finite_source(10));

    assert_eq!(stats.frames_read, 10);
    assert_eq!(stats.frames_sampled, 10);
    assert_eq!(stats.inference_failures, 5);
    // 失败帧按空检测处理, 对象只是计一次丢失, 不会被注销
    assert_eq!(pipeline.tracker().track_count(), 1);
    assert_eq!(reporter.events().len(), 1);
}

#[test]
fn failed_reports_are_logged_once_and_stream_continues() {
    for outcome in [
        ReportOutcome::TransportFailed("连接超时".into()),
        ReportOutcome::Rejected(500),
    ] {
        let mut events = EventLog::new(64, None);
        let reporter = Arc::new(FailingReporter::new(outcome));
        let mut config = StreamConfig::new("sim://in");
        config.sample_interval = 1;

        let mut pipeline = StreamPipeline::new(
            StreamLabel::In,
            config,
            jitter_adapter("10AA123"),
            reporter.clone(),
            events.sink(),
        );
        let stats = pipeline.run(&finite_source(20));
        drop(pipeline);
        events.shutdown();

        assert_eq!(stats.frames_read, 20);
        assert_eq!(stats.frames_sampled, 20);
        // 同一稳定文本只尝试一次, 失败不重发
        assert_eq!(*reporter.attempts.lock().unwrap(), vec!["10AA123".to_string()]);
        assert_eq!(stats.reports_sent, 1);
        assert_eq!(stats.reports_delivered, 0);

        let recent = events.recent();
        let errors: Vec<_> = recent
            .iter()
            .filter(|e| e.kind == EventKind::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("10AA123"));
        assert!(!recent.iter().any(|e| e.kind == EventKind::Report));
        assert!(recent.iter().any(|e| e.kind == EventKind::Disconnected));
    }
}

#[test]
fn open_failure_returns_to_idle_and_logs() {
    let factory = CapabilityFactory::new(
        |_| Box::new(UnreachableSource) as Box<dyn StreamSource>,
        |_| Ok(jitter_adapter("10AA123")),
    );
    let reporter = Arc::new(RecordingReporter::default());
    let controller = PipelineController::new(AppConfig::default(), factory, reporter.clone(), None);

    controller.start(StreamLabel::In, "rtsp://10.0.0.1/none").unwrap();
    let stats = controller.wait(StreamLabel::In).unwrap();

    assert_eq!(stats.frames_read, 0);
    assert!(!controller.is_running(StreamLabel::In));
    assert_eq!(controller.state(StreamLabel::In), PipelineState::Idle);
    assert!(reporter.events().is_empty());
    assert!(wait_until(Duration::from_secs(2), || {
        controller
            .recent_events()
            .iter()
            .any(|e| e.stream == StreamLabel::In && e.kind == EventKind::Error)
    }));
}

#[test]
fn stop_interrupts_an_endless_stream() {
    let factory = CapabilityFactory::new(
        |_| {
            Box::new(SimulatedSource {
                fps: Some(100),
                max_frames: None,
                ..finite_source(0)
            }) as Box<dyn StreamSource>
        },
        |_| Ok(jitter_adapter("10AA123")),
    );
    let mut config = AppConfig::default();
    config.sample_interval = 2;
    let controller = PipelineController::new(
        config,
        factory,
        Arc::new(RecordingReporter::default()),
        None,
    );

    controller.start(StreamLabel::Out, "sim://out").unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        controller.state(StreamLabel::Out) == PipelineState::Running
    }));
    thread::sleep(Duration::from_millis(100));

    let stopped = Instant::now();
    let stats = controller.stop(StreamLabel::Out).unwrap();
    assert!(stopped.elapsed() < Duration::from_secs(1));
    assert!(stats.frames_read > 0);
    assert!(!controller.is_running(StreamLabel::Out));
    assert_eq!(controller.state(StreamLabel::Out), PipelineState::Idle);
}

#[test]
fn in_and_out_run_concurrently_with_independent_trackers() {
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = opened.clone();
    let factory = CapabilityFactory::new(
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(finite_source(60)) as Box<dyn StreamSource>
        },
        |label| {
            Ok(jitter_adapter(match label {
                StreamLabel::In => "10AA123",
                StreamLabel::Out => "99JJ890",
            }))
        },
    );
    let mut config = AppConfig::default();
    config.sample_interval = 10;

    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let callback: EventCallback = Box::new(move |_, message| {
        sink.lock().unwrap().push(message.to_string());
    });
    let reporter = Arc::new(RecordingReporter::default());
    let controller = PipelineController::new(config, factory, reporter.clone(), Some(callback));

    controller.start(StreamLabel::In, "sim://in").unwrap();
    controller.start(StreamLabel::Out, "sim://out").unwrap();
    let in_stats = controller.wait(StreamLabel::In).unwrap();
    let out_stats = controller.wait(StreamLabel::Out).unwrap();

    assert_eq!(opened.load(Ordering::SeqCst), 2);
    assert_eq!(in_stats.frames_sampled, 6);
    assert_eq!(out_stats.frames_sampled, 6);

    let mut events = reporter.events();
    events.sort_by_key(|e| e.stream_label);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].stream_label, StreamLabel::In);
    assert_eq!(events[0].plate_text, "10AA123");
    assert_eq!(events[1].stream_label, StreamLabel::Out);
    assert_eq!(events[1].plate_text, "99JJ890");
    // 各自的跟踪器从0开始编号
    assert_eq!(events[0].track_id, 0);
    assert_eq!(events[1].track_id, 0);

    assert!(wait_until(Duration::from_secs(2), || {
        let messages = messages.lock().unwrap();
        messages.iter().any(|m| m.starts_with("[IN]"))
            && messages.iter().any(|m| m.starts_with("[OUT]"))
    }));
}
