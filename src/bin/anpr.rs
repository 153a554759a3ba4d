/// 双路车牌识别 (IN / OUT) - 跟踪 + 文本投票 + HTTP上报
///
/// 主程序入口 - 直接运行: cargo run --bin anpr --release -- --simulate --dry-run
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use anpr::config::AppConfig;
use anpr::detection::{
    ContourPlateDetector, DetectionAdapter, PlateDetector, PlateRecognizer, SimulatedDetector,
    SimulatedRecognizer,
};
use anpr::error::InferenceError;
use anpr::input::{SimulatedSource, StreamSource};
use anpr::pipeline::{CapabilityFactory, PipelineController, StreamLabel};
use anpr::reporter::build_reporter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DetectorKind {
    /// 边缘 + 轮廓 + 面积/宽高比过滤
    Contour,
    /// 固定位置附近抖动的模拟框
    Simulated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RecognizerKind {
    /// 从样例车牌中读取
    Simulated,
    /// Tesseract OCR (需要 `tesseract` 特性)
    Tesseract,
}

/// 双路车牌识别程序
#[derive(Parser, Debug)]
#[command(author, version, about = "双路车牌识别 (IN/OUT)", long_about = None)]
struct Args {
    /// 配置文件 (不存在时自动创建)
    #[arg(short, long, default_value = "anpr_config.json")]
    config: PathBuf,

    /// IN 车道视频流地址
    #[arg(long)]
    in_url: Option<String>,

    /// OUT 车道视频流地址
    #[arg(long)]
    out_url: Option<String>,

    /// 采集端地址 (空字符串 = 只打印)
    #[arg(long)]
    api_url: Option<String>,

    /// 每N帧推理一次
    #[arg(short, long)]
    sample_interval: Option<u32>,

    /// 只启动指定车道 (默认两路都启动)
    #[arg(long, value_parser = parse_label)]
    only: Option<StreamLabel>,

    /// 模拟模式: 合成视频帧 + 模拟检测
    #[arg(long)]
    simulate: bool,

    /// 不发送HTTP请求, 只打印上报内容
    #[arg(long)]
    dry_run: bool,

    /// 检测器 (默认: 模拟模式下为 simulated, 否则为 contour)
    #[arg(long, value_enum)]
    detector: Option<DetectorKind>,

    /// 识别器 (默认: 启用 tesseract 特性时为 tesseract, 否则为 simulated)
    #[arg(long, value_enum)]
    recognizer: Option<RecognizerKind>,

    /// tessdata 目录
    #[arg(long)]
    tessdata: Option<String>,

    /// 运行时长(秒), 不指定则运行到视频流结束
    #[arg(short, long)]
    duration: Option<u64>,
}

fn parse_label(s: &str) -> Result<StreamLabel, String> {
    s.parse().map_err(|e: anpr::ControlError| e.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("anpr=info")),
        )
        .with_thread_names(true)
        .init();

    let args = Args::parse();

    // ========== 配置 ==========
    let mut config = AppConfig::load(&args.config);
    if let Some(url) = &args.in_url {
        config.in_url = url.clone();
    }
    if let Some(url) = &args.out_url {
        config.out_url = url.clone();
    }
    if let Some(url) = &args.api_url {
        config.reporter.api_url = url.clone();
    }
    if let Some(interval) = args.sample_interval {
        config.sample_interval = interval;
    }
    config.validate().context("配置无效")?;
    config.print_summary();

    let detector_kind = args.detector.unwrap_or(if args.simulate {
        DetectorKind::Simulated
    } else {
        DetectorKind::Contour
    });
    let recognizer_kind = args.recognizer.unwrap_or(if cfg!(feature = "tesseract") {
        RecognizerKind::Tesseract
    } else {
        RecognizerKind::Simulated
    });
    if recognizer_kind == RecognizerKind::Tesseract && !cfg!(feature = "tesseract") {
        bail!("未启用 tesseract 特性, 请使用 --features tesseract 重新编译");
    }
    if !args.simulate && !cfg!(feature = "ffmpeg") {
        bail!("未启用 ffmpeg 特性, 无法解码视频流; 使用 --simulate 或 --features ffmpeg");
    }
    println!("🔍 检测器: {:?} | 识别器: {:?}", detector_kind, recognizer_kind);

    // ========== 能力构造 ==========
    let simulate = args.simulate;
    let read_timeout = Duration::from_secs(config.read_timeout_secs.max(1));
    let adapter_config = config.adapter.clone();
    let tessdata = args.tessdata.clone();

    let factory = CapabilityFactory::new(
        move |_label| make_source(simulate, read_timeout),
        move |_label| {
            let detector: Box<dyn PlateDetector> = match detector_kind {
                DetectorKind::Contour => Box::new(ContourPlateDetector::default()),
                DetectorKind::Simulated => Box::new(SimulatedDetector::default()),
            };
            let recognizer = make_recognizer(recognizer_kind, tessdata.as_deref())?;
            Ok(DetectionAdapter::new(
                detector,
                recognizer,
                adapter_config.clone(),
            ))
        },
    );

    let reporter = build_reporter(&config.reporter, args.dry_run);
    println!("📤 上报方式: {}", reporter.name());

    let labels: Vec<StreamLabel> = match args.only {
        Some(label) => vec![label],
        None => StreamLabel::ALL.to_vec(),
    };
    let urls: Vec<String> = labels
        .iter()
        .map(|&label| config.url_for(label).to_string())
        .collect();

    let controller = PipelineController::new(config, factory, reporter, None);

    // ========== 启动 ==========
    for (&label, url) in labels.iter().zip(&urls) {
        controller
            .start(label, url)
            .with_context(|| format!("启动 {} 流失败", label))?;
    }

    let started = Instant::now();
    match args.duration {
        Some(secs) => {
            let deadline = started + Duration::from_secs(secs);
            while Instant::now() < deadline && labels.iter().any(|&l| controller.is_running(l)) {
                thread::sleep(Duration::from_millis(200));
            }
            for &label in &labels {
                if let Ok(stats) = controller.stop(label) {
                    println!("📊 [{}] {:?}", label, stats);
                }
            }
        }
        None => {
            for &label in &labels {
                if let Some(stats) = controller.wait(label) {
                    println!("📊 [{}] {:?}", label, stats);
                }
            }
        }
    }

    println!(
        "✅ 运行结束, 用时 {:.1}s, 最近事件 {} 条",
        started.elapsed().as_secs_f64(),
        controller.recent_events().len()
    );
    Ok(())
}

#[cfg(feature = "ffmpeg")]
fn make_source(simulate: bool, read_timeout: Duration) -> Box<dyn StreamSource> {
    if simulate {
        Box::new(SimulatedSource::default())
    } else {
        Box::new(anpr::input::FfmpegSource::new(read_timeout))
    }
}

#[cfg(not(feature = "ffmpeg"))]
fn make_source(_simulate: bool, _read_timeout: Duration) -> Box<dyn StreamSource> {
    Box::new(SimulatedSource::default())
}

#[cfg(feature = "tesseract")]
fn make_recognizer(
    kind: RecognizerKind,
    tessdata: Option<&str>,
) -> Result<Box<dyn PlateRecognizer>, InferenceError> {
    Ok(match kind {
        RecognizerKind::Simulated => Box::new(SimulatedRecognizer::default()),
        RecognizerKind::Tesseract => {
            Box::new(anpr::detection::TesseractRecognizer::new(tessdata, "eng")?)
        }
    })
}

#[cfg(not(feature = "tesseract"))]
fn make_recognizer(
    kind: RecognizerKind,
    _tessdata: Option<&str>,
) -> Result<Box<dyn PlateRecognizer>, InferenceError> {
    match kind {
        RecognizerKind::Simulated => Ok(Box::new(SimulatedRecognizer::default())),
        RecognizerKind::Tesseract => {
            Err(InferenceError::Recognizer("未启用 tesseract 特性".into()))
        }
    }
}
