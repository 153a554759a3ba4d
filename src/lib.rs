// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 系统配置
pub mod detection; // 车牌检测与识别
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod pipeline; // 双路流水线
pub mod reporter; // 车牌上报
pub mod tracking; // 质心跟踪与文本投票

pub use crate::config::{AppConfig, StreamConfig};
pub use crate::detection::{DetectionAdapter, DetectionRecord, PlateDetector, PlateRecognizer};
pub use crate::error::{ConfigError, ControlError, InferenceError, StreamError};
pub use crate::input::{Frame, FrameStream, StreamSource};
pub use crate::pipeline::{PipelineController, StreamLabel, StreamPipeline};
pub use crate::reporter::{PlateEvent, ReportOutcome, Reporter};
pub use crate::tracking::{BoundingBox, CentroidTracker, Centroid};
