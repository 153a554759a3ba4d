/// 检测系统 (Detection System)
///
/// 检测器与识别器是可插拔能力, 适配器把两者统一成逐帧检测记录
/// - PlateDetector:   车牌区域检测
/// - PlateRecognizer: 车牌文本识别
/// - Adapter:         裁剪 + 识别 + 置信度过滤
pub mod adapter;
pub mod contour;
pub mod simulated;
#[cfg(feature = "tesseract")]
pub mod tesseract;
pub mod text;
pub mod types;

use crate::error::InferenceError;
use crate::input::Frame;

pub use adapter::DetectionAdapter;
pub use contour::{ContourConfig, ContourPlateDetector};
pub use simulated::{SimulatedDetector, SimulatedRecognizer, SAMPLE_PLATES};
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;
pub use text::normalize_plate_text;
pub use types::{Candidate, DetectionRecord, Recognition};

// ========== 能力接口 ==========

/// 车牌检测器: 一帧 → 候选框
pub trait PlateDetector: Send {
    fn name(&self) -> &str {
        "detector"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Candidate>, InferenceError>;
}

/// 车牌识别器: 裁剪区域 → 文本 + 置信度 (可能无结果)
pub trait PlateRecognizer: Send {
    fn name(&self) -> &str {
        "recognizer"
    }

    fn recognize(&mut self, region: &Frame) -> Result<Option<Recognition>, InferenceError>;
}
