/// 车牌检测数据结构定义
/// Data structures for plate detection
use crate::tracking::BoundingBox;

// ========== 数据结构 ==========

/// 检测器候选框 (置信度可选)
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub confidence: Option<f32>,
}

impl Candidate {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            confidence: None,
        }
    }

    pub fn with_confidence(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            confidence: Some(confidence),
        }
    }
}

/// 识别结果 (识别器 → 适配器)
#[derive(Clone, Debug, PartialEq)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// 单帧检测记录 (适配器 → 跟踪器)
///
/// `text` 可能为空 (无OCR结果), `confidence` 缺省为 0
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    pub bbox: BoundingBox,
    pub text: String,
    pub confidence: f32,
}

impl DetectionRecord {
    pub fn new(bbox: BoundingBox, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            text: text.into(),
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    /// 仅有位置, 无文本
    pub fn geometry_only(bbox: BoundingBox, confidence: f32) -> Self {
        Self::new(bbox, String::new(), confidence)
    }
}
