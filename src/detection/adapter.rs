//! 检测适配器 (Detection Adapter)
//! 职责: 检测器 + 识别器 → 单帧统一的 DetectionRecord 序列

use std::panic::{self, AssertUnwindSafe};

use image::imageops;
use tracing::{debug, trace};

use super::text::normalize_plate_text;
use super::types::DetectionRecord;
use super::{PlateDetector, PlateRecognizer};
use crate::config::AdapterConfig;
use crate::error::InferenceError;
use crate::input::Frame;

pub struct DetectionAdapter {
    detector: Box<dyn PlateDetector>,
    recognizer: Box<dyn PlateRecognizer>,
    config: AdapterConfig,
}

impl DetectionAdapter {
    pub fn new(
        detector: Box<dyn PlateDetector>,
        recognizer: Box<dyn PlateRecognizer>,
        config: AdapterConfig,
    ) -> Self {
        Self {
            detector,
            recognizer,
            config,
        }
    }

    /// 处理一帧
    ///
    /// 检测器/识别器返回错误或panic时, 整帧返回 `Err`,
    /// 由流水线记录日志并按空检测处理。
    pub fn process(&mut self, frame: &Frame) -> Result<Vec<DetectionRecord>, InferenceError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.process_frame(frame))) {
            Ok(result) => result,
            Err(payload) => Err(InferenceError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn process_frame(&mut self, frame: &Frame) -> Result<Vec<DetectionRecord>, InferenceError> {
        let candidates = self.detector.detect(frame)?;
        let mut records = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            // 1. 裁剪 (越界/零面积直接跳过)
            let Some(region) = candidate.bbox.clip(frame.width(), frame.height()) else {
                trace!("跳过空裁剪: {:?}", candidate.bbox);
                continue;
            };
            let crop = imageops::crop_imm(
                frame,
                region.x as u32,
                region.y as u32,
                region.width as u32,
                region.height as u32,
            )
            .to_image();

            // 2. OCR识别 + 清洗
            let recognition = self.recognizer.recognize(&crop)?.and_then(|r| {
                let text = normalize_plate_text(&r.text);
                (!text.is_empty()).then_some((text, r.confidence))
            });

            // 3. 置信度下限
            match recognition {
                Some((text, confidence)) if confidence >= self.config.min_text_confidence => {
                    records.push(DetectionRecord::new(candidate.bbox, text, confidence));
                }
                other => {
                    debug!(
                        "OCR未通过: {:?} (下限 {:.2})",
                        other, self.config.min_text_confidence
                    );
                    if self.config.keep_unread_boxes {
                        records.push(DetectionRecord::geometry_only(
                            candidate.bbox,
                            candidate.confidence.unwrap_or(0.0),
                        ));
                    }
                }
            }
        }

        Ok(records)
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知panic".to_string()
    }
}
