//! Tesseract OCR 识别器 (需要 `tesseract` 特性)

use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use leptess::{LepTess, Variable};

use super::types::Recognition;
use super::PlateRecognizer;
use crate::error::InferenceError;
use crate::input::Frame;

const PLATE_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub struct TesseractRecognizer {
    api: LepTess,
}

// LepTess 内部持有裸指针; 每个实例只在所属流水线线程内使用
unsafe impl Send for TesseractRecognizer {}

impl TesseractRecognizer {
    /// `data_path`: tessdata 目录, `lang`: 语言模型名
    pub fn new(data_path: Option<&str>, lang: &str) -> Result<Self, InferenceError> {
        let mut api = LepTess::new(data_path, lang)
            .map_err(|e| InferenceError::Recognizer(format!("Tesseract初始化失败: {:?}", e)))?;

        api.set_variable(Variable::TesseditCharWhitelist, PLATE_WHITELIST)
            .map_err(|e| InferenceError::Recognizer(format!("{:?}", e)))?;
        // 单行文本
        api.set_variable(Variable::TesseditPagesegMode, "7")
            .map_err(|e| InferenceError::Recognizer(format!("{:?}", e)))?;

        Ok(Self { api })
    }
}

impl PlateRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&mut self, region: &Frame) -> Result<Option<Recognition>, InferenceError> {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(region.clone())
            .to_luma8()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| InferenceError::Recognizer(format!("编码失败: {}", e)))?;

        self.api
            .set_image_from_mem(&png)
            .map_err(|e| InferenceError::Recognizer(format!("{:?}", e)))?;

        let text = self
            .api
            .get_utf8_text()
            .map_err(|e| InferenceError::Recognizer(format!("{:?}", e)))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        // mean_text_conf: 0..100
        let confidence = (self.api.mean_text_conf().max(0) as f32 / 100.0).min(1.0);
        Ok(Some(Recognition::new(text, confidence)))
    }
}
