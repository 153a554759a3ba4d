//! 轮廓车牌检测器 (轻量级, 无模型)
//! Contour-based plate candidate detector
//!
//! 灰度 → 高斯模糊 → Canny边缘 → 外轮廓 → 面积/长宽比过滤

use image::imageops;
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::point::Point;

use super::types::Candidate;
use super::PlateDetector;
use crate::error::InferenceError;
use crate::input::Frame;
use crate::tracking::BoundingBox;

/// 轮廓检测参数
#[derive(Clone, Debug)]
pub struct ContourConfig {
    pub min_area: f64,
    pub max_area: f64,
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub blur_sigma: f32,  // 约等于 5x5 高斯核
    pub canny_low: f32,
    pub canny_high: f32,
    pub confidence: f32,  // 候选框固定置信度
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            min_area: 1000.0,
            max_area: 50000.0,
            min_aspect: 2.0,
            max_aspect: 5.0,
            blur_sigma: 1.1,
            canny_low: 50.0,
            canny_high: 150.0,
            confidence: 0.8,
        }
    }
}

pub struct ContourPlateDetector {
    config: ContourConfig,
}

impl ContourPlateDetector {
    pub fn new(config: ContourConfig) -> Self {
        Self { config }
    }

    /// 按面积和长宽比过滤单条轮廓
    fn candidate_from_points(&self, points: &[Point<i32>]) -> Option<Candidate> {
        let area = polygon_area(points);
        if area <= self.config.min_area || area >= self.config.max_area {
            return None;
        }

        let bbox = bounding_rect(points)?;
        let aspect = bbox.aspect_ratio();
        if aspect <= self.config.min_aspect || aspect >= self.config.max_aspect {
            return None;
        }

        Some(Candidate::with_confidence(bbox, self.config.confidence))
    }
}

impl Default for ContourPlateDetector {
    fn default() -> Self {
        Self::new(ContourConfig::default())
    }
}

impl PlateDetector for ContourPlateDetector {
    fn name(&self) -> &str {
        "contour"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Candidate>, InferenceError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(InferenceError::Detector("空帧".into()));
        }

        let gray = imageops::grayscale(frame);
        let blurred = gaussian_blur_f32(&gray, self.config.blur_sigma);
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);

        let candidates = find_contours::<i32>(&edges)
            .into_iter()
            // 只保留最外层轮廓
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| self.candidate_from_points(&c.points))
            .collect();

        Ok(candidates)
    }
}

// ========== 工具函数 ==========

/// 多边形面积 (鞋带公式)
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice_area as f64 / 2.0).abs()
}

/// 外接矩形
fn bounding_rect(points: &[Point<i32>]) -> Option<BoundingBox> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;

    Some(BoundingBox::new(
        min_x,
        min_y,
        max_x - min_x + 1,
        max_y - min_y + 1,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_points(x: i32, y: i32, w: i32, h: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ]
    }

    #[test]
    fn test_polygon_area() {
        assert_eq!(polygon_area(&rect_points(0, 0, 100, 30)), 3000.0);
        assert_eq!(polygon_area(&rect_points(0, 0, 100, 30)[..2]), 0.0);
    }

    #[test]
    fn test_plate_shaped_contour_accepted() {
        let detector = ContourPlateDetector::default();
        let candidate = detector
            .candidate_from_points(&rect_points(40, 50, 120, 35))
            .unwrap();
        assert_eq!(candidate.bbox, BoundingBox::new(40, 50, 121, 36));
        assert_eq!(candidate.confidence, Some(0.8));
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let detector = ContourPlateDetector::default();
        // 正方形: 长宽比 1
        assert!(detector.candidate_from_points(&rect_points(0, 0, 60, 60)).is_none());
        // 太小
        assert!(detector.candidate_from_points(&rect_points(0, 0, 30, 10)).is_none());
        // 太大
        assert!(detector.candidate_from_points(&rect_points(0, 0, 600, 200)).is_none());
    }

    #[test]
    fn test_blank_frame_has_no_candidates() {
        let mut detector = ContourPlateDetector::default();
        let frame = Frame::new(320, 240);
        assert!(detector.detect(&frame).unwrap().is_empty());
    }
}
