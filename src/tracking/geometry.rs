//! 质心几何工具
//! Centroid geometry helpers

use ndarray::Array2;
use serde::{Deserialize, Serialize};

// ========== 数据结构 ==========

/// 检测框 (像素坐标, 左上角 + 宽高)
///
/// 合法的框满足 `width > 0 && height > 0`, 由调用方保证;
/// 检测器输出的畸形框在裁剪阶段被丢弃。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 宽或高不为正
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height <= 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    /// 裁剪到 `frame_w x frame_h` 画面内, 无交集时返回 None
    pub fn clip(&self, frame_w: u32, frame_h: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0) as i64;
        let y1 = self.y.max(0) as i64;
        let x2 = (self.x as i64 + self.width as i64).min(frame_w as i64);
        let y2 = (self.y as i64 + self.height as i64).min(frame_h as i64);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(BoundingBox {
            x: x1 as i32,
            y: y1 as i32,
            width: (x2 - x1) as i32,
            height: (y2 - y1) as i32,
        })
    }
}

/// 质心 (整数像素点)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Centroid {
    pub x: i32,
    pub y: i32,
}

impl Centroid {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// 欧氏距离
    pub fn distance(&self, other: &Centroid) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

// ========== 工具函数 ==========

/// 计算检测框质心: `(x + w/2, y + h/2)`, 整数向下取整
pub fn centroid_of(bbox: &BoundingBox) -> Centroid {
    Centroid {
        x: bbox.x + bbox.width.div_euclid(2),
        y: bbox.y + bbox.height.div_euclid(2),
    }
}

/// 两组质心的距离矩阵, 形状为 `[a.len(), b.len()]`
pub fn pairwise_distance(a: &[Centroid], b: &[Centroid]) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i].distance(&b[j]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_floor_division() {
        let c = centroid_of(&BoundingBox::new(10, 20, 5, 3));
        assert_eq!(c, Centroid::new(12, 21));
    }

    #[test]
    fn test_centroid_inside_box() {
        for x in [-40, -1, 0, 7, 1000] {
            for y in [-3, 0, 11, 480] {
                for w in 1..12 {
                    for h in 1..12 {
                        let bbox = BoundingBox::new(x, y, w, h);
                        let c = centroid_of(&bbox);
                        assert!(c.x >= bbox.x && c.x < bbox.x + bbox.width);
                        assert!(c.y >= bbox.y && c.y < bbox.y + bbox.height);
                    }
                }
            }
        }
    }

    #[test]
    fn test_pairwise_distance() {
        let a = [Centroid::new(10, 10), Centroid::new(0, 0)];
        let b = [Centroid::new(12, 11), Centroid::new(3, 4), Centroid::new(0, 0)];
        let d = pairwise_distance(&a, &b);

        assert_eq!(d.dim(), (2, 3));
        assert!((d[[0, 0]] - 5f64.sqrt()).abs() < 1e-9);
        assert!((d[[1, 1]] - 5.0).abs() < 1e-9);
        assert_eq!(d[[1, 2]], 0.0);
    }

    #[test]
    fn test_pairwise_distance_empty() {
        let a = [Centroid::new(1, 1)];
        assert_eq!(pairwise_distance(&a, &[]).len(), 0);
        assert_eq!(pairwise_distance(&[], &a).len(), 0);
    }

    #[test]
    fn test_clip() {
        let bbox = BoundingBox::new(-5, 90, 20, 20);
        assert_eq!(bbox.clip(100, 100), Some(BoundingBox::new(0, 90, 15, 10)));
        assert_eq!(BoundingBox::new(120, 0, 10, 10).clip(100, 100), None);
        assert_eq!(BoundingBox::new(10, 10, 0, 10).clip(100, 100), None);
    }
}
