//! 模拟检测 (无模型联调用)
//!
//! 固定位置附近抖动的车牌框 + 从样例车牌中随机读取,
//! 偶尔制造一个错字让文本投票有事可做。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::types::{Candidate, Recognition};
use super::{PlateDetector, PlateRecognizer};
use crate::error::InferenceError;
use crate::input::Frame;
use crate::tracking::BoundingBox;

/// 样例车牌
pub const SAMPLE_PLATES: [&str; 10] = [
    "10AA123", "20BB456", "30CC789", "40DD012", "50EE345", "60FF678", "70GG901", "80HH234",
    "90II567", "99JJ890",
];

/// OCR常见混淆字符
const CONFUSIONS: [(char, char); 6] = [
    ('0', 'O'),
    ('1', 'I'),
    ('8', 'B'),
    ('5', 'S'),
    ('2', 'Z'),
    ('6', 'G'),
];

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

// ========== 检测器 ==========

pub struct SimulatedDetector {
    anchor: BoundingBox,
    jitter: i32,
    hit_rate: f64,
    rng: StdRng,
}

impl SimulatedDetector {
    /// `hit_rate`: 每帧出现车牌的概率
    pub fn new(anchor: BoundingBox, jitter: i32, hit_rate: f64, seed: Option<u64>) -> Self {
        Self {
            anchor,
            jitter: jitter.max(0),
            hit_rate: hit_rate.clamp(0.0, 1.0),
            rng: make_rng(seed),
        }
    }
}

impl Default for SimulatedDetector {
    fn default() -> Self {
        Self::new(BoundingBox::new(260, 300, 120, 36), 4, 0.9, None)
    }
}

impl PlateDetector for SimulatedDetector {
    fn name(&self) -> &str {
        "simulated"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Candidate>, InferenceError> {
        if !self.rng.gen_bool(self.hit_rate) {
            return Ok(Vec::new());
        }
        let dx = self.rng.gen_range(-self.jitter..=self.jitter);
        let dy = self.rng.gen_range(-self.jitter..=self.jitter);
        let bbox = BoundingBox::new(
            self.anchor.x + dx,
            self.anchor.y + dy,
            self.anchor.width,
            self.anchor.height,
        );
        let confidence = self.rng.gen_range(0.6..0.99);
        Ok(vec![Candidate::with_confidence(bbox, confidence)])
    }
}

// ========== 识别器 ==========

pub struct SimulatedRecognizer {
    plates: Vec<String>,
    current: usize,
    reads: u32,
    /// 同一车牌连续读取次数, 之后换下一辆车
    reads_per_plate: u32,
    noise_rate: f64,
    rng: StdRng,
}

impl SimulatedRecognizer {
    pub fn new(reads_per_plate: u32, noise_rate: f64, seed: Option<u64>) -> Self {
        let mut rng = make_rng(seed);
        let current = rng.gen_range(0..SAMPLE_PLATES.len());
        Self {
            plates: SAMPLE_PLATES.iter().map(|p| p.to_string()).collect(),
            current,
            reads: 0,
            reads_per_plate: reads_per_plate.max(1),
            noise_rate: noise_rate.clamp(0.0, 1.0),
            rng,
        }
    }

    /// 把一个字符替换为易混淆字符
    fn corrupt(&mut self, plate: &str) -> String {
        let mut chars: Vec<char> = plate.chars().collect();
        let positions: Vec<usize> = chars
            .iter()
            .enumerate()
            .filter(|(_, c)| CONFUSIONS.iter().any(|(a, _)| a == *c))
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return plate.to_string();
        }
        let i = positions[self.rng.gen_range(0..positions.len())];
        if let Some((_, b)) = CONFUSIONS.iter().find(|(a, _)| *a == chars[i]) {
            chars[i] = *b;
        }
        chars.into_iter().collect()
    }
}

impl Default for SimulatedRecognizer {
    fn default() -> Self {
        Self::new(5, 0.2, None)
    }
}

impl PlateRecognizer for SimulatedRecognizer {
    fn name(&self) -> &str {
        "simulated"
    }

    fn recognize(&mut self, _region: &Frame) -> Result<Option<Recognition>, InferenceError> {
        if self.reads >= self.reads_per_plate {
            self.reads = 0;
            self.current = (self.current + 1) % self.plates.len();
        }
        self.reads += 1;

        let plate = self.plates[self.current].clone();
        let text = if self.rng.gen_bool(self.noise_rate) {
            self.corrupt(&plate)
        } else {
            plate
        };
        let confidence = self.rng.gen_range(0.7..0.95);
        Ok(Some(Recognition::new(text, confidence)))
    }
}
