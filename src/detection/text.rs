//! OCR文本清洗

use once_cell::sync::Lazy;
use regex::Regex;

/// 车牌允许的字符: 大写字母 + 数字
static NON_PLATE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Z0-9]").expect("静态正则"));

/// 转大写并去除空白/标点, 结果可能为空
pub fn normalize_plate_text(raw: &str) -> String {
    NON_PLATE_CHARS
        .replace_all(&raw.trim().to_uppercase(), "")
        .into_owned()
}
