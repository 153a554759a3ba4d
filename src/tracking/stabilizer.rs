//! 车牌文本稳定器 (多帧投票)
//! Text stabilizer: bounded OCR history reduced by majority vote

use std::collections::VecDeque;

/// 默认历史长度
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// 最近识别文本的有界队列 (FIFO, 重复项参与计数)
#[derive(Clone, Debug, PartialEq)]
pub struct TextHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl TextHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// 追加文本 (空串忽略), 超出容量时淘汰最旧的一条
    pub fn push(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.entries.push_back(text.to_string());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// 出现次数最多的文本; 并列时取从左到右扫描遇到的第一个
    pub fn most_common(&self) -> String {
        most_common(self.entries.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 从旧到新
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl Default for TextHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// 多数投票: 稳定的从左到右 argmax, 空输入返回空串
pub fn most_common<'a, I>(items: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    // (文本, 计数) 按首次出现顺序排列
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(text, _)| *text == item) {
            Some((_, n)) => *n += 1,
            None => counts.push((item, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for &(text, n) in &counts {
        if best.map_or(true, |(_, best_n)| n > best_n) {
            best = Some((text, n));
        }
    }

    best.map(|(text, _)| text.to_string()).unwrap_or_default()
}
