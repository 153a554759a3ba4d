//! 质心跟踪器 (最近质心贪心关联 + 文本投票)
//! Centroid tracker with greedy nearest-centroid association

use std::collections::BTreeMap;

use tracing::debug;

use super::geometry::{centroid_of, pairwise_distance, Centroid};
use super::stabilizer::TextHistory;
use crate::config::TrackerConfig;
use crate::detection::DetectionRecord;

// ========== 公共数据结构 ==========

/// 跟踪对象状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// 本轮匹配或刚注册
    Active,
    /// 连续丢失, 但未超过阈值
    Stale,
}

/// 跟踪对象 (仅由跟踪器持有)
#[derive(Clone, Debug)]
pub struct TrackedObject {
    /// 唯一跟踪ID, 注销后不复用
    pub id: u64,

    /// 最近一次位置
    pub centroid: Centroid,

    /// 连续丢失轮数
    pub disappeared_count: u32,

    /// 最近识别文本
    pub text_history: TextHistory,

    /// 投票后的稳定文本
    pub stabilized_text: String,

    /// 最近一次匹配检测的置信度
    pub confidence: f32,
}

impl TrackedObject {
    fn new(id: u64, centroid: Centroid, record: &DetectionRecord, capacity: usize) -> Self {
        let mut text_history = TextHistory::new(capacity);
        text_history.push(&record.text);
        let stabilized_text = text_history.most_common();

        Self {
            id,
            centroid,
            disappeared_count: 0,
            text_history,
            stabilized_text,
            confidence: record.confidence,
        }
    }

    /// 匹配成功: 更新位置, 清零丢失计数, 追加文本并重新投票
    fn observe(&mut self, centroid: Centroid, record: &DetectionRecord) {
        self.centroid = centroid;
        self.disappeared_count = 0;
        self.confidence = record.confidence;
        if !record.text.is_empty() {
            self.text_history.push(&record.text);
            self.stabilized_text = self.text_history.most_common();
        }
    }

    pub fn state(&self) -> TrackState {
        if self.disappeared_count == 0 {
            TrackState::Active
        } else {
            TrackState::Stale
        }
    }
}

// ========== 跟踪器 ==========

/// 质心跟踪器
///
/// 每路视频流持有一个实例, `update` 是唯一的修改入口,
/// 同一实例不允许并发调用。
pub struct CentroidTracker {
    /// 下一个分配的ID
    next_id: u64,

    /// 当前持有的对象 (按ID升序迭代)
    objects: BTreeMap<u64, TrackedObject>,

    config: TrackerConfig,
}

impl CentroidTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            next_id: 0,
            objects: BTreeMap::new(),
            config,
        }
    }

    /// 更新跟踪
    ///
    /// # 参数
    /// - `detections`: 当前采样帧的全部检测记录
    ///
    /// # 返回
    /// 当前持有对象的 ID → 质心
    pub fn update(&mut self, detections: &[DetectionRecord]) -> BTreeMap<u64, Centroid> {
        // 1. 无检测: 所有对象丢失一轮
        if detections.is_empty() {
            let ids: Vec<u64> = self.objects.keys().copied().collect();
            for id in ids {
                self.mark_lost(id);
            }
            return self.centroids();
        }

        // 2. 检测质心
        let input_centroids: Vec<Centroid> =
            detections.iter().map(|d| centroid_of(&d.bbox)).collect();

        // 3. 当前无对象: 全部注册
        if self.objects.is_empty() {
            for (centroid, record) in input_centroids.iter().zip(detections) {
                self.register(*centroid, record);
            }
            return self.centroids();
        }

        // 4. 贪心最近邻匹配
        let object_ids: Vec<u64> = self.objects.keys().copied().collect();
        let object_centroids: Vec<Centroid> =
            self.objects.values().map(|o| o.centroid).collect();
        let distances = pairwise_distance(&object_centroids, &input_centroids);

        // 每行最小值及其列 (并列取第一个)
        let mut row_best: Vec<(usize, usize, f64)> = distances
            .outer_iter()
            .enumerate()
            .map(|(row, dists)| {
                let mut best_col = 0;
                let mut best = f64::INFINITY;
                for (col, &d) in dists.iter().enumerate() {
                    if d < best {
                        best = d;
                        best_col = col;
                    }
                }
                (row, best_col, best)
            })
            .collect();
        // 稳定排序: 最小距离升序, 相同距离保持行序
        row_best.sort_by(|a, b| a.2.total_cmp(&b.2));

        let mut used_rows = vec![false; object_ids.len()];
        let mut used_cols = vec![false; input_centroids.len()];

        for (row, col, dist) in row_best {
            if used_rows[row] || used_cols[col] || dist > self.config.max_match_distance {
                continue;
            }

            if let Some(object) = self.objects.get_mut(&object_ids[row]) {
                object.observe(input_centroids[col], &detections[col]);
            }
            used_rows[row] = true;
            used_cols[col] = true;
        }

        // 5. 未匹配的旧对象: 仅当旧对象数 >= 新检测数时计为丢失
        if self.config.age_all_unmatched || object_ids.len() >= input_centroids.len() {
            for (row, &used) in used_rows.iter().enumerate() {
                if !used {
                    self.mark_lost(object_ids[row]);
                }
            }
        }

        // 6. 未匹配的新检测 → 注册
        for (col, &used) in used_cols.iter().enumerate() {
            if !used {
                self.register(input_centroids[col], &detections[col]);
            }
        }

        // 7. 当前持有的全部对象
        self.centroids()
    }

    /// 注册新对象
    pub fn register(&mut self, centroid: Centroid, record: &DetectionRecord) -> u64 {
        let id = self.next_id;
        let object = TrackedObject::new(id, centroid, record, self.config.history_capacity);
        debug!(
            "🆕 注册对象 #{} @ ({}, {}) 文本={:?}",
            id, centroid.x, centroid.y, object.stabilized_text
        );
        self.objects.insert(id, object);
        self.next_id += 1;
        id
    }

    /// 注销对象
    pub fn deregister(&mut self, id: u64) -> Option<TrackedObject> {
        let removed = self.objects.remove(&id);
        if let Some(object) = &removed {
            debug!(
                "🗑️ 注销对象 #{} (丢失{}轮, 文本={:?})",
                id, object.disappeared_count, object.stabilized_text
            );
        }
        removed
    }

    fn mark_lost(&mut self, id: u64) {
        let evict = match self.objects.get_mut(&id) {
            Some(object) => {
                object.disappeared_count = object.disappeared_count.saturating_add(1);
                object.disappeared_count > self.config.max_disappeared
            }
            None => false,
        };
        if evict {
            self.deregister(id);
        }
    }

    fn centroids(&self) -> BTreeMap<u64, Centroid> {
        self.objects
            .iter()
            .map(|(&id, object)| (id, object.centroid))
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    /// 按ID升序遍历当前对象 (Active + Stale)
    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }

    /// 当前跟踪数量
    pub fn track_count(&self) -> usize {
        self.objects.len()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// 获取跟踪统计信息
    pub fn stats(&self) -> String {
        format!(
            "跟踪: {} 个 | 总ID: {}",
            self.objects.len(),
            self.next_id
        )
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
