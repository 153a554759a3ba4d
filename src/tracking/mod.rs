/// 跟踪系统 (Tracking System)
///
/// 每路视频流独立持有, 负责把逐帧噪声检测变成稳定的车牌对象
/// - Geometry:   质心与距离矩阵
/// - Stabilizer: 多帧文本投票
/// - Tracker:    质心关联 + 生命周期管理
pub mod geometry;
pub mod stabilizer;
pub mod tracker;

pub use geometry::{centroid_of, pairwise_distance, BoundingBox, Centroid};
pub use stabilizer::{most_common, TextHistory, DEFAULT_HISTORY_CAPACITY};
pub use tracker::{CentroidTracker, TrackState, TrackedObject};
