//! 系统配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::pipeline::StreamLabel;

pub const DEFAULT_IN_URL: &str = "rtsp://5.197.60.18:700/chID=1&streamType=main";
pub const DEFAULT_OUT_URL: &str = "rtsp://5.197.60.18:700/chID=2&streamType=main";
pub const DEFAULT_API_URL: &str =
    "https://www.corezoid.com/api/2/json/public/1714853/0a04e6b3904e3b837ae4c6ba4d8c70a9311a90e7";

// ========== 子配置 ==========

/// 跟踪器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_disappeared: u32,     // 最大连续丢失轮数
    pub max_match_distance: f64,  // 质心匹配最大距离(像素)
    pub history_capacity: usize,  // 文本历史长度
    pub age_all_unmatched: bool,  // 检测多于对象时也计丢失
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_disappeared: 30,
            max_match_distance: 50.0,
            history_capacity: 5,
            age_all_unmatched: false,
        }
    }
}

/// 检测适配参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub min_text_confidence: f32, // OCR置信度下限
    pub keep_unread_boxes: bool,  // 未识别的框仍以空文本上报位置
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            min_text_confidence: 0.5,
            keep_unread_boxes: false,
        }
    }
}

/// 时间戳格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampStyle {
    /// "YYYY-MM-DD HH:MM:SS"
    DateTime,
    /// 秒级时间戳 (浮点)
    Epoch,
}

/// 上报参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub timestamp_style: TimestampStyle,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 5,
            timestamp_style: TimestampStyle::DateTime,
        }
    }
}

impl ReporterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 单路流水线配置 (运行期间不可变)
#[derive(Clone, Debug, PartialEq)]
pub struct StreamConfig {
    pub url: String,
    pub sample_interval: u32,
    pub tracker: TrackerConfig,
    pub adapter: AdapterConfig,
    pub read_timeout: Duration,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sample_interval: 30,
            tracker: TrackerConfig::default(),
            adapter: AdapterConfig::default(),
            read_timeout: Duration::from_secs(10),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("视频流地址为空".into()));
        }
        if self.sample_interval < 1 {
            return Err(ConfigError::Invalid("sample_interval 必须 >= 1".into()));
        }
        validate_tracker(&self.tracker)?;
        validate_adapter(&self.adapter)
    }
}

fn validate_tracker(tracker: &TrackerConfig) -> Result<(), ConfigError> {
    if !(tracker.max_match_distance > 0.0) {
        return Err(ConfigError::Invalid("max_match_distance 必须 > 0".into()));
    }
    if tracker.history_capacity < 1 {
        return Err(ConfigError::Invalid("history_capacity 必须 >= 1".into()));
    }
    Ok(())
}

fn validate_adapter(adapter: &AdapterConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&adapter.min_text_confidence) {
        return Err(ConfigError::Invalid(
            "min_text_confidence 必须在 [0, 1] 内".into(),
        ));
    }
    Ok(())
}

// ========== 总配置 ==========

/// 应用配置 (JSON文件)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // === 视频流 ===
    pub in_url: String,
    pub out_url: String,
    pub sample_interval: u32,   // 每N帧推理一次
    pub read_timeout_secs: u64, // 读帧超时

    // === 各子系统 ===
    pub tracker: TrackerConfig,
    pub adapter: AdapterConfig,
    pub reporter: ReporterConfig,

    // === 日志 ===
    pub event_log_capacity: usize, // 保留最近N条事件
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            in_url: DEFAULT_IN_URL.to_string(),
            out_url: DEFAULT_OUT_URL.to_string(),
            sample_interval: 30,
            read_timeout_secs: 10,
            tracker: TrackerConfig::default(),
            adapter: AdapterConfig::default(),
            reporter: ReporterConfig::default(),
            event_log_capacity: 50,
        }
    }
}

impl AppConfig {
    /// 从JSON文件加载配置; 文件不存在时写入默认配置, 解析失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 严格加载: 读取或解析失败均返回错误
    pub fn load_strict(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval < 1 {
            return Err(ConfigError::Invalid("sample_interval 必须 >= 1".into()));
        }
        if self.reporter.timeout_secs == 0 {
            return Err(ConfigError::Invalid("reporter.timeout_secs 必须 > 0".into()));
        }
        validate_tracker(&self.tracker)?;
        validate_adapter(&self.adapter)
    }

    pub fn url_for(&self, label: StreamLabel) -> &str {
        match label {
            StreamLabel::In => &self.in_url,
            StreamLabel::Out => &self.out_url,
        }
    }

    /// 组装单路流水线配置
    pub fn stream_config(&self, url: &str) -> StreamConfig {
        StreamConfig {
            url: url.to_string(),
            sample_interval: self.sample_interval,
            tracker: self.tracker.clone(),
            adapter: self.adapter.clone(),
            read_timeout: Duration::from_secs(self.read_timeout_secs.max(1)),
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前配置:");
        info!("  IN  流: {}", self.in_url);
        info!("  OUT 流: {}", self.out_url);
        info!("  采样间隔: 每{}帧", self.sample_interval);
        info!(
            "  跟踪: 最大丢失{}轮 | 匹配距离{:.1}px | 文本历史{}",
            self.tracker.max_disappeared,
            self.tracker.max_match_distance,
            self.tracker.history_capacity
        );
        info!("  OCR置信度下限: {:.2}", self.adapter.min_text_confidence);
        info!(
            "  上报: {} (超时{}s)",
            if self.reporter.api_url.is_empty() {
                "dry-run"
            } else {
                self.reporter.api_url.as_str()
            },
            self.reporter.timeout_secs
        );
    }
}
