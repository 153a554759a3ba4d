//! 车牌上报 - 把稳定后的车牌事件POST到采集端
//!
//! 每个事件只尝试一次, 结果分为 送达 / 被拒 / 传输失败 三类, 由调用方记录日志。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::config::{ReporterConfig, TimestampStyle};
use crate::pipeline::StreamLabel;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ========== 事件 ==========

/// 一次上报的车牌事件
#[derive(Clone, Debug, PartialEq)]
pub struct PlateEvent {
    pub plate_text: String,
    pub stream_label: StreamLabel,
    pub confidence: f32,
    pub track_id: u64,
    pub timestamp: DateTime<Local>,
}

impl PlateEvent {
    pub fn new(
        plate_text: impl Into<String>,
        stream_label: StreamLabel,
        confidence: f32,
        track_id: u64,
    ) -> Self {
        Self {
            plate_text: plate_text.into(),
            stream_label,
            confidence,
            track_id,
            timestamp: Local::now(),
        }
    }
}

/// 采集端时间戳: 秒级时间戳 或 "YYYY-MM-DD HH:MM:SS"
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Epoch(f64),
    Formatted(String),
}

impl WireTimestamp {
    pub fn from_datetime(ts: &DateTime<Local>, style: TimestampStyle) -> Self {
        match style {
            TimestampStyle::DateTime => Self::Formatted(ts.format(DATETIME_FORMAT).to_string()),
            TimestampStyle::Epoch => Self::Epoch(ts.timestamp_millis() as f64 / 1000.0),
        }
    }

    /// 解析为本地时间; 格式不合法时返回 None
    pub fn to_datetime(&self) -> Option<DateTime<Local>> {
        match self {
            Self::Epoch(secs) => {
                let millis = (secs * 1000.0).round() as i64;
                Local.timestamp_millis_opt(millis).single()
            }
            Self::Formatted(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).earliest()),
        }
    }
}

/// 采集端JSON请求体
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatePayload {
    pub plate_number: String,
    #[serde(alias = "stream")]
    pub stream_type: String,
    pub timestamp: WireTimestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<u64>,
}

impl PlatePayload {
    pub fn from_event(event: &PlateEvent, style: TimestampStyle) -> Self {
        Self {
            plate_number: event.plate_text.clone(),
            stream_type: event.stream_label.as_str().to_string(),
            timestamp: WireTimestamp::from_datetime(&event.timestamp, style),
            confidence: Some(event.confidence),
            track_id: Some(event.track_id),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ========== 上报器 ==========

/// 上报结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    Delivered,
    Rejected(u16),
    TransportFailed(String),
}

impl ReportOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// 上报接口 (两路流水线共享, 需可并发调用)
pub trait Reporter: Send + Sync {
    fn name(&self) -> &str {
        "reporter"
    }

    fn report(&self, event: &PlateEvent) -> ReportOutcome;
}

/// HTTP上报 (JSON POST, 单次尝试, 超时受限)
pub struct HttpReporter {
    agent: ureq::Agent,
    api_url: String,
    style: TimestampStyle,
}

impl HttpReporter {
    pub fn new(api_url: impl Into<String>, timeout: Duration, style: TimestampStyle) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            api_url: api_url.into(),
            style,
        }
    }

    pub fn from_config(config: &ReporterConfig) -> Self {
        Self::new(config.api_url.clone(), config.timeout(), config.timestamp_style)
    }
}

impl Reporter for HttpReporter {
    fn name(&self) -> &str {
        "http"
    }

    fn report(&self, event: &PlateEvent) -> ReportOutcome {
        let body = match PlatePayload::from_event(event, self.style).to_json() {
            Ok(body) => body,
            Err(e) => return ReportOutcome::TransportFailed(format!("序列化失败: {}", e)),
        };

        let result = self
            .agent
            .post(&self.api_url)
            .set("Content-Type", "application/json")
            .send_string(&body);

        match result {
            Ok(resp) if resp.status() == 200 => ReportOutcome::Delivered,
            Ok(resp) => ReportOutcome::Rejected(resp.status()),
            Err(ureq::Error::Status(code, _)) => ReportOutcome::Rejected(code),
            Err(ureq::Error::Transport(t)) => ReportOutcome::TransportFailed(t.to_string()),
        }
    }
}

/// 只打印不发送 (dry-run)
pub struct LogReporter {
    style: TimestampStyle,
}

impl LogReporter {
    pub fn new(style: TimestampStyle) -> Self {
        Self { style }
    }
}

impl Reporter for LogReporter {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn report(&self, event: &PlateEvent) -> ReportOutcome {
        match PlatePayload::from_event(event, self.style).to_json() {
            Ok(body) => {
                tracing::info!("📝 [dry-run] {}", body);
                ReportOutcome::Delivered
            }
            Err(e) => ReportOutcome::TransportFailed(format!("序列化失败: {}", e)),
        }
    }
}

/// 按配置选择上报器: 地址为空或 dry-run 时只打印
pub fn build_reporter(config: &ReporterConfig, dry_run: bool) -> Arc<dyn Reporter> {
    if dry_run || config.api_url.trim().is_empty() {
        Arc::new(LogReporter::new(config.timestamp_style))
    } else {
        Arc::new(HttpReporter::from_config(config))
    }
}
