//! 错误类型
//! Error taxonomy shared by inputs, inference, configuration and control

use std::time::Duration;

use thiserror::Error;

use crate::pipeline::StreamLabel;

/// 视频流错误 (打开失败 / 读帧失败)
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("无法打开视频流 {url}: {reason}")]
    Open { url: String, reason: String },

    #[error("读帧失败: {0}")]
    Read(String),

    #[error("视频流结束")]
    EndOfStream,

    #[error("读帧超时 ({0:?})")]
    Timeout(Duration),
}

/// 推理错误 (检测器 / 识别器)
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("检测器错误: {0}")]
    Detector(String),

    #[error("识别器错误: {0}")]
    Recognizer(String),

    #[error("推理线程panic: {0}")]
    Panicked(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置失败 {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("解析配置失败: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 控制面错误 (start / stop)
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0} 流已在运行")]
    AlreadyRunning(StreamLabel),

    #[error("{0} 流未运行")]
    NotRunning(StreamLabel),

    #[error("未知的流标签: {0}")]
    UnknownStream(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("无法启动流水线线程: {0}")]
    Spawn(#[from] std::io::Error),
}
