/// 视频输入系统 (Video Input System)
///
/// 每路流水线独占一个输入流, 逐帧同步读取
/// - StreamSource: 按URL打开视频流
/// - FrameStream:  逐帧读取 / 关闭
/// - FfmpegSource: RTSP/文件解码 (需要 `ffmpeg` 特性)
/// - SimulatedSource: 合成帧 (无摄像头联调)
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;
pub mod simulated;

use image::RgbImage;

pub use crate::error::StreamError;
#[cfg(feature = "ffmpeg")]
pub use decoder::FfmpegSource;
pub use simulated::SimulatedSource;

/// 解码后的一帧 (RGB8)
pub type Frame = RgbImage;

/// 视频流来源
pub trait StreamSource: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn FrameStream>, StreamError>;
}

/// 已打开的视频流 (由单个流水线独占)
pub trait FrameStream: Send {
    /// 阻塞读取下一帧; 流结束或出错时返回 `Err`
    fn read(&mut self) -> Result<Frame, StreamError>;

    /// 释放底层资源, 可重复调用
    fn close(&mut self) {}
}
