/// RTSP主动拉流解码器
/// RTSP active pulling decoder (CPU software decoding)
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};

use super::decode_filter::DecodeFilter;
use super::{Frame, FrameStream, StreamError, StreamSource};

/// 解码线程与流水线之间的帧缓冲
const FRAME_QUEUE: usize = 2;

/// FFmpeg视频源 (RTSP / 本地文件)
#[derive(Clone, Debug)]
pub struct FfmpegSource {
    /// 单帧读取超时
    pub read_timeout: Duration,
}

impl FfmpegSource {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl StreamSource for FfmpegSource {
    fn open(&self, url: &str) -> Result<Box<dyn FrameStream>, StreamError> {
        tracing::info!("🎬 打开视频流: {}", url);

        let (tx, rx) = bounded(FRAME_QUEUE);
        let stop = Arc::new(AtomicBool::new(false));
        let filter = DecodeFilter::new(url, tx, stop.clone());

        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("decode", Box::new(filter));
        let out = create_null_output().add_frame_pipeline(pipe);

        let mut input = Input::new(url);
        if url.starts_with("rtsp://") {
            input = input.set_input_opts(
                [
                    ("rtsp_transport", "tcp"),
                    ("buffer_size", "67108864"),
                    ("rtsp_flags", "prefer_tcp"),
                ]
                .into(),
            );
        }

        let open_err = |reason: String| StreamError::Open {
            url: url.to_string(),
            reason,
        };

        // 统一转为 YUV420P, 解码过滤器只处理这一种格式
        let ctx = FfmpegContext::builder()
            .input(input)
            .filter_descs(["format=yuv420p"].into())
            .output(out)
            .build()
            .map_err(|e| open_err(format!("构建失败: {}", e)))?;

        let sch = ctx
            .start()
            .map_err(|e| open_err(format!("启动失败: {}", e)))?;

        let label = url.to_string();
        thread::Builder::new()
            .name("ffmpeg-decode".into())
            .spawn(move || {
                let _ = sch.wait();
                tracing::debug!("❌ 解码器退出: {}", label);
            })
            .map_err(|e| open_err(format!("解码线程启动失败: {}", e)))?;

        tracing::info!("✅ CPU软件解码启动成功");

        Ok(Box::new(FfmpegStream {
            rx: Some(rx),
            stop,
            read_timeout: self.read_timeout,
        }))
    }
}

struct FfmpegStream {
    rx: Option<Receiver<Frame>>,
    stop: Arc<AtomicBool>,
    read_timeout: Duration,
}

impl FrameStream for FfmpegStream {
    fn read(&mut self) -> Result<Frame, StreamError> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| StreamError::Read("视频流已关闭".into()))?;

        match rx.recv_timeout(self.read_timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(StreamError::Timeout(self.read_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(StreamError::EndOfStream),
        }
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // 丢弃接收端, 阻塞中的解码线程随之退出
        self.rx = None;
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.close();
    }
}
