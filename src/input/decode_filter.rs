/// FFmpeg解码过滤器模块
/// FFmpeg decode filter module
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame as AvFrame};

use super::Frame;

/// 最大允许分辨率
const MAX_DIMENSION: u32 = 4096;

/// FFmpeg解码过滤器: 视频流 → RGB帧 → 流水线通道
#[derive(Clone)]
pub struct DecodeFilter {
    label: String,
    tx: Sender<Frame>,
    stop: Arc<AtomicBool>,
    count: usize,
    last: Instant,
    dropped_frames: usize,
    total_frames: usize,
}

impl DecodeFilter {
    pub fn new(label: impl Into<String>, tx: Sender<Frame>, stop: Arc<AtomicBool>) -> Self {
        Self {
            label: label.into(),
            tx,
            stop,
            count: 0,
            last: Instant::now(),
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: std::fmt::Arguments<'_>) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            tracing::warn!("⚠️ [{}] 丢弃帧 #{}: {}", self.label, self.total_frames, reason);
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        tracing::info!("✅ [{}] 解码线程启动", self.label);
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: AvFrame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<AvFrame>, String> {
        // 流水线已关闭则停止解码
        if self.stop.load(Ordering::Relaxed) {
            tracing::info!("🛑 [{}] 视频流已关闭, 停止解码", self.label);
            return Err("stream closed".to_string());
        }

        self.total_frames += 1;

        // 基本检查：空帧或损坏帧
        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            self.drop_frame(format_args!("空帧/损坏帧"));
            return Ok(None);
        }

        let rgb = unsafe {
            let raw = &*frame.as_ptr();
            let w = raw.width as u32;
            let h = raw.height as u32;

            if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
                self.drop_frame(format_args!("非法分辨率 {}x{}", w, h));
                return Ok(None);
            }

            // 只丢弃严重错误的帧 (缺少参考帧、无效比特流)
            if raw.decode_error_flags & 0x03 != 0 {
                self.drop_frame(format_args!("解码错误标志=0x{:02x}", raw.decode_error_flags));
                return Ok(None);
            }

            let planes = YuvPlanes {
                y: raw.data[0],
                u: raw.data[1],
                v: raw.data[2],
                y_stride: raw.linesize[0].max(0) as usize,
                uv_stride: raw.linesize[1].max(0) as usize,
            };

            if planes.y.is_null() || planes.u.is_null() || planes.v.is_null() {
                self.drop_frame(format_args!("YUV指针为空"));
                return Ok(None);
            }
            if planes.y_stride < w as usize || planes.uv_stride < (w as usize).div_ceil(2) {
                self.drop_frame(format_args!(
                    "步长异常 y_stride={} uv_stride={}",
                    planes.y_stride, planes.uv_stride
                ));
                return Ok(None);
            }

            yuv420p_to_rgb(&planes, w, h)
        };

        self.count += 1;

        // 每秒打印一次解码统计
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            let drop_rate = self.dropped_frames as f64 / self.total_frames as f64 * 100.0;
            tracing::debug!(
                "📺 [{}] 解码统计: {:.1}fps | 总帧{} | 丢弃{} ({:.1}%)",
                self.label,
                self.count as f64 / elapsed,
                self.total_frames,
                self.dropped_frames,
                drop_rate
            );
            self.last = Instant::now();
            self.count = 0;
        }

        // 阻塞发送: 流水线处理慢时解码随之等待
        if self.tx.send(rgb).is_err() {
            return Err("stream closed".to_string());
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        tracing::info!("✅ [{}] 解码线程退出", self.label);
    }
}

struct YuvPlanes {
    y: *const u8,
    u: *const u8,
    v: *const u8,
    y_stride: usize,
    uv_stride: usize,
}

/// YUV420P → RGB (BT.601, 系数乘以128避免浮点)
///
/// # Safety
/// 各平面指针必须覆盖 `height` 行 × 对应步长
unsafe fn yuv420p_to_rgb(planes: &YuvPlanes, width: u32, height: u32) -> Frame {
    let mut buffer = vec![0u8; (width * height * 3) as usize];
    let mut out_idx = 0;
    for row in 0..height as usize {
        let y_row = row * planes.y_stride;
        let uv_row = (row >> 1) * planes.uv_stride;

        for x in 0..width as usize {
            let y_val = *planes.y.add(y_row + x) as i32;
            let u_val = *planes.u.add(uv_row + (x >> 1)) as i32 - 128;
            let v_val = *planes.v.add(uv_row + (x >> 1)) as i32 - 128;

            let (r, g, b) = yuv_to_rgb(y_val, u_val, v_val);
            buffer[out_idx] = r;
            buffer[out_idx + 1] = g;
            buffer[out_idx + 2] = b;
            out_idx += 3;
        }
    }
    // 缓冲区长度与尺寸一致, from_raw 不会失败
    Frame::from_raw(width, height, buffer).unwrap_or_else(|| Frame::new(width, height))
}

#[inline]
fn yuv_to_rgb(y: i32, u: i32, v: i32) -> (u8, u8, u8) {
    let r = (y + ((v * 179) >> 7)).clamp(0, 255) as u8;
    let g = (y - ((u * 44) >> 7) - ((v * 91) >> 7)).clamp(0, 255) as u8;
    let b = (y + ((u * 227) >> 7)).clamp(0, 255) as u8;
    (r, g, b)
}
