//! 模拟视频源 - 合成帧, 按固定帧率输出

use std::thread;
use std::time::{Duration, Instant};

use image::Rgb;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use super::{Frame, FrameStream, StreamError, StreamSource};
use crate::tracking::BoundingBox;

/// 模拟视频源
#[derive(Clone, Debug)]
pub struct SimulatedSource {
    pub width: u32,
    pub height: u32,
    /// 为 None 时不限速
    pub fps: Option<u32>,
    /// 为 None 时无限输出
    pub max_frames: Option<u64>,
    /// 画面中绘制的白色车牌区域
    pub plate: Option<BoundingBox>,
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: Some(25),
            max_frames: None,
            plate: Some(BoundingBox::new(260, 300, 120, 36)),
        }
    }
}

impl StreamSource for SimulatedSource {
    fn open(&self, url: &str) -> Result<Box<dyn FrameStream>, StreamError> {
        if url.trim().is_empty() {
            return Err(StreamError::Open {
                url: url.to_string(),
                reason: "地址为空".into(),
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(StreamError::Open {
                url: url.to_string(),
                reason: format!("非法分辨率 {}x{}", self.width, self.height),
            });
        }

        Ok(Box::new(SimulatedStream {
            template: self.render_template(),
            fps_wait: self
                .fps
                .filter(|&fps| fps > 0)
                .map(|fps| Duration::from_millis(1000 / fps as u64)),
            fps_control: Instant::now(),
            max_frames: self.max_frames,
            produced: 0,
            closed: false,
        }))
    }
}

impl SimulatedSource {
    fn render_template(&self) -> Frame {
        let mut frame = Frame::from_pixel(self.width, self.height, Rgb([64, 64, 64]));
        if let Some(plate) = self.plate.and_then(|p| p.clip(self.width, self.height)) {
            draw_filled_rect_mut(
                &mut frame,
                Rect::at(plate.x, plate.y).of_size(plate.width as u32, plate.height as u32),
                Rgb([255, 255, 255]),
            );
        }
        frame
    }
}

struct SimulatedStream {
    template: Frame,
    fps_wait: Option<Duration>,
    fps_control: Instant,
    max_frames: Option<u64>,
    produced: u64,
    closed: bool,
}

impl FrameStream for SimulatedStream {
    fn read(&mut self) -> Result<Frame, StreamError> {
        if self.closed {
            return Err(StreamError::Read("视频流已关闭".into()));
        }
        if self.max_frames.is_some_and(|max| self.produced >= max) {
            return Err(StreamError::EndOfStream);
        }

        // 帧率控制
        if let Some(wait) = self.fps_wait {
            let elapsed = self.fps_control.elapsed();
            if wait > elapsed {
                thread::sleep(wait - elapsed);
            }
            self.fps_control = Instant::now();
        }

        self.produced += 1;
        Ok(self.template.clone())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
