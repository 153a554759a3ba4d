//! 事件日志 - 多生产者 (各路流水线) → 单消费者线程
//!
//! 消费者保留最近N条事件, 并把 `(时间, 消息)` 转交给可选回调 (例如界面层)。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Sender};

use super::{EventKind, PipelineEvent, StreamLabel};

/// 事件通道容量
const CHANNEL_CAPACITY: usize = 1024;

/// 事件回调: (时间, 消息)
pub type EventCallback = Box<dyn Fn(DateTime<Local>, &str) + Send>;

/// 事件发送端 (每路流水线持有一份)
#[derive(Clone)]
pub struct EventSink {
    tx: Option<Sender<PipelineEvent>>,
}

impl EventSink {
    /// 不连接任何消费者, 只写 tracing 日志
    pub fn detached() -> Self {
        Self { tx: None }
    }

    /// 记录日志并投递事件
    pub fn emit(&self, stream: StreamLabel, kind: EventKind, message: impl Into<String>) {
        let event = PipelineEvent::new(stream, kind, message);
        match kind {
            EventKind::Error => tracing::warn!("{}", event),
            _ => tracing::info!("{}", event),
        }
        if let Some(tx) = &self.tx {
            // 消费者已退出时丢弃
            let _ = tx.send(event);
        }
    }
}

/// 事件日志
pub struct EventLog {
    tx: Option<Sender<PipelineEvent>>,
    recent: Arc<Mutex<VecDeque<PipelineEvent>>>,
    worker: Option<JoinHandle<()>>,
}

impl EventLog {
    pub fn new(capacity: usize, callback: Option<EventCallback>) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded::<PipelineEvent>(CHANNEL_CAPACITY);
        let recent = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));

        let store = recent.clone();
        let worker = thread::Builder::new()
            .name("event-log".into())
            .spawn(move || {
                for event in rx.iter() {
                    if let Some(callback) = &callback {
                        callback(event.timestamp, &event.to_string());
                    }
                    if let Ok(mut recent) = store.lock() {
                        if recent.len() >= capacity {
                            recent.pop_front();
                        }
                        recent.push_back(event);
                    }
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!("❌ 事件日志线程启动失败: {}", e);
                None
            }
        };

        Self {
            tx: worker.as_ref().map(|_| tx),
            recent,
            worker,
        }
    }

    pub fn sink(&self) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
        }
    }

    /// 最近事件 (从旧到新)
    pub fn recent(&self) -> Vec<PipelineEvent> {
        self.recent
            .lock()
            .map(|recent| recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 关闭通道并等待消费者处理完剩余事件
    ///
    /// 所有 `EventSink` 都被丢弃后才会返回。
    pub fn shutdown(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_recent_is_bounded() {
        let mut log = EventLog::new(3, None);
        let sink = log.sink();
        for i in 0..5 {
            sink.emit(StreamLabel::In, EventKind::Detection, format!("事件{}", i));
        }
        drop(sink);
        log.shutdown();

        let recent = log.recent();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "事件2");
        assert_eq!(recent[2].message, "事件4");
    }

    #[test]
    fn test_callback_receives_every_event() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let callback: EventCallback = Box::new(move |_, message| {
            assert!(message.starts_with("[OUT]"));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let mut log = EventLog::new(50, Some(callback));
        let sinks: Vec<EventSink> = (0..4).map(|_| log.sink()).collect();
        let handles: Vec<_> = sinks
            .into_iter()
            .map(|sink| {
                thread::spawn(move || {
                    for _ in 0..10 {
                        sink.emit(StreamLabel::Out, EventKind::Report, "上报成功");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        log.shutdown();

        assert_eq!(count.load(Ordering::SeqCst), 40);
        assert_eq!(log.recent().len(), 40);
    }

    #[test]
    fn test_detached_sink_does_not_block() {
        EventSink::detached().emit(StreamLabel::In, EventKind::Error, "无消费者");
    }
}
