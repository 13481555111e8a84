//! 提交流与投递流
//!
//! 真实队列与测试替身对外暴露的统一协议：
//! - `AlarmSender`：可克隆的提交端，全部丢弃即请求关闭；
//! - `AlarmReceiver`：唯一的投递端，同时实现 `Stream`。
//!
use crate::error::{AlarmError, AlarmResult};
use crate::event::TimedEvent;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// 提交端
#[derive(Debug)]
pub struct AlarmSender<P> {
    tx: mpsc::Sender<TimedEvent<P>>,
}

impl<P> Clone for AlarmSender<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P: Send> AlarmSender<P> {
    pub(crate) fn new(tx: mpsc::Sender<TimedEvent<P>>) -> Self {
        Self { tx }
    }

    /// 提交一个在 `fire_at` 之后重投递的载荷；缓冲区满时等待
    pub async fn submit(&self, fire_at: DateTime<Utc>, payload: P) -> AlarmResult<()> {
        self.submit_event(TimedEvent::new(fire_at, payload)).await
    }

    pub async fn submit_event(&self, event: TimedEvent<P>) -> AlarmResult<()> {
        self.tx.send(event).await.map_err(|_| AlarmError::Closed)
    }

    /// 调度任务是否已不再接受提交
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 投递端
#[derive(Debug)]
pub struct AlarmReceiver<P> {
    rx: mpsc::Receiver<TimedEvent<P>>,
}

impl<P> AlarmReceiver<P> {
    pub(crate) fn new(rx: mpsc::Receiver<TimedEvent<P>>) -> Self {
        Self { rx }
    }

    /// 等待下一个到期事件；队列关闭且排空后返回 `None`
    pub async fn recv(&mut self) -> Option<TimedEvent<P>> {
        self.rx.recv().await
    }
}

impl<P> Stream for AlarmReceiver<P> {
    type Item = TimedEvent<P>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
