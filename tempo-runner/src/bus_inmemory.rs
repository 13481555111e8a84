//! 进程内事件总线
//!
//! 以 `tokio::sync::broadcast` 承载 `EventBus`，每个订阅者各自持有一份事件副本。
//! 适合单进程部署、测试与 demo；跨进程场景应接入真正的消息系统。
//!
//! 没有订阅者时发布的事件直接丢弃；订阅者落后超过容量时，流中会出现一次
//! `ServiceError::EventBus`，随后从仍在缓冲区内的事件继续。

use crate::bus::EventBus;
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

#[derive(Clone, Debug)]
pub struct InMemoryEventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E> InMemoryEventBus<E>
where
    E: Clone + Send + 'static,
{
    /// `capacity` 为每个订阅者可落后的最大事件数
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryEventBus<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn publish(&self, event: E) -> ServiceResult<()> {
        // 无订阅者时 send 返回 Err，事件本就无人关心
        let _ = self.tx.send(event);
        Ok(())
    }

    async fn subscribe(&self) -> BoxStream<'static, ServiceResult<E>> {
        let rx = self.tx.subscribe();
        let stream =
            BroadcastStream::new(rx).map(|r| r.map_err(|e| ServiceError::event_bus(e.to_string())));
        Box::pin(stream)
    }
}
