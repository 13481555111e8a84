//! 事件总线（EventBus）协议
//!
//! 外部发布/订阅总线在运行器侧的最小边界：运行器只订阅，
//! 发布由系统其余部分完成。订阅得到的流不借用总线本身，可以交给独立任务持有。
//!
use crate::error::ServiceResult;
use async_trait::async_trait;
use futures_core::stream::BoxStream;

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Send + 'static,
{
    async fn publish(&self, event: E) -> ServiceResult<()>;

    async fn publish_batch(&self, events: Vec<E>) -> ServiceResult<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }

    async fn subscribe(&self) -> BoxStream<'static, ServiceResult<E>>;
}
