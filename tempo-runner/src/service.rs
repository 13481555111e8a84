//! 服务协议（Service）
//!
//! 每个领域（例如“启动待开始的条目”“推进轮次”“关闭过期条目”）各自实现一个 `Service`，
//! 运行器只通过以下接口与之交互：
//! - `process_one`：对单个 id 执行领域操作；
//! - `check_all`：有界的到期条目流，按 `due_at` 升序；
//! - `check_one`：单个 id 的下一次到期时间；
//! - `interval`：两次全量扫描之间的最长间隔；
//! - `span`：日志上下文。
//!
use crate::error::ServiceResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::stream::BoxStream;
use std::time::Duration;
use tracing::Span;

/// 到期条目描述：`due_at` 为 `None` 表示该 id 当前无事可做
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DueItem {
    pub id: u32,
    pub due_at: Option<DateTime<Utc>>,
}

impl DueItem {
    pub fn new(id: u32, due_at: DateTime<Utc>) -> Self {
        Self {
            id,
            due_at: Some(due_at),
        }
    }

    /// 是否已逾期（到期时间不晚于 `now`）
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_at.is_some_and(|due_at| due_at <= now)
    }
}

/// `check_all` 返回的到期条目流；遇到错误或耗尽时结束
pub type DueStream = BoxStream<'static, ServiceResult<DueItem>>;

#[async_trait]
pub trait Service: Send + Sync {
    /// 服务名称（用于日志）
    fn name(&self) -> &str;

    /// 处理单个 id；尚未就绪时返回 `ServiceError::NothingToDoYet`
    async fn process_one(&self, id: u32) -> ServiceResult<()>;

    /// 返回到期/即将到期的条目流
    async fn check_all(&self) -> ServiceResult<DueStream>;

    /// 单个 id 的下一次到期时间
    async fn check_one(&self, id: u32) -> ServiceResult<Option<DateTime<Utc>>>;

    /// 两次全量扫描之间的最长间隔
    fn interval(&self) -> Duration;

    /// 运行器在该 span 内记录此服务的全部日志
    fn span(&self) -> Span {
        tracing::info_span!("service", service = %self.name())
    }
}
