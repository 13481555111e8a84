//! 延迟队列错误定义
//!
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// 调度任务已退出（接收端被丢弃或队列已关闭）
    #[error("alarm closed")]
    Closed,
}

pub type AlarmResult<T> = Result<T, AlarmError>;
