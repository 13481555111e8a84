//! 服务层统一错误定义
//!
//! `NothingToDoYet` 是预期内的哨兵结果，驱动短暂退避后的重新调度；
//! 其余变体在运行器中一律记录日志并放弃本次触发，等待下一次全量扫描。
//!
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("nothing to do yet")]
    NothingToDoYet,

    #[error("not found: id={id}")]
    NotFound { id: u32 },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("event bus error: {reason}")]
    EventBus { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    pub fn event_bus(reason: impl Into<String>) -> Self {
        Self::EventBus {
            reason: reason.into(),
        }
    }

    pub fn is_nothing_to_do_yet(&self) -> bool {
        matches!(self, Self::NothingToDoYet)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sentinel_counts_as_nothing_to_do_yet() {
        assert!(ServiceError::NothingToDoYet.is_nothing_to_do_yet());
        assert!(!ServiceError::NotFound { id: 1 }.is_nothing_to_do_yet());
        assert!(!ServiceError::from(anyhow::anyhow!("boom")).is_nothing_to_do_yet());
    }

    #[test]
    fn helpers_carry_reason() {
        assert_eq!(
            ServiceError::storage("disk full").to_string(),
            "storage error: disk full"
        );
        assert_eq!(ServiceError::NotFound { id: 7 }.to_string(), "not found: id=7");
    }
}
