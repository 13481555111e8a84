//! 队列配置与去重策略
//!
//! 去重策略的三个开关互相独立，可任意组合；全部关闭时队列接受所有提交。
//!
use bon::Builder;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// 默认的提交缓冲容量
pub const DEFAULT_CAPACITY: usize = 1024;

/// 去重策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupPolicy {
    /// 只要存在触发时间不晚于新条目的待处理条目，就拒绝新条目
    pub discard_later: bool,
    /// 存在载荷相等的待处理条目时拒绝，不论时间
    pub discard_duplicates: bool,
    /// 存在载荷相等且触发时间不晚于新条目的待处理条目时拒绝
    pub discard_late_duplicates: bool,
}

impl DedupPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn discard_later() -> Self {
        Self {
            discard_later: true,
            ..Self::default()
        }
    }

    pub fn discard_duplicates() -> Self {
        Self {
            discard_duplicates: true,
            ..Self::default()
        }
    }

    pub fn discard_late_duplicates() -> Self {
        Self {
            discard_late_duplicates: true,
            ..Self::default()
        }
    }

    pub fn is_none(&self) -> bool {
        !(self.discard_later || self.discard_duplicates || self.discard_late_duplicates)
    }
}

/// 队列配置
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// 提交缓冲容量；需大于同时待处理条目的最大数量
    #[builder(default = DEFAULT_CAPACITY)]
    pub capacity: usize,
    #[builder(default)]
    pub dedup: DedupPolicy,
}

impl AlarmConfig {
    /// 实际使用的提交缓冲容量，限制在 `[1, Semaphore::MAX_PERMITS]` 之内
    pub fn buffer_capacity(&self) -> usize {
        self.capacity.clamp(1, Semaphore::MAX_PERMITS)
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            dedup: DedupPolicy::default(),
        }
    }
}
