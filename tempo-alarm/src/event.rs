//! 定时事件（TimedEvent）
//!
//! 队列中流转的最小单元：触发时间 + 不透明载荷 + 投递时剩余待处理数。
//!
use chrono::{DateTime, Utc};

/// 定时事件
///
/// `fire_at` 与 `payload` 同时相等的两个事件视为同一个等待条目；
/// `remaining` 仅由队列在投递前写入，提交时的取值会被忽略。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimedEvent<P> {
    pub fire_at: DateTime<Utc>,
    pub payload: P,
    pub remaining: usize,
}

impl<P> TimedEvent<P> {
    pub fn new(fire_at: DateTime<Utc>, payload: P) -> Self {
        Self {
            fire_at,
            payload,
            remaining: 0,
        }
    }

    /// 是否已到期（触发时间不晚于 `now`）
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }
}
