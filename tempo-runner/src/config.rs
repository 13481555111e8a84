//! 运行器配置
//!
//! 配置的加载由外部完成，这里只保证可以从任意 serde 格式反序列化，
//! 时长字段以毫秒表示。
//!
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_PER_SCAN: usize = 128;
pub const DEFAULT_RESCHEDULE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_ALARM_CAPACITY: usize = 1024;

#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// 单次全量扫描最多处理的条目数
    #[builder(default = DEFAULT_MAX_PER_SCAN)]
    pub max_per_scan: usize,
    /// `NothingToDoYet` 之后的固定退避
    #[builder(default = DEFAULT_RESCHEDULE_DELAY)]
    #[serde(rename = "reschedule_delay_ms", with = "duration_ms")]
    pub reschedule_delay: Duration,
    /// 内部延迟队列的提交缓冲容量，需大于同时待处理 id 的数量
    #[builder(default = DEFAULT_ALARM_CAPACITY)]
    pub alarm_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_per_scan: DEFAULT_MAX_PER_SCAN,
            reschedule_delay: DEFAULT_RESCHEDULE_DELAY,
            alarm_capacity: DEFAULT_ALARM_CAPACITY,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
