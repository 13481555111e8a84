//! 延迟重投递队列（tempo-alarm）
//!
//! 接收来自多个生产者的定时工作项 `(fire_at, payload)`，在请求的时间到达后，
//! 经由唯一的输出流逐个重投递，并附带仍在等待中的条目数：
//! - `alarm`：基于墙上时钟的实现，单个调度任务 + 截止时间小根堆；
//! - `fake_alarm`：测试替身，由显式 `tick()` 驱动，行为完全确定；
//! - `DedupPolicy`：基于载荷相等与触发时间先后的去重策略。
//!
//! 两种实现共享同一套“提交流 / 投递流”协议（`AlarmSender` / `AlarmReceiver`），
//! 因此上层（例如 `tempo-runner`）可以在测试中无缝替换为确定性的假实现。
//!
//! 典型用法：
//! 1. 通过 `AlarmConfig::builder()` 选择缓冲容量与去重策略；
//! 2. 调用 `alarm(config)` 得到发送端与接收端；
//! 3. 生产者 `submit`，消费者循环 `recv`；
//! 4. 丢弃所有发送端以请求优雅关闭，接收端在剩余条目排空后返回 `None`。
//!
pub mod alarm;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod fake;

mod pending;

pub use alarm::alarm;
pub use channel::{AlarmReceiver, AlarmSender};
pub use config::{AlarmConfig, DedupPolicy};
pub use error::{AlarmError, AlarmResult};
pub use event::TimedEvent;
pub use fake::{FakeAlarmController, fake_alarm};
