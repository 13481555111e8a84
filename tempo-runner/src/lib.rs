//! 协调运行器（tempo-runner）
//!
//! 为一组以 `u32` 标识、状态不断变化的领域对象，反复判断哪些已到期并执行领域操作：
//! - `Service`：领域侧实现的处理/检查协议；
//! - `EventReceiver`：可选的外部事件入口，经 `RunnerController` 请求立即调度；
//! - `EventBus`：外部发布/订阅总线的边界协议，附带内存实现 `InMemoryEventBus`；
//! - `ServiceRunner`：把周期性全量扫描（电平触发）与外部事件（边沿触发）结合起来，
//!   并借助 `tempo-alarm` 对同一 id 的待处理调度去重。
//!
//! 本 crate 不依赖存储或传输实现，所有外部协作者都通过构造参数显式注入。
//!
//! 典型用法：
//! 1. 为领域实现 `Service`（需要事件驱动时再实现 `EventReceiver`）；
//! 2. 通过 `ServiceRunner::new` 或 `ServiceRunner::with_events` 构造运行器；
//! 3. `start()` 得到 `RunnerHandle`，用于停止、等待与观察生命周期。
//!
pub mod bus;
#[cfg(feature = "inmemory-bus")]
pub mod bus_inmemory;
pub mod config;
pub mod error;
pub mod receiver;
pub mod runner;
pub mod service;

pub use bus::EventBus;
#[cfg(feature = "inmemory-bus")]
pub use bus_inmemory::InMemoryEventBus;
pub use config::RunnerConfig;
pub use error::{ServiceError, ServiceResult};
pub use receiver::{EventReceiver, RunnerController};
pub use runner::{NoEvents, RunnerHandle, RunnerState, ServiceRunner, Wake};
pub use service::{DueItem, DueStream, Service};
