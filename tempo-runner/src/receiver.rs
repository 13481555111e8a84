//! 事件接收协议（EventReceiver）与运行器控制端（RunnerController）
//!
//! 服务可额外实现 `EventReceiver`，在外部事件到达时立即请求调度某个 id，
//! 而不必等待下一次全量扫描。
//!
use crate::service::Service;
use async_trait::async_trait;

/// 运行器在 `receive_event` 期间交给服务的能力
///
/// 请求在 `receive_event` 返回后由运行器按顺序执行。
#[derive(Debug, Default)]
pub struct RunnerController {
    scheduled: Vec<u32>,
    stop_requested: bool,
}

impl RunnerController {
    /// 立即处理该 id（等价于没有既定到期时间的一次处理）
    pub fn schedule(&mut self, id: u32) {
        self.scheduled.push(id);
    }

    /// 请求停止运行器
    pub fn stop_service(&mut self) {
        self.stop_requested = true;
    }

    pub fn scheduled(&self) -> &[u32] {
        &self.scheduled
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }
}

/// 事件接收器：过滤并响应外部事件
#[async_trait]
pub trait EventReceiver<E>: Service
where
    E: Send + 'static,
{
    /// 是否关心该事件
    fn filter_event(&self, event: &E) -> bool;

    /// 响应事件，可通过 `controller` 请求调度或停止
    async fn receive_event(&self, event: E, controller: &mut RunnerController);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_collects_requests_in_order() {
        let mut controller = RunnerController::default();
        controller.schedule(3);
        controller.schedule(1);
        assert!(!controller.stop_requested());
        controller.stop_service();

        assert_eq!(controller.scheduled(), &[3, 1]);
        assert!(controller.stop_requested());
    }
}
