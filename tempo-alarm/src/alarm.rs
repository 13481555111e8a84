//! 基于墙上时钟的延迟队列
//!
//! 单个调度任务独占待处理集合，同时等待三个来源：
//! - 提交流上的新条目（按去重策略登记）；
//! - 最早截止时间的计时器（只维护一个 `sleep_until`）；
//! - 投递端被丢弃（此时直接退出）。
//!
//! 提交流关闭后不再接受新条目，继续按时间投递直至集合为空，然后关闭投递流。
//!
use crate::channel::{AlarmReceiver, AlarmSender};
use crate::config::AlarmConfig;
use crate::event::TimedEvent;
use crate::pending::PendingSet;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

// 约 30 年，与 tokio 内部表示“永不”的做法一致
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// 创建延迟队列并在当前 tokio 运行时上启动调度任务
pub fn alarm<P>(config: AlarmConfig) -> (AlarmSender<P>, AlarmReceiver<P>)
where
    P: Eq + Send + 'static,
{
    let (submit_tx, submit_rx) = mpsc::channel(config.buffer_capacity());
    let (deliver_tx, deliver_rx) = mpsc::channel(1);

    let dispatcher = Dispatcher {
        pending: PendingSet::new(config.dedup),
        submissions: submit_rx,
        deliveries: deliver_tx,
    };
    tokio::spawn(dispatcher.run());

    (AlarmSender::new(submit_tx), AlarmReceiver::new(deliver_rx))
}

struct Dispatcher<P> {
    pending: PendingSet<P>,
    submissions: mpsc::Receiver<TimedEvent<P>>,
    deliveries: mpsc::Sender<TimedEvent<P>>,
}

impl<P> Dispatcher<P>
where
    P: Eq + Send + 'static,
{
    async fn run(mut self) {
        let mut accepting = true;

        loop {
            if !accepting && self.pending.is_empty() {
                break;
            }

            let deadline = self.pending.next_deadline().map(instant_for);

            tokio::select! {
                maybe_event = self.submissions.recv(), if accepting => {
                    match maybe_event {
                        Some(event) => self.accept(event),
                        None => {
                            accepting = false;
                            debug!(pending = self.pending.len(), "alarm submissions closed, draining");
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if !self.fire_due().await {
                        debug!("alarm receiver dropped, abandoning pending entries");
                        return;
                    }
                }
                _ = self.deliveries.closed() => {
                    debug!("alarm receiver dropped, abandoning pending entries");
                    return;
                }
            }
        }

        debug!("alarm drained, closing delivery stream");
    }

    fn accept(&mut self, event: TimedEvent<P>) {
        let fire_at = event.fire_at;
        if self.pending.insert(event) {
            trace!(%fire_at, pending = self.pending.len(), "alarm entry accepted");
        } else {
            trace!(%fire_at, "alarm entry discarded by dedup policy");
        }
    }

    /// 投递所有已到期条目；投递端已关闭时返回 `false`
    async fn fire_due(&mut self) -> bool {
        while let Some(event) = self.pending.pop_due(Utc::now()) {
            trace!(fire_at = %event.fire_at, remaining = event.remaining, "alarm firing");
            if self.deliveries.send(event).await.is_err() {
                return false;
            }
        }
        true
    }
}

/// 将墙上时间换算为单调时钟上的截止点；已过去的时间立即到期
fn instant_for(fire_at: DateTime<Utc>) -> Instant {
    let now = Instant::now();
    let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
    now.checked_add(delay)
        .unwrap_or_else(|| now + FAR_FUTURE)
}
