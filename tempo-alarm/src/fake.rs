//! 确定性测试替身（FakeAlarm）
//!
//! 与真实队列共享提交流/投递流协议与去重策略，但不依赖时间流逝：
//! - `tick()` 弹出触发时间最早的条目并投递；
//! - `queue_length()` 查询待处理数量；
//! - `close()` 与丢弃全部提交端等价，剩余条目仍需 `tick()` 排空。
//!
//! 每次控制调用前都会先吸收已缓冲的提交，因此“先 submit 再 tick”的顺序总是成立。
//! 控制端被丢弃后调度任务立即退出，投递流随之关闭。
//!
use crate::channel::{AlarmReceiver, AlarmSender};
use crate::config::AlarmConfig;
use crate::event::TimedEvent;
use crate::pending::PendingSet;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

enum Control {
    Tick(oneshot::Sender<bool>),
    QueueLength(oneshot::Sender<usize>),
    Close(oneshot::Sender<()>),
}

/// 测试替身的控制端
#[derive(Clone, Debug)]
pub struct FakeAlarmController {
    tx: mpsc::UnboundedSender<Control>,
}

impl FakeAlarmController {
    /// 投递最早的待处理条目；集合为空或队列已退出时返回 `false`。
    ///
    /// 投递流只有一个缓冲位，连续 `tick()` 之间需要消费者读取。
    pub async fn tick(&self) -> bool {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Control::Tick(ack)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// 当前待处理数量
    pub async fn queue_length(&self) -> usize {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Control::QueueLength(ack)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// 停止接受提交；剩余条目排空后投递流关闭
    pub async fn close(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Control::Close(ack)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// 创建测试替身，返回提交端、投递端与控制端
pub fn fake_alarm<P>(
    config: AlarmConfig,
) -> (AlarmSender<P>, AlarmReceiver<P>, FakeAlarmController)
where
    P: Eq + Send + 'static,
{
    let (submit_tx, submit_rx) = mpsc::channel(config.buffer_capacity());
    let (deliver_tx, deliver_rx) = mpsc::channel(1);
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let dispatcher = FakeDispatcher {
        pending: PendingSet::new(config.dedup),
        submissions: submit_rx,
        deliveries: deliver_tx,
        control: control_rx,
        accepting: true,
    };
    tokio::spawn(dispatcher.run());

    (
        AlarmSender::new(submit_tx),
        AlarmReceiver::new(deliver_rx),
        FakeAlarmController { tx: control_tx },
    )
}

struct FakeDispatcher<P> {
    pending: PendingSet<P>,
    submissions: mpsc::Receiver<TimedEvent<P>>,
    deliveries: mpsc::Sender<TimedEvent<P>>,
    control: mpsc::UnboundedReceiver<Control>,
    accepting: bool,
}

impl<P> FakeDispatcher<P>
where
    P: Eq + Send + 'static,
{
    async fn run(mut self) {
        loop {
            if !self.accepting && self.pending.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                maybe_control = self.control.recv() => {
                    let Some(control) = maybe_control else {
                        debug!("fake alarm controller dropped");
                        return;
                    };
                    if !self.handle(control).await {
                        return;
                    }
                }
                maybe_event = self.submissions.recv(), if self.accepting => {
                    match maybe_event {
                        Some(event) => self.accept(event),
                        None => self.accepting = false,
                    }
                }
            }
        }

        debug!("fake alarm drained, closing delivery stream");
    }

    fn accept(&mut self, event: TimedEvent<P>) {
        let fire_at = event.fire_at;
        if !self.pending.insert(event) {
            trace!(%fire_at, "fake alarm entry discarded by dedup policy");
        }
    }

    fn absorb_buffered(&mut self) {
        while self.accepting {
            match self.submissions.try_recv() {
                Ok(event) => self.accept(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.accepting = false,
            }
        }
    }

    /// 处理一条控制命令；投递端已关闭时返回 `false`
    async fn handle(&mut self, control: Control) -> bool {
        self.absorb_buffered();

        match control {
            Control::Tick(ack) => {
                let Some(event) = self.pending.pop() else {
                    let _ = ack.send(false);
                    return true;
                };
                let delivered = self.deliveries.send(event).await.is_ok();
                let _ = ack.send(delivered);
                delivered
            }
            Control::QueueLength(ack) => {
                let _ = ack.send(self.pending.len());
                true
            }
            Control::Close(ack) => {
                self.accepting = false;
                self.submissions.close();
                let _ = ack.send(());
                true
            }
        }
    }
}
