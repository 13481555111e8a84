//! 服务运行器（ServiceRunner）
//!
//! 单个调度任务驱动一个 `Service` 的协调循环：
//! - 启动时执行一次全量扫描（电平触发），逾期条目立即处理，未来条目交给延迟队列；
//! - 之后等待三个来源中最先就绪的一个：延迟队列投递、外部事件、停止信号；
//! - 外部事件经 `EventReceiver` 过滤后可请求立即调度某个 id（边沿触发）；
//! - 同一 id 的重复调度请求由延迟队列的去重策略合并。
//!
//! 停止是即时的：延迟队列中尚未投递的条目随运行器一起被丢弃。
//!
use crate::bus::EventBus;
use crate::config::RunnerConfig;
use crate::error::ServiceResult;
use crate::receiver::{EventReceiver, RunnerController};
use crate::service::Service;
use chrono::{DateTime, Utc};
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempo_alarm::{AlarmConfig, AlarmReceiver, AlarmSender, DedupPolicy, TimedEvent, alarm};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, trace, warn};

/// 运行器内部延迟队列的载荷
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Wake {
    /// 处理某个 id
    Item(u32),
    /// 执行一次全量扫描
    FullCheck,
}

/// 运行器生命周期
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    Initializing,
    Idle,
    Processing,
    Stopping,
    Stopped,
}

/// 不订阅外部事件的运行器所使用的事件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoEvents {}

struct EventSource<E>
where
    E: Send + 'static,
{
    receiver: Arc<dyn EventReceiver<E>>,
    bus: Arc<dyn EventBus<E>>,
}

/// 服务运行器：构造时显式注入服务与（可选的）事件来源
pub struct ServiceRunner<E = NoEvents>
where
    E: Send + 'static,
{
    service: Arc<dyn Service>,
    events: Option<EventSource<E>>,
    config: RunnerConfig,
}

impl ServiceRunner<NoEvents> {
    /// 仅依靠全量扫描与延迟队列驱动的运行器
    pub fn new(service: Arc<dyn Service>, config: RunnerConfig) -> Self {
        Self {
            service,
            events: None,
            config,
        }
    }
}

impl<E> ServiceRunner<E>
where
    E: Send + 'static,
{
    /// 额外订阅 `bus` 的运行器；`service` 同时作为事件接收器
    pub fn with_events<S>(
        service: Arc<S>,
        bus: Arc<dyn EventBus<E>>,
        config: RunnerConfig,
    ) -> Self
    where
        S: EventReceiver<E> + 'static,
    {
        let receiver: Arc<dyn EventReceiver<E>> = service.clone();
        Self {
            service,
            events: Some(EventSource { receiver, bus }),
            config,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// 使用真实延迟队列启动（对同一 id 保留最早的待处理条目）
    pub fn start(self) -> RunnerHandle {
        let alarm_config = AlarmConfig::builder()
            .capacity(self.config.alarm_capacity)
            .dedup(DedupPolicy::discard_late_duplicates())
            .build();
        let (alarm_tx, alarm_rx) = alarm(alarm_config);
        self.start_with_alarm(alarm_tx, alarm_rx)
    }

    /// 使用外部提供的延迟队列启动，例如 `tempo_alarm::fake_alarm`
    pub fn start_with_alarm(
        self,
        alarm_tx: AlarmSender<Wake>,
        alarm_rx: AlarmReceiver<Wake>,
    ) -> RunnerHandle {
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(RunnerState::Initializing);
        let span = self.service.span();

        let dispatcher = Dispatcher {
            service: self.service,
            events: self.events,
            config: self.config,
            alarm_tx,
            last_full_check: Utc::now(),
            state: state_tx,
        };
        let task = tokio::spawn(dispatcher.run(alarm_rx, token.clone()).instrument(span));

        RunnerHandle {
            token,
            state: state_rx,
            task: Some(task),
        }
    }
}

/// 运行句柄：用于停止、等待与观察生命周期
pub struct RunnerHandle {
    token: CancellationToken,
    state: watch::Receiver<RunnerState>,
    task: Option<JoinHandle<()>>,
}

impl RunnerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> RunnerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RunnerState> {
        self.state.clone()
    }

    /// 等待运行器退出（由 `shutdown` 或服务的 `stop_service` 触发）
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum Step<E> {
    Stop,
    Wake(TimedEvent<Wake>),
    Event(Option<ServiceResult<E>>),
}

struct Dispatcher<E>
where
    E: Send + 'static,
{
    service: Arc<dyn Service>,
    events: Option<EventSource<E>>,
    config: RunnerConfig,
    alarm_tx: AlarmSender<Wake>,
    last_full_check: DateTime<Utc>,
    state: watch::Sender<RunnerState>,
}

impl<E> Dispatcher<E>
where
    E: Send + 'static,
{
    async fn run(mut self, mut alarm_rx: AlarmReceiver<Wake>, token: CancellationToken) {
        let mut event_stream = match &self.events {
            Some(source) => Some(source.bus.subscribe().await),
            None => None,
        };

        info!("service runner starting");
        self.full_check().await;

        loop {
            self.set_state(RunnerState::Idle);

            let step = tokio::select! {
                biased;
                _ = token.cancelled() => Step::Stop,
                maybe_wake = alarm_rx.recv() => match maybe_wake {
                    Some(wake) => Step::Wake(wake),
                    None => {
                        warn!("alarm delivery stream closed unexpectedly");
                        Step::Stop
                    }
                },
                maybe_event = next_event(&mut event_stream) => Step::Event(maybe_event),
            };

            self.set_state(RunnerState::Processing);
            let keep_running = match step {
                Step::Stop => false,
                Step::Wake(wake) => {
                    self.on_wake(wake).await;
                    true
                }
                Step::Event(Some(Ok(event))) => self.on_event(event).await,
                Step::Event(Some(Err(err))) => {
                    warn!(error = %err, "event stream error, skipping");
                    true
                }
                Step::Event(None) => {
                    info!("event stream ended, continuing without external events");
                    event_stream = None;
                    true
                }
            };

            if !keep_running {
                break;
            }

            if self.full_check_overdue() {
                self.full_check().await;
            }
        }

        self.set_state(RunnerState::Stopping);
        // 直接丢弃延迟队列，未投递的条目不再处理
        drop(alarm_rx);
        info!("service runner stopped");
        self.set_state(RunnerState::Stopped);
    }

    fn set_state(&self, state: RunnerState) {
        self.state.send_replace(state);
    }

    async fn on_wake(&mut self, wake: TimedEvent<Wake>) {
        trace!(payload = ?wake.payload, fire_at = %wake.fire_at, remaining = wake.remaining, "alarm fired");
        match wake.payload {
            Wake::Item(id) => self.process(id, Some(wake.fire_at)).await,
            Wake::FullCheck => self.full_check().await,
        }
    }

    /// 处理一条外部事件；服务请求停止时返回 `false`
    async fn on_event(&mut self, event: E) -> bool {
        let Some(receiver) = self.events.as_ref().map(|source| source.receiver.clone()) else {
            return true;
        };
        if !receiver.filter_event(&event) {
            return true;
        }

        let mut controller = RunnerController::default();
        receiver.receive_event(event, &mut controller).await;
        for &id in controller.scheduled() {
            self.process(id, None).await;
        }

        let stop_requested = controller.stop_requested();
        if stop_requested {
            info!("service requested stop");
        }
        !stop_requested
    }

    /// 全量扫描：逾期条目立即处理，未来条目提交到延迟队列，最后提交下一次扫描标记
    async fn full_check(&mut self) {
        let now = Utc::now();
        self.last_full_check = now;

        let mut handled = 0usize;
        let mut complete = true;

        let items = self.service.check_all().await;
        match items {
            Ok(mut items) => loop {
                if handled >= self.config.max_per_scan {
                    debug!(handled, "full check reached per-scan cap");
                    complete = false;
                    break;
                }

                match items.next().await {
                    None => break,
                    Some(Ok(item)) => {
                        let Some(due_at) = item.due_at else {
                            continue;
                        };
                        if item.is_overdue(now) {
                            self.process(item.id, Some(due_at)).await;
                        } else {
                            self.schedule(Wake::Item(item.id), due_at).await;
                        }
                        handled += 1;
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, handled, "due item stream failed, ending scan early");
                        complete = false;
                        break;
                    }
                }
            },
            Err(err) => {
                warn!(error = %err, "failed to start full check");
                complete = false;
            }
        }

        debug!(handled, complete, "full check finished");

        // 始终保留一个扫描标记，空闲时最长沉默一个 interval；
        // 更晚的重复标记由延迟队列的去重策略丢弃
        let next = after(self.last_full_check, self.service.interval());
        self.schedule(Wake::FullCheck, next).await;
    }

    fn full_check_overdue(&self) -> bool {
        Utc::now() >= after(self.last_full_check, self.service.interval())
    }

    /// 处理单个 id，并根据结果决定下一次调度
    async fn process(&self, id: u32, due_at: Option<DateTime<Utc>>) {
        match self.service.process_one(id).await {
            Ok(()) => match self.service.check_one(id).await {
                Ok(Some(next)) => self.schedule(Wake::Item(id), next).await,
                Ok(None) => trace!(id, "processed, nothing further due"),
                Err(err) => error!(id, error = %err, "check_one failed after processing"),
            },
            Err(err) if err.is_nothing_to_do_yet() => {
                let base = match due_at {
                    Some(due_at) => Some(due_at),
                    None => match self.service.check_one(id).await {
                        Ok(next) => next,
                        Err(err) => {
                            error!(id, error = %err, "check_one failed after nothing to do yet");
                            None
                        }
                    },
                };
                let Some(base) = base else {
                    debug!(id, "not ready and nothing due, dropping trigger");
                    return;
                };

                let next = base.max(after(Utc::now(), self.config.reschedule_delay));
                debug!(id, %next, "not ready yet, rescheduling");
                self.schedule(Wake::Item(id), next).await;
            }
            Err(err) => error!(id, error = %err, "processing failed"),
        }
    }

    async fn schedule(&self, wake: Wake, fire_at: DateTime<Utc>) {
        trace!(?wake, %fire_at, "scheduling");
        if let Err(err) = self.alarm_tx.submit(fire_at, wake).await {
            error!(?wake, error = %err, "failed to schedule");
        }
    }
}

async fn next_event<E>(
    stream: &mut Option<BoxStream<'static, ServiceResult<E>>>,
) -> Option<ServiceResult<E>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// `at + delay`，溢出时取最大时间
fn after(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| at.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
