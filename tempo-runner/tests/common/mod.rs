#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempo_alarm::FakeAlarmController;
use tempo_runner::{
    DueItem, DueStream, EventReceiver, RunnerController, Service, ServiceError, ServiceResult,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ago(ms: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::milliseconds(ms)
}

pub fn from_now(ms: i64) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::milliseconds(ms)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemEvent {
    Created(u32),
    Renamed(u32),
    Shutdown,
}

#[derive(Clone, Debug, Default)]
struct Item {
    due_at: Option<DateTime<Utc>>,
    /// 剩余的 NothingToDoYet 次数
    not_ready: usize,
    fail: bool,
    /// 是否出现在 check_all 中
    listed: bool,
    done: bool,
}

/// 按脚本响应的内存服务
pub struct ScriptedService {
    items: Mutex<HashMap<u32, Item>>,
    attempts: Mutex<HashMap<u32, Vec<DateTime<Utc>>>>,
    completed: Mutex<HashMap<u32, DateTime<Utc>>>,
    received: AtomicUsize,
    scans: AtomicUsize,
    interval: Duration,
    stream_error_after: Option<usize>,
}

impl ScriptedService {
    pub fn new(interval: Duration) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashMap::new()),
            received: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
            interval,
            stream_error_after: None,
        }
    }

    pub fn failing_stream_after(mut self, n: usize) -> Self {
        self.stream_error_after = Some(n);
        self
    }

    /// 出现在全量扫描中的条目
    pub fn item(self, id: u32, due_at: DateTime<Utc>, not_ready: usize) -> Self {
        self.insert(id, Item {
            due_at: Some(due_at),
            not_ready,
            listed: true,
            ..Default::default()
        })
    }

    /// 处理必然失败的条目
    pub fn failing_item(self, id: u32, due_at: DateTime<Utc>) -> Self {
        self.insert(id, Item {
            due_at: Some(due_at),
            fail: true,
            listed: true,
            ..Default::default()
        })
    }

    /// 不出现在全量扫描中、只能由事件触发的条目
    pub fn hidden_item(self, id: u32, due_at: Option<DateTime<Utc>>, not_ready: usize) -> Self {
        self.insert(id, Item {
            due_at,
            not_ready,
            listed: false,
            ..Default::default()
        })
    }

    fn insert(self, id: u32, item: Item) -> Self {
        self.items.lock().unwrap().insert(id, item);
        self
    }

    pub fn attempts(&self, id: u32) -> usize {
        self.attempts.lock().unwrap().get(&id).map_or(0, Vec::len)
    }

    pub fn attempt_times(&self, id: u32) -> Vec<DateTime<Utc>> {
        self.attempts.lock().unwrap().get(&id).cloned().unwrap_or_default()
    }

    pub fn completed(&self, id: u32) -> bool {
        self.completed.lock().unwrap().contains_key(&id)
    }

    pub fn completed_at(&self, id: u32) -> Option<DateTime<Utc>> {
        self.completed.lock().unwrap().get(&id).copied()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.lock().unwrap().len()
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn process_one(&self, id: u32) -> ServiceResult<()> {
        let now = Utc::now();
        self.attempts.lock().unwrap().entry(id).or_default().push(now);

        let mut items = self.items.lock().unwrap();
        let item = items.get_mut(&id).ok_or(ServiceError::NotFound { id })?;
        if item.fail {
            return Err(ServiceError::storage("scripted failure"));
        }
        if item.not_ready > 0 {
            item.not_ready -= 1;
            return Err(ServiceError::NothingToDoYet);
        }
        item.done = true;
        self.completed.lock().unwrap().insert(id, now);
        Ok(())
    }

    async fn check_all(&self) -> ServiceResult<DueStream> {
        self.scans.fetch_add(1, Ordering::SeqCst);

        let mut due: Vec<DueItem> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, item)| item.listed && !item.done)
            .filter_map(|(id, item)| item.due_at.map(|due_at| DueItem::new(*id, due_at)))
            .collect();
        due.sort_by_key(|item| (item.due_at, item.id));

        let mut results: Vec<ServiceResult<DueItem>> = due.into_iter().map(Ok).collect();
        if let Some(n) = self.stream_error_after {
            results.truncate(n);
            results.push(Err(ServiceError::storage("cursor lost")));
        }
        Ok(Box::pin(stream::iter(results)))
    }

    async fn check_one(&self, id: u32) -> ServiceResult<Option<DateTime<Utc>>> {
        let items = self.items.lock().unwrap();
        let item = items.get(&id).ok_or(ServiceError::NotFound { id })?;
        Ok(if item.done { None } else { item.due_at })
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl EventReceiver<ItemEvent> for ScriptedService {
    fn filter_event(&self, event: &ItemEvent) -> bool {
        matches!(event, ItemEvent::Created(_) | ItemEvent::Shutdown)
    }

    async fn receive_event(&self, event: ItemEvent, controller: &mut RunnerController) {
        self.received.fetch_add(1, Ordering::SeqCst);
        match event {
            ItemEvent::Created(id) => controller.schedule(id),
            ItemEvent::Shutdown => controller.stop_service(),
            ItemEvent::Renamed(_) => {}
        }
    }
}

pub async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn wait_queue_length(ctl: &FakeAlarmController, expected: usize) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while ctl.queue_length().await != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("alarm queue length not reached in time");
}

pub fn shared(service: ScriptedService) -> Arc<ScriptedService> {
    Arc::new(service)
}
