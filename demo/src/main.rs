use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempo_alarm::TimedEvent;
use tempo_runner::{
    DueItem, DueStream, EventBus, EventReceiver, InMemoryEventBus, RunnerConfig,
    RunnerController, Service, ServiceError, ServiceResult, ServiceRunner,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Listing {
    title: String,
    expires_at: DateTime<Utc>,
    closed: bool,
}

#[derive(Debug, Clone)]
enum ListingEvent {
    Created { id: u32 },
    Extended { id: u32 },
    Viewed { id: u32 },
}

/// 关闭过期条目的服务
#[derive(Default, Clone)]
struct CloseExpiredListings {
    inner: Arc<Mutex<HashMap<u32, Listing>>>,
}

impl CloseExpiredListings {
    fn put(&self, id: u32, title: &str, expires_in: Duration) -> anyhow::Result<()> {
        let expires_at = Utc::now() + chrono::Duration::from_std(expires_in)?;
        let mut store = self.inner.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        store.insert(id, Listing {
            title: title.to_string(),
            expires_at,
            closed: false,
        });
        Ok(())
    }

    fn extend(&self, id: u32, by: Duration) -> anyhow::Result<()> {
        let by = chrono::Duration::from_std(by)?;
        let mut store = self.inner.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        if let Some(listing) = store.get_mut(&id) {
            listing.expires_at += by;
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<(u32, Listing)> {
        let store = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = store.iter().map(|(id, l)| (*id, l.clone())).collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut HashMap<u32, Listing>) -> T) -> ServiceResult<T> {
        let mut store = self
            .inner
            .lock()
            .map_err(|_| ServiceError::storage("store poisoned"))?;
        Ok(f(&mut store))
    }
}

#[async_trait]
impl Service for CloseExpiredListings {
    fn name(&self) -> &str {
        "close-expired-listings"
    }

    async fn process_one(&self, id: u32) -> ServiceResult<()> {
        let now = Utc::now();
        let closed = self.with_store(|store| match store.get_mut(&id) {
            None => Err(ServiceError::NotFound { id }),
            Some(listing) if listing.closed => Ok(None),
            Some(listing) if listing.expires_at > now => Err(ServiceError::NothingToDoYet),
            Some(listing) => {
                listing.closed = true;
                Ok(Some(listing.title.clone()))
            }
        })??;

        if let Some(title) = closed {
            info!(id, %title, "listing closed");
        }
        Ok(())
    }

    async fn check_all(&self) -> ServiceResult<DueStream> {
        let mut due = self.with_store(|store| {
            store
                .iter()
                .filter(|(_, l)| !l.closed)
                .map(|(id, l)| DueItem::new(*id, l.expires_at))
                .collect::<Vec<_>>()
        })?;
        due.sort_by_key(|item| item.due_at);
        Ok(Box::pin(stream::iter(due.into_iter().map(Ok))))
    }

    async fn check_one(&self, id: u32) -> ServiceResult<Option<DateTime<Utc>>> {
        self.with_store(|store| {
            store
                .get(&id)
                .filter(|l| !l.closed)
                .map(|l| l.expires_at)
        })
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(5)
    }
}

#[async_trait]
impl EventReceiver<ListingEvent> for CloseExpiredListings {
    fn filter_event(&self, event: &ListingEvent) -> bool {
        !matches!(event, ListingEvent::Viewed { .. })
    }

    async fn receive_event(&self, event: ListingEvent, controller: &mut RunnerController) {
        match event {
            ListingEvent::Created { id } | ListingEvent::Extended { id } => controller.schedule(id),
            ListingEvent::Viewed { .. } => {}
        }
    }
}

/// 可通过 `TEMPO_RUNNER_CONFIG` 传入 JSON 配置，例如 `{"reschedule_delay_ms":100}`
fn load_config() -> anyhow::Result<RunnerConfig> {
    match std::env::var("TEMPO_RUNNER_CONFIG") {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(_) => Ok(RunnerConfig::builder()
            .reschedule_delay(Duration::from_millis(100))
            .build()),
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;

    let listings = Arc::new(CloseExpiredListings::default());
    listings.put(1, "vintage lamp", Duration::ZERO)?;
    listings.put(2, "road bike", Duration::from_millis(300))?;
    listings.put(3, "bookshelf", Duration::from_millis(600))?;

    let bus = Arc::new(InMemoryEventBus::<ListingEvent>::new(64));
    let runner = ServiceRunner::<ListingEvent>::with_events(listings.clone(), bus.clone(), config);
    info!(config = ?runner.config(), "starting demo");
    let handle = runner.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(subscribers = bus.subscriber_count(), "publishing listing events");

    // 新建条目经事件立即调度，不必等待下一次全量扫描
    listings.put(4, "desk chair", Duration::from_millis(200))?;
    bus.publish(ListingEvent::Created { id: 4 }).await?;

    // 延长后的条目会按新的到期时间重新调度
    listings.extend(3, Duration::from_millis(300))?;
    bus.publish_batch(vec![
        ListingEvent::Extended { id: 3 },
        ListingEvent::Viewed { id: 2 },
    ])
    .await?;

    tokio::time::sleep(Duration::from_millis(1200)).await;

    handle.shutdown();
    handle.join().await;

    for (id, listing) in listings.snapshot() {
        println!(
            "listing {id} ({}) expires_at={} closed={}",
            listing.title, listing.expires_at, listing.closed
        );
    }

    // 单独演示延迟队列本身：按触发时间而非提交顺序投递
    let (tx, mut rx) = tempo_alarm::alarm::<&'static str>(Default::default());
    let now = Utc::now();
    tx.submit(now + chrono::Duration::milliseconds(20), "second").await?;
    tx.submit_event(TimedEvent::new(now, "first")).await?;
    drop(tx);
    while let Some(event) = rx.recv().await {
        println!("alarm fired: {} (remaining {})", event.payload, event.remaining);
    }

    Ok(())
}
