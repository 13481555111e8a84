use anyhow::Result as AnyResult;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::StreamExt;
use std::time::Duration;
use tempo_alarm::{AlarmConfig, AlarmReceiver, DedupPolicy, TimedEvent, alarm};

// 调度器分辨率之外允许的迟到量
fn lateness() -> ChronoDuration {
    ChronoDuration::milliseconds(25)
}

fn in_us(us: i64) -> DateTime<Utc> {
    Utc::now() + ChronoDuration::microseconds(us)
}

async fn collect_all<P>(rx: AlarmReceiver<P>) -> Vec<(TimedEvent<P>, DateTime<Utc>)> {
    rx.map(|ev| (ev, Utc::now())).collect().await
}

#[tokio::test(flavor = "multi_thread")]
async fn delivers_in_fire_time_order_close_to_deadline() -> AnyResult<()> {
    let (tx, rx) = alarm::<u32>(AlarmConfig::default());

    tx.submit(in_us(5_000), 5).await?;
    tx.submit(in_us(10_000), 10).await?;
    tx.submit(in_us(-100), 0).await?;
    drop(tx);

    let delivered = tokio::time::timeout(Duration::from_secs(2), collect_all(rx)).await?;
    let order: Vec<u32> = delivered.iter().map(|(ev, _)| ev.payload).collect();
    assert_eq!(order, vec![0, 5, 10]);

    for (ev, at) in &delivered {
        assert!(*at >= ev.fire_at, "delivered early: {at} < {}", ev.fire_at);
        assert!(*at - ev.fire_at <= lateness(), "delivered too late: {at} vs {}", ev.fire_at);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn never_delivers_before_fire_time() -> AnyResult<()> {
    let (tx, rx) = alarm::<u32>(AlarmConfig::default());
    for i in 0..20u32 {
        // 乱序提交，间隔为 1.3ms 的倍数，刻意不与毫秒对齐
        let offset = i64::from((i * 7) % 20) * 1_300;
        tx.submit(in_us(offset), i).await?;
    }
    drop(tx);

    let delivered = tokio::time::timeout(Duration::from_secs(2), collect_all(rx)).await?;
    assert_eq!(delivered.len(), 20);
    for (ev, at) in &delivered {
        assert!(ev.is_due(*at));
    }
    let fire_times: Vec<_> = delivered.iter().map(|(ev, _)| ev.fire_at).collect();
    let mut sorted = fire_times.clone();
    sorted.sort();
    assert_eq!(fire_times, sorted);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn remaining_counts_other_pending_events() -> AnyResult<()> {
    let (tx, mut rx) = alarm::<u32>(AlarmConfig::default());
    tx.submit(in_us(2_000), 1).await?;
    tx.submit(in_us(4_000), 2).await?;
    tx.submit(in_us(6_000), 3).await?;

    let mut remaining = Vec::new();
    for _ in 0..3 {
        let ev = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("stream closed early"))?;
        remaining.push(ev.remaining);
    }
    assert_eq!(remaining, vec![2, 1, 0]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn graceful_drain_delivers_every_pending_event() -> AnyResult<()> {
    let (tx, rx) = alarm::<u32>(AlarmConfig::default());
    for i in 0..8u32 {
        tx.submit(in_us(i64::from(i) * 3_000), i).await?;
    }
    drop(tx);

    let delivered = tokio::time::timeout(Duration::from_secs(2), collect_all(rx)).await?;
    assert_eq!(delivered.len(), 8);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn discard_late_duplicates_keeps_earliest() -> AnyResult<()> {
    let config = AlarmConfig::builder()
        .dedup(DedupPolicy::discard_late_duplicates())
        .build();
    let (tx, rx) = alarm::<&'static str>(config);

    let t1 = in_us(5_000);
    let t2 = in_us(15_000);
    tx.submit(t2, "item").await?;
    tx.submit(t1, "item").await?;
    tx.submit(t2, "item").await?;
    drop(tx);

    let delivered = tokio::time::timeout(Duration::from_secs(2), collect_all(rx)).await?;
    // t2 先于 t1 提交，因此被接受；之后重复的 t2 被拒绝
    let times: Vec<_> = delivered.iter().map(|(ev, _)| ev.fire_at).collect();
    assert_eq!(times, vec![t1, t2]);

    let (tx, rx) = alarm::<&'static str>(config);
    tx.submit(t1, "item").await?;
    tx.submit(t2, "item").await?;
    drop(tx);
    let delivered = tokio::time::timeout(Duration::from_secs(2), collect_all(rx)).await?;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0.fire_at, t1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn discard_duplicates_ignores_fire_time() -> AnyResult<()> {
    let config = AlarmConfig::builder()
        .dedup(DedupPolicy::discard_duplicates())
        .build();
    let (tx, rx) = alarm::<u32>(config);
    tx.submit(in_us(8_000), 1).await?;
    tx.submit(in_us(1_000), 1).await?;
    tx.submit(in_us(2_000), 2).await?;
    drop(tx);

    let delivered = tokio::time::timeout(Duration::from_secs(2), collect_all(rx)).await?;
    let payloads: Vec<_> = delivered.iter().map(|(ev, _)| ev.payload).collect();
    assert_eq!(payloads, vec![2, 1]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn discard_later_keeps_only_soonest_class() -> AnyResult<()> {
    let config = AlarmConfig::builder()
        .dedup(DedupPolicy::discard_later())
        .build();
    let (tx, rx) = alarm::<u32>(config);
    tx.submit(in_us(10_000), 1).await?;
    tx.submit(in_us(20_000), 2).await?;
    tx.submit(in_us(3_000), 3).await?;
    drop(tx);

    let delivered = tokio::time::timeout(Duration::from_secs(2), collect_all(rx)).await?;
    let payloads: Vec<_> = delivered.iter().map(|(ev, _)| ev.payload).collect();
    assert_eq!(payloads, vec![3, 1]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn many_producers_share_one_output() -> AnyResult<()> {
    let (tx, rx) = alarm::<(u32, u32)>(AlarmConfig::default());
    let mut producers = Vec::new();
    for p in 0..4u32 {
        let tx = tx.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..5u32 {
                let _ = tx.submit(in_us(i64::from(i) * 1_000), (p, i)).await;
            }
        }));
    }
    drop(tx);
    for producer in producers {
        producer.await?;
    }

    let delivered = tokio::time::timeout(Duration::from_secs(2), collect_all(rx)).await?;
    assert_eq!(delivered.len(), 20);
    Ok(())
}
