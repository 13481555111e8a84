//! 待处理集合（PendingSet）
//!
//! 调度任务独占的登记表：按 `(fire_at, seq)` 排序的小根堆。
//! `seq` 为接受顺序，保证同一时刻触发的条目按提交先后出队。
//! 真实队列与测试替身共用此结构，因此去重行为完全一致。
//!
use crate::config::DedupPolicy;
use crate::event::TimedEvent;
use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct Slot<P> {
    fire_at: DateTime<Utc>,
    seq: u64,
    payload: P,
}

impl<P> PartialEq for Slot<P> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl<P> Eq for Slot<P> {}

impl<P> PartialOrd for Slot<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Slot<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

pub(crate) struct PendingSet<P> {
    policy: DedupPolicy,
    heap: BinaryHeap<Reverse<Slot<P>>>,
    next_seq: u64,
}

impl<P: Eq> PendingSet<P> {
    pub(crate) fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// 按去重策略判断是否接受该条目
    fn admits(&self, fire_at: DateTime<Utc>, payload: &P) -> bool {
        let policy = self.policy;
        if policy.is_none() {
            return true;
        }

        !self.heap.iter().any(|Reverse(slot)| {
            let earlier_or_same = slot.fire_at <= fire_at;
            let same_payload = slot.payload == *payload;

            (policy.discard_later && earlier_or_same)
                || (policy.discard_duplicates && same_payload)
                || (policy.discard_late_duplicates && same_payload && earlier_or_same)
        })
    }

    /// 登记新条目；被去重策略拒绝时返回 `false`
    pub(crate) fn insert(&mut self, event: TimedEvent<P>) -> bool {
        if !self.admits(event.fire_at, &event.payload) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(Reverse(Slot {
            fire_at: event.fire_at,
            seq,
            payload: event.payload,
        }));
        true
    }

    /// 最早的触发时间
    pub(crate) fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(slot)| slot.fire_at)
    }

    /// 弹出最早的条目，并写入弹出后的剩余数量
    pub(crate) fn pop(&mut self) -> Option<TimedEvent<P>> {
        let Reverse(slot) = self.heap.pop()?;
        Some(TimedEvent {
            fire_at: slot.fire_at,
            payload: slot.payload,
            remaining: self.heap.len(),
        })
    }

    /// 仅当最早的条目已到期时弹出
    pub(crate) fn pop_due(&mut self, now: DateTime<Utc>) -> Option<TimedEvent<P>> {
        match self.next_deadline() {
            Some(deadline) if deadline <= now => self.pop(),
            _ => None,
        }
    }
}
