//! `EventQueue` — the single ordered timer store of a run.
//!
//! Every layer of every mote keeps its timers here.  Nothing else in the
//! simulator owns a clock.
//!
//! # Performance note
//!
//! `BTreeMap` gives O(log N) insert and pop.  The parallel `FxHashMap`
//! index from tag to key makes replacement and cancellation O(log N) too,
//! instead of a linear scan of pending events.

use std::collections::BTreeMap;
use std::hash::Hash;

use rustc_hash::FxHashMap;
use ts_core::Asn;

/// Position of an event within its slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum IntraSlotOrder {
    StartSlot  = 0,
    Propagate  = 1,
    StackTasks = 2,
    AdminTasks = 3,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    asn:   Asn,
    order: IntraSlotOrder,
    seq:   u64,
}

/// Ordered queue of pending events, each identified by a unique tag.
pub struct EventQueue<T> {
    events: BTreeMap<EventKey, T>,
    index:  FxHashMap<T, EventKey>,
    next_seq: u64,
    /// ASN of the last event handed out; scheduling earlier is clamped here.
    now: Asn,
}

impl<T: Clone + Eq + Hash> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq + Hash> EventQueue<T> {
    pub fn new() -> Self {
        EventQueue {
            events:   BTreeMap::new(),
            index:    FxHashMap::default(),
            next_seq: 0,
            now:      Asn::ZERO,
        }
    }

    /// Schedule `tag` at `(asn, order)`.  A pending event with the same tag
    /// is removed first.
    pub fn schedule_at(&mut self, asn: Asn, order: IntraSlotOrder, tag: T) {
        let asn = if asn < self.now {
            tracing::warn!(%asn, now = %self.now, "event scheduled in the past; firing now");
            self.now
        } else {
            asn
        };
        if let Some(old) = self.index.remove(&tag) {
            self.events.remove(&old);
        }
        let key = EventKey { asn, order, seq: self.next_seq };
        self.next_seq += 1;
        self.index.insert(tag.clone(), key);
        self.events.insert(key, tag);
    }

    /// Remove the pending event with this tag.  Returns `true` if one existed.
    pub fn cancel(&mut self, tag: &T) -> bool {
        match self.index.remove(tag) {
            Some(key) => {
                self.events.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Remove every pending event whose tag matches `pred`.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&T) -> bool) {
        let doomed: Vec<T> = self.index.keys().filter(|t| pred(t)).cloned().collect();
        for tag in doomed {
            self.cancel(&tag);
        }
    }

    pub fn is_scheduled(&self, tag: &T) -> bool {
        self.index.contains_key(tag)
    }

    /// ASN at which `tag` is pending, if it is.
    pub fn scheduled_asn(&self, tag: &T) -> Option<Asn> {
        self.index.get(tag).map(|k| k.asn)
    }

    /// `(asn, order)` of the earliest pending event.
    pub fn peek(&self) -> Option<(Asn, IntraSlotOrder)> {
        self.events.keys().next().map(|k| (k.asn, k.order))
    }

    /// Remove and return the earliest pending event.
    pub fn pop_next(&mut self) -> Option<(Asn, IntraSlotOrder, T)> {
        let (key, tag) = self.events.pop_first()?;
        self.index.remove(&tag);
        self.now = key.asn;
        Some((key.asn, key.order, tag))
    }

    /// ASN of the most recently popped event.
    #[inline]
    pub fn now(&self) -> Asn {
        self.now
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
