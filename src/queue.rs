// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::collections::VecDeque;

use crate::transport::Characteristic;

/// Queue band. High is always serviced before Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Low,
}

/// A single request to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattOperation {
    Write { characteristic: Characteristic, data: Vec<u8> },
    Read { characteristic: Characteristic },
    EnableNotify { characteristic: Characteristic },
}

impl GattOperation {
    pub fn characteristic(&self) -> Characteristic {
        match self {
            GattOperation::Write { characteristic, .. }
            | GattOperation::Read { characteristic }
            | GattOperation::EnableNotify { characteristic } => *characteristic,
        }
    }
}

/// A queued operation together with whoever is waiting for its completion.
#[derive(Debug, Clone)]
pub struct QueuedOperation<T> {
    pub operation: GattOperation,
    pub origin: T,
    pub priority: Priority,
}

/// Two-band FIFO of transport operations with a single in-flight slot.
///
/// An issued operation is never preempted: new High entries wait for the
/// in-flight one to complete even if it came from the Low band.
#[derive(Debug)]
pub struct GattQueue<T> {
    high: VecDeque<QueuedOperation<T>>,
    low: VecDeque<QueuedOperation<T>>,
    in_flight: Option<QueuedOperation<T>>,
}

impl<T> Default for GattQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GattQueue<T> {
    pub fn new() -> Self {
        Self {
            high: VecDeque::new(),
            low: VecDeque::new(),
            in_flight: None,
        }
    }

    fn band(&mut self, priority: Priority) -> &mut VecDeque<QueuedOperation<T>> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Low => &mut self.low,
        }
    }

    pub fn enqueue(&mut self, operation: GattOperation, origin: T, priority: Priority) {
        self.band(priority).push_back(QueuedOperation {
            operation,
            origin,
            priority,
        });
    }

    /// Put entries back at the head of their bands, keeping their relative order.
    pub fn requeue_front(&mut self, entries: Vec<QueuedOperation<T>>) {
        for entry in entries.into_iter().rev() {
            self.band(entry.priority).push_front(entry);
        }
    }

    /// Move the next entry into the in-flight slot. Returns it if one was issued.
    pub fn issue_next(&mut self) -> Option<&QueuedOperation<T>> {
        if self.in_flight.is_some() {
            return None;
        }
        let next = self.high.pop_front().or_else(|| self.low.pop_front())?;
        self.in_flight = Some(next);
        self.in_flight.as_ref()
    }

    /// Take the in-flight entry after its completion arrived.
    pub fn complete(&mut self) -> Option<QueuedOperation<T>> {
        self.in_flight.take()
    }

    pub fn in_flight(&self) -> Option<&QueuedOperation<T>> {
        self.in_flight.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of waiting entries, excluding the one in flight.
    pub fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.low.is_empty()
    }

    /// Remove waiting entries matching `predicate`, in dequeue order.
    pub fn extract<F>(&mut self, mut predicate: F) -> Vec<QueuedOperation<T>>
    where
        F: FnMut(&QueuedOperation<T>) -> bool,
    {
        let mut removed = Vec::new();
        for band in [&mut self.high, &mut self.low] {
            let mut kept = VecDeque::with_capacity(band.len());
            for entry in band.drain(..) {
                if predicate(&entry) {
                    removed.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            *band = kept;
        }
        removed
    }

    /// Drop everything, the in-flight entry included.
    pub fn clear(&mut self) -> Vec<QueuedOperation<T>> {
        let mut dropped: Vec<_> = self.in_flight.take().into_iter().collect();
        dropped.extend(self.high.drain(..));
        dropped.extend(self.low.drain(..));
        dropped
    }
}
