use crate::queue::{QueueError, QueueResult, WorkQueue};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// In-process work queue
///
/// Not durable; used for single-process runs and tests.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkQueue for MemoryQueue {
    fn push(&self, key: &str, payload: &str) -> QueueResult<()> {
        let mut queues = self.queues.lock().map_err(|_| QueueError::LockPoisoned)?;
        queues
            .entry(key.to_string())
            .or_default()
            .push_back(payload.to_string());
        Ok(())
    }

    fn try_pop(&self, key: &str) -> QueueResult<Option<String>> {
        let mut queues = self.queues.lock().map_err(|_| QueueError::LockPoisoned)?;
        Ok(queues.get_mut(key).and_then(VecDeque::pop_front))
    }

    fn len(&self, key: &str) -> QueueResult<u64> {
        let queues = self.queues.lock().map_err(|_| QueueError::LockPoisoned)?;
        Ok(queues.get(key).map_or(0, |q| q.len() as u64))
    }
}
