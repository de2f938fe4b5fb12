use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::aria2::RpcRequest;
use crate::observer::BotCommandArgument;
use crate::poll::SearchSession;

#[derive(Debug, Clone)]
pub enum CorrelationValue {
    PendingCommand(BotCommandArgument),
    PendingRequest(RpcRequest),
    SearchPage(SearchSession),
}

pub type CorrelationCache = SingleUseCache<CorrelationValue>;

pub struct SingleUseCache<V> {
    entries: Mutex<HashMap<String, V>>,
}

impl<V> SingleUseCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn put(&self, key: impl Into<String>, value: V) {
        self.entries.lock().await.insert(key.into(), value);
    }

    // Removes and returns the value under `key`. Lookup and removal happen
    // under one lock, so two concurrent readers never both observe it.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.entries.lock().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl<V> Default for SingleUseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
