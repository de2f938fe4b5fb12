use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone)]
pub struct Delivery<E> {
    pub topic: String,
    pub subscription: SubscriptionId,
    pub event: E,
}

pub type BusHandler<E> = Arc<dyn Fn(Delivery<E>) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct EventBus<E> {
    topics: Mutex<HashMap<String, Vec<(SubscriptionId, BusHandler<E>)>>>,
    next_id: AtomicU64,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn subscribe(&self, topic: &str, handler: BusHandler<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.topics
            .lock()
            .await
            .entry(topic.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    pub async fn unsubscribe(&self, topic: &str, subscription: SubscriptionId) -> bool {
        let mut topics = self.topics.lock().await;
        let Some(handlers) = topics.get_mut(topic) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != subscription);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            topics.remove(topic);
        }
        removed
    }

    // Handlers run one after another outside the registry lock, so they may
    // subscribe and unsubscribe while the event is being delivered.
    pub async fn publish(&self, topic: &str, event: E) -> usize {
        let handlers = match self.topics.lock().await.get(topic) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };
        for (subscription, handler) in &handlers {
            handler(Delivery {
                topic: topic.to_owned(),
                subscription: *subscription,
                event: event.clone(),
            })
            .await;
        }
        handlers.len()
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .await
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.lock().await.len()
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
