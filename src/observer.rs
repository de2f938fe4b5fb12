use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::Mutex;

use crate::telegram::models::Update;

#[derive(Debug, Clone, PartialEq)]
pub struct BotCommandArgument {
    pub command: String,
    pub argument: String,
    pub chat_id: i64,
    pub message_id: i64,
    pub update: Update,
}

pub type CommandHandler = Arc<dyn Fn(BotCommandArgument) -> BoxFuture<'static, ()> + Send + Sync>;
pub type SystemHandler<P> = Arc<dyn Fn(P) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct BotCommandObservers {
    handlers: Mutex<HashMap<String, CommandHandler>>,
}

impl BotCommandObservers {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, handler: CommandHandler, observer_id: &str) {
        self.handlers
            .lock()
            .await
            .insert(observer_id.to_owned(), handler);
    }

    pub async fn unregister(&self, observer_id: &str) -> bool {
        self.handlers.lock().await.remove(observer_id).is_some()
    }

    pub async fn notify_all(&self, argument: BotCommandArgument) -> usize {
        let handlers = self
            .handlers
            .lock()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for handler in &handlers {
            handler(argument.clone()).await;
        }
        handlers.len()
    }

    pub async fn len(&self) -> usize {
        self.handlers.lock().await.len()
    }
}

impl Default for BotCommandObservers {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SystemObservers<P> {
    groups: Mutex<HashMap<String, Vec<(String, SystemHandler<P>)>>>,
}

impl<P: Clone + Send + 'static> SystemObservers<P> {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, handler: SystemHandler<P>, observer_id: &str, group: &str) {
        let mut groups = self.groups.lock().await;
        let entries = groups.entry(group.to_owned()).or_default();
        if let Some(entry) = entries.iter_mut().find(|(id, _)| id == observer_id) {
            entry.1 = handler;
            return;
        }
        entries.push((observer_id.to_owned(), handler));
    }

    pub async fn unregister(&self, group: &str, observer_id: &str) -> bool {
        let mut groups = self.groups.lock().await;
        let Some(entries) = groups.get_mut(group) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(id, _)| id != observer_id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            groups.remove(group);
        }
        removed
    }

    pub async fn notify_all(&self, group: &str, payload: P) -> usize {
        let handlers = match self.groups.lock().await.get(group) {
            Some(entries) => entries
                .iter()
                .map(|(_, handler)| handler.clone())
                .collect::<Vec<_>>(),
            None => return 0,
        };
        for handler in &handlers {
            handler(payload.clone()).await;
        }
        handlers.len()
    }

    pub async fn observer_ids(&self, group: &str) -> Vec<String> {
        self.groups
            .lock()
            .await
            .get(group)
            .map(|entries| entries.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn has_group(&self, group: &str) -> bool {
        self.groups.lock().await.contains_key(group)
    }
}

impl<P: Clone + Send + 'static> Default for SystemObservers<P> {
    fn default() -> Self {
        Self::new()
    }
}
