// Handler Registry: action name -> request handling logic

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Handlers receive the request's `params` and produce its `result`.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, action: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let action = action.into();
        let handler: Handler = Arc::new(move |params| Box::pin(handler(params)));
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(action.clone(), handler);
        info!("Registered handler for action: {}", action);
    }

    pub fn lookup(&self, action: &str) -> Option<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(action)
            .cloned()
    }

    pub fn actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        actions.sort();
        actions
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn later_registration_wins() {
        let registry = HandlerRegistry::new();
        registry.register("greet", |_| async { Ok(json!("hello")) });
        registry.register("greet", |_| async { Ok(json!("hi")) });

        let handler = registry.lookup("greet").unwrap();
        assert_eq!(handler(json!({})).await.unwrap(), json!("hi"));
        assert_eq!(registry.actions(), vec!["greet"]);
    }

    #[test]
    fn lookup_of_unregistered_action_is_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.lookup("missing").is_none());
    }
}
