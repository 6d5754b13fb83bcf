//! Runtime classification-based routing.
//!
//! A [`Router`] asks a routing function for a route name per dispatch and
//! runs the middleware registered under that name:
//!
//! ```rust,ignore
//! let mut router = Router::new(|ctx| {
//!     let data = ctx.callback_query()?.data.as_deref()?;
//!     let (route, arg) = data.split_once(':')?;
//!     Some(Route::new(route).with_state(json!({ "arg": arg }).as_object()?.clone()))
//! });
//! router.on("like", [like_handler])?;
//! router.otherwise([reply("unknown action")])?;
//!
//! bot.push(router);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use weft_core::{BoxedMiddleware, Context, Extensions, IntoMiddleware};

use crate::combinators::{lazy, pass_thru};
use crate::composer::compose;
use crate::error::{SetupError, SetupResult};

/// The outcome of a routing function.
#[derive(Debug)]
pub struct Route {
    /// Name of the middleware group to dispatch.
    pub route: String,
    /// Merged into the context's scratch state before dispatch.
    pub state: Option<Map<String, Value>>,
    /// Moved onto the context before dispatch.
    pub extensions: Option<Extensions>,
}

impl Route {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            state: None,
            extensions: None,
        }
    }

    pub fn with_state(mut self, state: Map<String, Value>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = Some(extensions);
        self
    }
}

type RouteFn = dyn Fn(&Context) -> Option<Route> + Send + Sync;

/// Dispatches to named middleware groups chosen per update.
#[derive(Clone)]
pub struct Router {
    route_fn: Arc<RouteFn>,
    handlers: HashMap<String, BoxedMiddleware>,
    otherwise: BoxedMiddleware,
}

impl Router {
    /// Creates a router around `route_fn`.
    pub fn new<F>(route_fn: F) -> Self
    where
        F: Fn(&Context) -> Option<Route> + Send + Sync + 'static,
    {
        Self {
            route_fn: Arc::new(route_fn),
            handlers: HashMap::new(),
            otherwise: pass_thru(),
        }
    }

    /// Registers `units` under `route`, replacing any previous group.
    ///
    /// Fails with [`SetupError::EmptyHandlers`] when `units` is empty.
    pub fn on(
        &mut self,
        route: impl Into<String>,
        units: impl IntoIterator<Item = BoxedMiddleware>,
    ) -> SetupResult<&mut Self> {
        let units: Vec<BoxedMiddleware> = units.into_iter().collect();
        if units.is_empty() {
            return Err(SetupError::EmptyHandlers);
        }
        self.handlers.insert(route.into(), compose(units));
        Ok(self)
    }

    /// Sets the middleware used when no route applies.
    pub fn otherwise(
        &mut self,
        units: impl IntoIterator<Item = BoxedMiddleware>,
    ) -> SetupResult<&mut Self> {
        let units: Vec<BoxedMiddleware> = units.into_iter().collect();
        if units.is_empty() {
            return Err(SetupError::EmptyHandlers);
        }
        self.otherwise = compose(units);
        Ok(self)
    }

    /// Returns the routing middleware.
    pub fn middleware(&self) -> BoxedMiddleware {
        let route_fn = Arc::clone(&self.route_fn);
        let handlers = self.handlers.clone();
        let otherwise = self.otherwise.clone();
        lazy(move |ctx| {
            let Some(route) = route_fn(ctx) else {
                return Some(otherwise.clone());
            };
            if let Some(state) = route.state {
                ctx.merge_state(state);
            }
            if let Some(extensions) = route.extensions {
                ctx.extend_extensions(extensions);
            }
            debug!(route = %route.route, "routing update");
            Some(
                handlers
                    .get(&route.route)
                    .unwrap_or(&otherwise)
                    .clone(),
            )
        })
    }
}

impl IntoMiddleware for Router {
    fn into_middleware(self) -> BoxedMiddleware {
        self.middleware()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use weft_core::{Next, Update, handler_fn};

    fn callback_ctx(data: &str) -> Arc<Context> {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "callback_query": { "id": "q", "from": { "id": 1, "first_name": "Ada" }, "data": data }
        }))
        .unwrap();
        Arc::new(Context::detached(update))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> BoxedMiddleware {
        let log = Arc::clone(log);
        handler_fn(move |ctx| {
            let log = Arc::clone(&log);
            async move {
                let arg = ctx.state_get("arg").and_then(|v| v.as_str().map(str::to_string));
                log.lock().push(format!("{name}:{}", arg.unwrap_or_default()));
                Ok(())
            }
        })
    }

    #[derive(Clone, Debug, PartialEq)]
    struct RouteTag(&'static str);

    fn router(log: &Arc<Mutex<Vec<String>>>) -> Router {
        let mut router = Router::new(|ctx| {
            let data = ctx.callback_query()?.data.as_deref()?;
            let (route, arg) = data.split_once(':')?;
            let mut extensions = Extensions::new();
            extensions.insert(RouteTag("routed"));
            let state = json!({ "arg": arg }).as_object().cloned()?;
            Some(Route::new(route).with_state(state).with_extensions(extensions))
        });
        router.on("like", [recorder(log, "like")]).unwrap();
        router.otherwise([recorder(log, "otherwise")]).unwrap();
        router
    }

    #[tokio::test]
    async fn test_routes_and_merges_patches() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = router(&log).middleware();
        let ctx = callback_ctx("like:42");
        chain.call(Arc::clone(&ctx), Next::noop()).await.unwrap();
        assert_eq!(*log.lock(), vec!["like:42".to_string()]);
        assert_eq!(ctx.extension::<RouteTag>(), Some(RouteTag("routed")));
    }

    #[tokio::test]
    async fn test_unmatched_and_unknown_routes_use_otherwise() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = router(&log).into_middleware();
        chain.call(callback_ctx("plain"), Next::noop()).await.unwrap();
        chain.call(callback_ctx("share:7"), Next::noop()).await.unwrap();
        assert_eq!(
            *log.lock(),
            vec!["otherwise:".to_string(), "otherwise:7".to_string()]
        );
    }

    #[test]
    fn test_empty_handlers_rejected() {
        let mut router = Router::new(|_ctx| None);
        assert_eq!(router.on("x", []).unwrap_err(), SetupError::EmptyHandlers);
        assert_eq!(router.otherwise(Vec::new()).unwrap_err(), SetupError::EmptyHandlers);
    }
}
