//! `innerWindowId` → caller routing for status reports.

use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::{EngineStatus, Generation, InnerWindowId};

/// Receives status reports for the sessions it started.
///
/// Implementations are called from the manager's message loop and must not
/// block.
pub trait EngineCaller: Send + Sync {
    fn on_engine_status(&self, inner_window_id: InnerWindowId, status: EngineStatus);
}

struct Route {
    generation: Generation,
    caller: Arc<dyn EngineCaller>,
}

/// Maps each window id to the caller that owns its current session, so
/// reports are delivered to one caller instead of broadcast.  A route only
/// answers for the session generation it was registered with.
#[derive(Default)]
pub struct RequestRouter {
    routes: HashMap<InnerWindowId, Route>,
}

impl std::fmt::Debug for RequestRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self
            .routes
            .iter()
            .map(|(id, route)| (id.0, route.generation.0))
            .collect();
        ids.sort_unstable();
        f.debug_struct("RequestRouter").field("routes", &ids).finish()
    }
}

impl RequestRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `caller` for session `generation` of `inner_window_id`,
    /// replacing any previous route for the window.
    pub fn register(
        &mut self,
        inner_window_id: InnerWindowId,
        generation: Generation,
        caller: Arc<dyn EngineCaller>,
    ) {
        let route = Route { generation, caller };
        if let Some(previous) = self.routes.insert(inner_window_id, route) {
            log::debug!(
                "router: window {} moved from generation {} to {}",
                inner_window_id.0,
                previous.generation.0,
                generation.0
            );
        }
    }

    pub fn remove(&mut self, inner_window_id: InnerWindowId) -> Option<Arc<dyn EngineCaller>> {
        self.routes.remove(&inner_window_id).map(|route| route.caller)
    }

    /// Caller of `inner_window_id`, if its current session is `generation`.
    pub fn caller(
        &self,
        inner_window_id: InnerWindowId,
        generation: Generation,
    ) -> Option<Arc<dyn EngineCaller>> {
        self.routes
            .get(&inner_window_id)
            .filter(|route| route.generation == generation)
            .map(|route| Arc::clone(&route.caller))
    }

    /// Like [`caller`](Self::caller), but also removes the route.
    pub fn take(
        &mut self,
        inner_window_id: InnerWindowId,
        generation: Generation,
    ) -> Option<Arc<dyn EngineCaller>> {
        self.caller(inner_window_id, generation)?;
        self.remove(inner_window_id)
    }

    pub fn contains(&self, inner_window_id: InnerWindowId) -> bool {
        self.routes.contains_key(&inner_window_id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Remove and return every registration.
    pub fn drain(&mut self) -> Vec<(InnerWindowId, Arc<dyn EngineCaller>)> {
        self.routes
            .drain()
            .map(|(id, route)| (id, route.caller))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(InnerWindowId, EngineStatus)>>);

    impl EngineCaller for Recorder {
        fn on_engine_status(&self, inner_window_id: InnerWindowId, status: EngineStatus) {
            self.0.lock().unwrap().push((inner_window_id, status));
        }
    }

    #[test]
    fn routes_to_registered_caller_only() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let mut router = RequestRouter::new();
        router.register(InnerWindowId(1), Generation(0), a.clone());
        router.register(InnerWindowId(2), Generation(1), b.clone());

        router
            .caller(InnerWindowId(1), Generation(0))
            .unwrap()
            .on_engine_status(InnerWindowId(1), EngineStatus::Ready);

        assert_eq!(*a.0.lock().unwrap(), vec![(InnerWindowId(1), EngineStatus::Ready)]);
        assert!(b.0.lock().unwrap().is_empty());
        assert!(router.caller(InnerWindowId(3), Generation(0)).is_none());
    }

    #[test]
    fn stale_generation_is_not_routed() {
        let mut router = RequestRouter::new();
        router.register(InnerWindowId(1), Generation(0), Arc::new(Recorder::default()));
        router.register(InnerWindowId(1), Generation(4), Arc::new(Recorder::default()));

        assert!(router.caller(InnerWindowId(1), Generation(0)).is_none());
        assert!(router.take(InnerWindowId(1), Generation(0)).is_none());
        assert!(router.contains(InnerWindowId(1)));

        assert!(router.take(InnerWindowId(1), Generation(4)).is_some());
        assert!(!router.contains(InnerWindowId(1)));
    }

    #[test]
    fn remove_and_drain() {
        let mut router = RequestRouter::new();
        router.register(InnerWindowId(1), Generation(0), Arc::new(Recorder::default()));
        router.register(InnerWindowId(2), Generation(1), Arc::new(Recorder::default()));
        assert_eq!(router.len(), 2);

        assert!(router.remove(InnerWindowId(1)).is_some());
        assert!(!router.contains(InnerWindowId(1)));
        assert!(router.remove(InnerWindowId(1)).is_none());

        let drained = router.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, InnerWindowId(2));
        assert!(router.is_empty());
    }
}
