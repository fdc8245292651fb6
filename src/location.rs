use crate::Coordinate;
use std::sync::{Arc, RwLock};

/// Polled position snapshot: "current coordinate, or none yet". The loop
/// never blocks on a fix; a `None` snapshot skips the cycle.
pub trait LocationProvider {
    fn current_position(&self) -> Option<Coordinate>;
}

impl<L: LocationProvider> LocationProvider for Arc<L> {
    fn current_position(&self) -> Option<Coordinate> {
        (**self).current_position()
    }
}

/// Shared snapshot cell. A GPS feed task writes it, the navigation loop
/// reads it. Cloning shares the same cell.
#[derive(Clone, Debug, Default)]
pub struct SharedPosition {
    inner: Arc<RwLock<Option<Coordinate>>>,
}

impl SharedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, coordinate: Coordinate) {
        let mut slot = self.inner.write().expect("position cell poisoned");
        *slot = Some(coordinate);
    }

    pub fn clear(&self) {
        let mut slot = self.inner.write().expect("position cell poisoned");
        *slot = None;
    }
}

impl LocationProvider for SharedPosition {
    fn current_position(&self) -> Option<Coordinate> {
        *self.inner.read().expect("position cell poisoned")
    }
}
