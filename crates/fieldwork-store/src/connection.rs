use std::ops::Deref;

use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::{Connector, Namespace, Store};

/// A store handle that is closed when it goes out of scope.
///
/// Opening logs once, dropping closes the underlying handle on every exit
/// path (normal completion, `?` early return, or unwinding).
pub struct Connection<S: Store> {
    store: S,
}

impl<S: Store> Connection<S> {
    pub fn open<C>(connector: &C, namespace: &Namespace) -> Result<Self, StoreError>
    where
        C: Connector<Store = S> + ?Sized,
    {
        let store = connector.open(namespace)?;
        info!(namespace = %namespace, "store connection opened");
        Ok(Self { store })
    }

    /// Wrap an already opened handle.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: Store> Deref for Connection<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.store
    }
}

impl<S: Store> Drop for Connection<S> {
    fn drop(&mut self) {
        let namespace = self.store.namespace().clone();
        match self.store.close() {
            Ok(()) => info!(namespace = %namespace, "store connection closed"),
            Err(e) => warn!(namespace = %namespace, error = %e, "failed to close store connection"),
        }
    }
}
