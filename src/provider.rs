//! Scoped access to a shared engine.
//!
//! A [`TipKitProvider`] installs a [`TipKit`] for the current (UI) thread for
//! as long as the guard lives. Components deep in the tree reach it through
//! [`use_tip_kit`] instead of threading the engine through every call.
//! Providers nest; the innermost live one wins.

use log::error;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{TipError, TipResult};
use crate::tipkit::TipKit;

thread_local! {
    static INSTALLED: RefCell<Vec<Arc<TipKit>>> = const { RefCell::new(Vec::new()) };
}

/// Guard keeping an engine installed on this thread.
#[derive(Debug)]
pub struct TipKitProvider {
    engine: Arc<TipKit>,
    // Tied to the installing thread
    _thread: PhantomData<*const ()>,
}

impl TipKitProvider {
    pub fn install(engine: Arc<TipKit>) -> Self {
        INSTALLED.with(|stack| stack.borrow_mut().push(Arc::clone(&engine)));
        Self {
            engine,
            _thread: PhantomData,
        }
    }

    pub fn engine(&self) -> &Arc<TipKit> {
        &self.engine
    }
}

impl Drop for TipKitProvider {
    fn drop(&mut self) {
        INSTALLED.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|e| Arc::ptr_eq(e, &self.engine)) {
                stack.remove(pos);
            }
        });
    }
}

/// The engine installed by the innermost live provider on this thread.
///
/// Calling this outside any provider is a programming error and returns
/// [`TipError::NoProvider`].
pub fn use_tip_kit() -> TipResult<Arc<TipKit>> {
    INSTALLED
        .with(|stack| stack.borrow().last().cloned())
        .ok_or_else(|| {
            error!("use_tip_kit called outside a TipKitProvider");
            TipError::NoProvider
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_outside_provider_fails() {
        assert!(matches!(use_tip_kit(), Err(TipError::NoProvider)));
    }

    #[test]
    fn test_provider_scope() {
        let engine = Arc::new(TipKit::in_memory());
        {
            let provider = TipKitProvider::install(Arc::clone(&engine));
            let found = use_tip_kit().unwrap();
            assert!(Arc::ptr_eq(&found, provider.engine()));
        }
        assert!(matches!(use_tip_kit(), Err(TipError::NoProvider)));
    }

    #[test]
    fn test_nested_providers_shadow_outer() {
        let outer = Arc::new(TipKit::in_memory());
        let inner = Arc::new(TipKit::in_memory());

        let _outer_guard = TipKitProvider::install(Arc::clone(&outer));
        {
            let _inner_guard = TipKitProvider::install(Arc::clone(&inner));
            assert!(Arc::ptr_eq(&use_tip_kit().unwrap(), &inner));
        }
        assert!(Arc::ptr_eq(&use_tip_kit().unwrap(), &outer));
    }

    #[test]
    fn test_provider_is_thread_local() {
        let _guard = TipKitProvider::install(Arc::new(TipKit::in_memory()));
        let other = std::thread::spawn(|| use_tip_kit().is_err()).join().unwrap();
        assert!(other);
    }
}
