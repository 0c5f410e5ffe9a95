use std::error::Error;
use std::sync::Arc;

pub type NextFn<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;
pub type ErrorFn = Arc<dyn Fn(&dyn Error) + Send + Sync + 'static>;

/// Callback pair handed to subscription APIs.
///
/// Either half may be omitted; a missing `error` callback silently drops
/// failures after they have been logged by the caller.
pub struct PartialObserver<T> {
    pub next: Option<NextFn<T>>,
    pub error: Option<ErrorFn>,
}

impl<T> PartialObserver<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_next<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.next = Some(Arc::new(callback));
        self
    }

    pub fn with_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn Error) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(callback));
        self
    }

    pub fn notify_next(&self, value: &T) {
        if let Some(next) = &self.next {
            next(value);
        }
    }

    pub fn notify_error(&self, error: &dyn Error) {
        if let Some(callback) = &self.error {
            callback(error);
        }
    }
}

impl<T> Clone for PartialObserver<T> {
    fn clone(&self) -> Self {
        Self {
            next: self.next.clone(),
            error: self.error.clone(),
        }
    }
}

impl<T> Default for PartialObserver<T> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
        }
    }
}

/// Handle returned by callback-style subscriptions; calling it stops delivery.
pub type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }

    impl Error for Boom {}

    #[test]
    fn observer_dispatches_to_both_halves() {
        let hits = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let observer = PartialObserver::<u32>::new()
            .with_next({
                let hits = hits.clone();
                move |value| {
                    hits.fetch_add(*value as usize, Ordering::SeqCst);
                }
            })
            .with_error({
                let errors = errors.clone();
                move |err| {
                    assert_eq!(err.to_string(), "boom");
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            });

        observer.notify_next(&3);
        observer.clone().notify_next(&2);
        observer.notify_error(&Boom);

        assert_eq!(hits.load(Ordering::SeqCst), 5);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_callbacks_are_ignored() {
        let observer = PartialObserver::<String>::new();
        observer.notify_next(&"ignored".to_string());
        observer.notify_error(&Boom);
    }
}
