use std::pin::Pin;
use std::task::{Context, Poll};

use async_channel::Receiver;
use futures::Stream;

use crate::store::error::StoreResult;

type Remover = Box<dyn FnOnce() + Send + 'static>;

/// Handle of an active snapshot listener.
///
/// Delivery stops when the registration is detached or dropped.
pub struct ListenerRegistration {
    remover: Option<Remover>,
}

impl ListenerRegistration {
    pub(crate) fn new<F>(remover: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            remover: Some(Box::new(remover)),
        }
    }

    pub fn detach(mut self) {
        if let Some(remover) = self.remover.take() {
            remover();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(remover) = self.remover.take() {
            remover();
        }
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.remover.is_some())
            .finish()
    }
}

/// Snapshots of a listener as a `Stream`. Dropping the stream unsubscribes.
pub struct SnapshotStream<T> {
    receiver: Pin<Box<Receiver<StoreResult<T>>>>,
    _registration: ListenerRegistration,
}

impl<T> SnapshotStream<T> {
    pub(crate) fn new(receiver: Receiver<StoreResult<T>>, registration: ListenerRegistration) -> Self {
        Self {
            receiver: Box::pin(receiver),
            _registration: registration,
        }
    }
}

impl<T> Stream for SnapshotStream<T> {
    type Item = StoreResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn detach_and_drop_run_the_remover_once() {
        let removed = Arc::new(AtomicUsize::new(0));
        let registration = ListenerRegistration::new({
            let removed = removed.clone();
            move || {
                removed.fetch_add(1, Ordering::SeqCst);
            }
        });
        registration.detach();
        assert_eq!(removed.load(Ordering::SeqCst), 1);

        {
            let _registration = ListenerRegistration::new({
                let removed = removed.clone();
                move || {
                    removed.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        assert_eq!(removed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stream_yields_sent_snapshots() {
        use futures::StreamExt;

        let (sender, receiver) = async_channel::unbounded();
        let mut stream = SnapshotStream::new(receiver, ListenerRegistration::new(|| {}));
        sender.try_send(Ok(7u32)).unwrap();
        let next = futures::executor::block_on(stream.next());
        assert_eq!(next.unwrap().unwrap(), 7);
    }
}
