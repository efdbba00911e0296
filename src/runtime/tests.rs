//! Tests for runtime handle caching

use super::*;
use crate::heap::ManagedHeap;
use std::sync::mpsc;

#[test]
fn test_runtime_unset_by_default() {
    let cache = RuntimeHandleCache::new();
    assert!(cache.runtime().is_none());
    assert!(!cache.has_thread_handle());
    assert!(matches!(cache.try_thread_handle(), Err(RuntimeError::NoRuntime)));
}

#[test]
fn test_set_runtime_same_instance_is_noop() {
    let heap = ManagedHeap::new();
    let cache = RuntimeHandleCache::new();

    cache.set_runtime(RuntimeHandle::from(heap.clone()));
    cache.set_runtime(RuntimeHandle::from(heap.clone()));

    assert_eq!(cache.runtime(), Some(RuntimeHandle::from(heap)));
}

#[test]
fn test_set_runtime_conflict_is_reported() {
    let cache = RuntimeHandleCache::new();
    cache.set_runtime(RuntimeHandle::from(ManagedHeap::new()));

    let other = RuntimeHandle::from(ManagedHeap::new());
    assert_eq!(
        cache.try_set_runtime(other),
        Err(crate::error::BridgeError::RuntimeConflict)
    );
}

#[test]
#[should_panic(expected = "already set to a different instance")]
fn test_set_runtime_conflict_is_fatal() {
    let cache = RuntimeHandleCache::new();
    cache.set_runtime(RuntimeHandle::from(ManagedHeap::new()));
    cache.set_runtime(RuntimeHandle::from(ManagedHeap::new()));
}

#[test]
#[should_panic(expected = "No managed runtime set")]
fn test_thread_handle_without_runtime_is_fatal() {
    RuntimeHandleCache::new().thread_handle();
}

#[test]
#[should_panic(expected = "Thread attach failed")]
fn test_attach_failure_is_fatal() {
    let heap = ManagedHeap::new();
    heap.refuse_attach(true);
    let cache = RuntimeHandleCache::new();
    cache.set_runtime(RuntimeHandle::from(heap));
    cache.thread_handle();
}

#[test]
fn test_thread_handle_is_cached() {
    let heap = ManagedHeap::new();
    let cache = RuntimeHandleCache::new();
    cache.set_runtime(RuntimeHandle::from(heap.clone()));

    let first = cache.thread_handle();
    let second = cache.thread_handle();

    assert!(first.ptr_eq(&second));
    assert!(cache.has_thread_handle());
    assert_eq!(heap.attach_count(), 1);
}

#[test]
fn test_each_thread_attaches_once() {
    let heap = ManagedHeap::new();
    let cache = Arc::new(RuntimeHandleCache::new());
    cache.set_runtime(RuntimeHandle::from(heap.clone()));
    cache.thread_handle();

    let (tx, rx) = mpsc::channel();
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            let tx = tx.clone();
            std::thread::spawn(move || {
                let first = cache.thread_handle();
                let second = cache.thread_handle();
                tx.send(first.ptr_eq(&second)).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    drop(tx);

    assert!(rx.iter().all(|same| same));
    assert_eq!(heap.attach_count(), 5);
}

#[test]
fn test_caches_are_independent() {
    let heap = ManagedHeap::new();
    let first = RuntimeHandleCache::new();
    let second = RuntimeHandleCache::new();
    first.set_runtime(RuntimeHandle::from(heap.clone()));
    second.set_runtime(RuntimeHandle::from(heap.clone()));

    let a = first.thread_handle();
    let b = second.thread_handle();
    assert!(!a.ptr_eq(&b));
    assert_eq!(heap.attach_count(), 2);
}

#[test]
fn test_handles_round_trip_raw() {
    assert!(ObjectRef::from_raw(0).is_none());
    assert_eq!(ObjectRef::from_raw(7).map(ObjectRef::as_raw), Some(7));
    assert!(MethodRef::from_raw(0).is_none());

    let value = 5u32;
    let handle = NativeHandle::of(&value);
    assert_eq!(handle.as_raw(), &value as *const u32 as usize as u64);
    assert!(!handle.is_null());
    assert!(NativeHandle::from_raw(0).is_null());
}
