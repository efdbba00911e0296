//! Tests for mirror creation and attachment

use super::*;
use crate::heap::{ClassDef, ManagedHeap};
use crate::runtime::{RuntimeHandle, RuntimeHandleCache, IDENTITY_CONSTRUCTOR_SIGNATURE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

const WIDGET_CLASS: &str = "test/Widget";

struct Widget {
    slot: MirrorSlot,
    class: Option<&'static str>,
    drops: Arc<AtomicUsize>,
}

impl Widget {
    fn new(cache: &Arc<RuntimeHandleCache>, policy: LockPolicy) -> Self {
        Self {
            slot: MirrorSlot::with_policy(cache.clone(), policy),
            class: Some(WIDGET_CLASS),
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_class(mut self, class: Option<&'static str>) -> Self {
        self.class = class;
        self
    }
}

impl Mirrored for Widget {
    fn mirror_slot(&self) -> &MirrorSlot {
        &self.slot
    }

    fn managed_class_name(&self) -> Option<&str> {
        self.class
    }
}

impl Drop for Widget {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn setup(def: ClassDef) -> (Arc<ManagedHeap>, Arc<RuntimeHandleCache>) {
    let heap = ManagedHeap::new();
    heap.define_class(WIDGET_CLASS, def);
    let cache = Arc::new(RuntimeHandleCache::new());
    cache.set_runtime(RuntimeHandle::from(heap.clone()));
    (heap, cache)
}

fn widget_class() -> ClassDef {
    ClassDef::new().constructor(IDENTITY_CONSTRUCTOR_SIGNATURE)
}

/// A managed object created the way the managed side would
fn foreign_mirror(cache: &RuntimeHandleCache, native: NativeHandle) -> ObjectRef {
    let env = cache.thread_handle();
    let class = env.find_class(WIDGET_CLASS).unwrap();
    let ctor = env.find_constructor(class, IDENTITY_CONSTRUCTOR_SIGNATURE).unwrap();
    let object = env.new_object(class, ctor, native).unwrap();
    env.delete_local_ref(class);
    object
}

#[test]
fn test_mirror_created_once() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared);
    assert_eq!(widget.mirror_slot().state(), MirrorState::NoMirror);

    let first = widget.mirror();
    let second = widget.mirror();

    assert_eq!(first, second);
    assert_eq!(heap.constructions(WIDGET_CLASS), 1);
    assert_eq!(widget.mirror_slot().state(), MirrorState::MirrorPresent);
    assert_eq!(widget.mirror_slot().owner(), Some(Owner::Native));
    assert_eq!(heap.native_of(first), Some(widget.native_handle()));
    // Local reference from construction was released
    assert_eq!(heap.local_ref_count(), 0);
}

#[test]
fn test_created_mirror_survives_collection() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared);
    let mirror = widget.mirror();

    heap.collect();
    assert!(heap.is_alive(mirror));
    assert_eq!(widget.mirror(), mirror);
    assert_eq!(heap.constructions(WIDGET_CLASS), 1);
}

fn concurrent_first_access(policy: LockPolicy) {
    let (heap, cache) = setup(widget_class().construct_delay(Duration::from_millis(20)));
    let widget = Arc::new(Widget::new(&cache, policy));
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let widget = widget.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                widget.mirror()
            })
        })
        .collect();

    let mirrors: Vec<ObjectRef> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();

    assert!(mirrors.iter().all(|mirror| *mirror == mirrors[0]));
    assert_eq!(heap.constructions(WIDGET_CLASS), 1);
    assert_eq!(widget.mirror(), mirrors[0]);
    assert_eq!(widget.mirror_slot().lock_policy(), policy);
}

#[test]
fn test_concurrent_first_access_shared_lock() {
    concurrent_first_access(LockPolicy::Shared);
}

#[test]
fn test_concurrent_first_access_per_object_lock() {
    concurrent_first_access(LockPolicy::PerObject);
}

#[test]
fn test_missing_class_name() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared).with_class(None);

    assert_eq!(widget.try_mirror(), Err(MirrorError::NoClassName));
    assert_eq!(widget.mirror_slot().state(), MirrorState::NoMirror);
    assert_eq!(heap.constructions(WIDGET_CLASS), 0);
}

#[test]
fn test_unknown_class() {
    let (_heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared).with_class(Some("test/Nowhere"));

    assert_eq!(
        widget.try_mirror(),
        Err(MirrorError::ClassNotFound("test/Nowhere".to_string()))
    );
}

#[test]
fn test_missing_constructor_releases_class_ref() {
    let (heap, cache) = setup(ClassDef::new().constructor("()V"));
    let widget = Widget::new(&cache, LockPolicy::Shared);

    assert!(matches!(
        widget.try_mirror(),
        Err(MirrorError::ConstructorNotFound { .. })
    ));
    assert_eq!(heap.local_ref_count(), 0);
}

#[test]
fn test_failed_creation_is_not_cached() {
    let (heap, cache) = setup(widget_class().failing());
    let widget = Widget::new(&cache, LockPolicy::Shared);

    assert_eq!(
        widget.try_mirror(),
        Err(MirrorError::InstantiationFailed(WIDGET_CLASS.to_string()))
    );
    assert_eq!(widget.mirror_slot().state(), MirrorState::NoMirror);

    heap.define_class(WIDGET_CLASS, widget_class());
    let mirror = widget.try_mirror().unwrap();
    assert_eq!(heap.native_of(mirror), Some(widget.native_handle()));
}

#[test]
#[should_panic(expected = "Cannot create mirror without class name")]
fn test_mirror_failure_is_fatal() {
    let (_heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared).with_class(None);
    widget.mirror();
}

#[test]
fn test_set_mirror_same_object_is_idempotent() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared);
    let local = foreign_mirror(&cache, widget.native_handle());

    widget.set_mirror(Some(local), Owner::Native);
    widget.set_mirror(Some(local), Owner::Native);

    assert_eq!(heap.strong_ref_count(), 1);
    assert_eq!(widget.mirror_slot().owner(), Some(Owner::Native));
    assert_eq!(heap.constructions(WIDGET_CLASS), 1);
    // The attached mirror is returned; none is created
    let env = cache.thread_handle();
    assert!(env.is_same_object(Some(widget.mirror()), Some(local)));
    assert_eq!(heap.constructions(WIDGET_CLASS), 1);
}

#[test]
fn test_set_mirror_different_object_is_rejected() {
    let (_heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared);
    let first = foreign_mirror(&cache, widget.native_handle());
    let second = foreign_mirror(&cache, widget.native_handle());

    widget.set_mirror(Some(first), Owner::Managed);
    assert_eq!(
        widget.try_set_mirror(Some(second), Owner::Managed),
        Err(MirrorError::AlreadyAttached)
    );
    let env = cache.thread_handle();
    assert!(env.is_same_object(widget.mirror_slot().get(), Some(first)));
}

#[test]
#[should_panic(expected = "Mirror already set to a different instance")]
fn test_set_mirror_different_object_is_fatal() {
    let (_heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::PerObject);
    let created = widget.mirror();
    let other = foreign_mirror(&cache, widget.native_handle());

    assert!(widget.try_set_mirror(Some(created), Owner::Native).is_ok());
    widget.set_mirror(Some(other), Owner::Native);
}

#[test]
fn test_managed_owned_mirror_is_weak() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared);
    let local = foreign_mirror(&cache, widget.native_handle());

    widget.set_mirror(Some(local), Owner::Managed);
    assert_eq!(widget.mirror_slot().owner(), Some(Owner::Managed));
    assert_eq!(heap.weak_ref_count(), 1);

    heap.collect();
    assert_eq!(widget.mirror_slot().state(), MirrorState::MirrorPresent);

    cache.thread_handle().delete_local_ref(local);
    heap.collect();
    assert_eq!(widget.mirror_slot().state(), MirrorState::NoMirror);
}

#[test]
fn test_collected_managed_mirror_is_not_recreated() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared);
    let local = foreign_mirror(&cache, widget.native_handle());
    widget.set_mirror(Some(local), Owner::Managed);

    cache.thread_handle().delete_local_ref(local);
    heap.collect();

    assert_eq!(widget.try_mirror(), Err(MirrorError::Collected));
    assert_eq!(heap.constructions(WIDGET_CLASS), 1);
    assert_eq!(widget.mirror_slot().owner(), Some(Owner::Managed));
    assert_eq!(heap.strong_ref_count(), 0);
}

#[test]
#[should_panic(expected = "native object is pending destruction")]
fn test_collected_managed_mirror_is_fatal() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::PerObject);
    let local = foreign_mirror(&cache, widget.native_handle());
    widget.set_mirror(Some(local), Owner::Managed);

    cache.thread_handle().delete_local_ref(local);
    heap.collect();
    widget.mirror();
}

#[test]
fn test_detach_with_none() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared);
    widget.mirror();

    widget.set_mirror(None, Owner::Managed);
    assert_eq!(widget.mirror_slot().state(), MirrorState::NoMirror);
    assert_eq!(heap.strong_ref_count(), 0);

    // Detaching an empty slot is a no-op
    widget.set_mirror(None, Owner::Managed);
}

#[test]
fn test_native_drop_notifies_and_releases() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared);
    let drops = widget.drops.clone();
    let mirror = widget.mirror();

    drop(widget);

    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(heap.teardown_notifications(), 1);
    assert_eq!(heap.strong_ref_count(), 0);
    assert_eq!(heap.mismatched_releases(), 0);
    assert_eq!(heap.collect().collected, 1);
    assert!(!heap.is_alive(mirror));
}

#[test]
fn test_clear_for_destroy_skips_notification() {
    let (heap, cache) = setup(widget_class());
    let widget = Widget::new(&cache, LockPolicy::Shared);
    let local = foreign_mirror(&cache, widget.native_handle());
    widget.set_mirror(Some(local), Owner::Managed);

    widget.mirror_slot().clear_for_destroy();
    drop(widget);

    assert_eq!(heap.teardown_notifications(), 0);
    assert_eq!(heap.weak_ref_count(), 0);
    assert!(!heap.is_orphaned(local));
}

#[test]
fn test_lock_policy_parsing() {
    assert_eq!("shared".parse::<LockPolicy>(), Ok(LockPolicy::Shared));
    assert_eq!("Per-Object".parse::<LockPolicy>(), Ok(LockPolicy::PerObject));
    assert!("global".parse::<LockPolicy>().is_err());
    assert_eq!(LockPolicy::PerObject.to_string(), "per-object");
}
