//! In-process managed runtime
//!
//! Design: a small garbage-collected object heap implementing
//! `ManagedRuntime`, for hosts without an external VM and for tests.
//! 1. Object table - class objects (pinned), instances and direct buffers
//! 2. Reference tables - local, strong and weak references
//! 3. Collection - everything not held by a local or strong reference is
//!    freed; weak references to it start comparing equal to null
//! 4. Finalization - collected instances of `finalizes_native` classes hand
//!    their native peer to the registered finalizer

mod class;
mod thread;


pub use class::ClassDef;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use parking_lot::{Mutex, RwLock};

use crate::error::RuntimeError;
use crate::logging::{log_collection, trace, warn};
use crate::runtime::{ManagedRuntime, NativeHandle, ObjectRef, ThreadHandle};

use thread::HeapThread;

type Finalizer = Arc<dyn Fn(NativeHandle) + Send + Sync>;

/// Kind of a reference table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Local,
    Strong,
    Weak,
}

/// Result of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub collected: usize,
    pub finalized: usize,
    pub live: usize,
}

enum ObjectKind {
    Class { name: String, def: ClassDef },
    Instance { class: String },
    /// View of native memory; collecting it never touches the memory
    Buffer { address: u64, capacity: usize },
}

impl ObjectKind {
    /// Class objects are pinned; everything else is collectable
    #[inline]
    fn is_collectable(&self) -> bool {
        !matches!(self, Self::Class { .. })
    }
}

struct HeapObject {
    kind: ObjectKind,
    native: Option<NativeHandle>,
    orphaned: bool,
}

struct RefEntry {
    object: u64,
    kind: RefKind,
    thread: ThreadId,
}

#[derive(Default)]
struct HeapState {
    next_id: u64,
    objects: HashMap<u64, HeapObject>,
    refs: HashMap<u64, RefEntry>,
    classes: HashMap<String, u64>,
    methods: Vec<(u64, String)>,
    constructions: HashMap<String, usize>,
}

impl HeapState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn new_ref(&mut self, object: u64, kind: RefKind) -> ObjectRef {
        let id = self.alloc_id();
        self.refs.insert(
            id,
            RefEntry {
                object,
                kind,
                thread: std::thread::current().id(),
            },
        );
        // Ids start at 1
        ObjectRef::from_raw(id).unwrap_or_else(|| unreachable!())
    }

    /// Live object behind a reference; `None` for dead weak references
    fn resolve(&self, reference: ObjectRef) -> Option<u64> {
        let entry = self.refs.get(&reference.as_raw())?;
        self.objects.contains_key(&entry.object).then_some(entry.object)
    }

    fn class_of(&self, reference: ObjectRef) -> Result<(u64, &str, &ClassDef), RuntimeError> {
        let id = self
            .resolve(reference)
            .ok_or(RuntimeError::InvalidReference(reference.as_raw()))?;
        match self.objects.get(&id).map(|object| &object.kind) {
            Some(ObjectKind::Class { name, def }) => Ok((id, name.as_str(), def)),
            _ => Err(RuntimeError::InvalidReference(reference.as_raw())),
        }
    }
}

/// Garbage-collected managed heap
pub struct ManagedHeap {
    me: Weak<ManagedHeap>,
    state: Mutex<HeapState>,
    finalizer: RwLock<Option<Finalizer>>,
    refuse_attach: AtomicBool,
    attaches: AtomicUsize,
    notifications: AtomicUsize,
    mismatched_releases: AtomicUsize,
}

impl ManagedHeap {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            state: Mutex::new(HeapState::default()),
            finalizer: RwLock::new(None),
            refuse_attach: AtomicBool::new(false),
            attaches: AtomicUsize::new(0),
            notifications: AtomicUsize::new(0),
            mismatched_releases: AtomicUsize::new(0),
        })
    }

    /// Register (or redefine) a class
    pub fn define_class(&self, name: &str, def: ClassDef) {
        let mut state = self.state.lock();
        if let Some(id) = state.classes.get(name).copied() {
            if let Some(object) = state.objects.get_mut(&id) {
                object.kind = ObjectKind::Class {
                    name: name.to_string(),
                    def,
                };
            }
            return;
        }

        let id = state.alloc_id();
        state.objects.insert(
            id,
            HeapObject {
                kind: ObjectKind::Class {
                    name: name.to_string(),
                    def,
                },
                native: None,
                orphaned: false,
            },
        );
        state.classes.insert(name.to_string(), id);
    }

    /// Called with the native peer of every finalized `finalizes_native`
    /// instance, outside the heap lock
    pub fn set_finalizer(&self, finalizer: impl Fn(NativeHandle) + Send + Sync + 'static) {
        *self.finalizer.write() = Some(Arc::new(finalizer));
    }

    /// Make subsequent attach attempts fail
    #[cfg(any(test, feature = "testing"))]
    pub fn refuse_attach(&self, refuse: bool) {
        self.refuse_attach.store(refuse, Ordering::Relaxed);
    }

    /// Free every instance not held by a local or strong reference
    pub fn collect(&self) -> CollectStats {
        let (stats, natives) = {
            let mut state = self.state.lock();

            let roots: HashSet<u64> = state
                .refs
                .values()
                .filter(|entry| entry.kind != RefKind::Weak)
                .map(|entry| entry.object)
                .collect();

            let dead: Vec<u64> = state
                .objects
                .iter()
                .filter(|(id, object)| {
                    object.kind.is_collectable() && !roots.contains(*id)
                })
                .map(|(id, _)| *id)
                .collect();

            let mut natives = Vec::new();
            for id in &dead {
                let Some(object) = state.objects.remove(id) else {
                    continue;
                };
                let ObjectKind::Instance { class } = &object.kind else {
                    continue;
                };
                let finalizes = state
                    .classes
                    .get(class)
                    .and_then(|class_id| state.objects.get(class_id))
                    .map(|class_object| match &class_object.kind {
                        ObjectKind::Class { def, .. } => def.finalizes_native,
                        _ => false,
                    })
                    .unwrap_or(false);
                if finalizes && !object.orphaned {
                    natives.extend(object.native);
                }
            }

            let live = state
                .objects
                .values()
                .filter(|object| object.kind.is_collectable())
                .count();
            let stats = CollectStats {
                collected: dead.len(),
                finalized: natives.len(),
                live,
            };
            (stats, natives)
        };

        if !natives.is_empty() {
            let finalizer = self.finalizer.read().clone();
            match finalizer {
                Some(finalizer) => natives.iter().for_each(|native| finalizer(*native)),
                None => warn!(count = natives.len(), "Finalizable objects collected without a finalizer"),
            }
        }

        log_collection(stats.collected, stats.finalized, stats.live);
        stats
    }

    /// Drop every local reference created on `thread` (end of a native frame)
    pub fn release_locals(&self, thread: ThreadId) -> usize {
        let mut state = self.state.lock();
        let before = state.refs.len();
        state
            .refs
            .retain(|_, entry| !(entry.kind == RefKind::Local && entry.thread == thread));
        before - state.refs.len()
    }

    /// Whether `reference` still reaches a live object
    pub fn is_alive(&self, reference: ObjectRef) -> bool {
        self.state.lock().resolve(reference).is_some()
    }

    /// Native address an instance was constructed with
    pub fn native_of(&self, reference: ObjectRef) -> Option<NativeHandle> {
        let state = self.state.lock();
        let id = state.resolve(reference)?;
        state.objects.get(&id)?.native
    }

    /// Whether the instance was told its native peer is gone
    pub fn is_orphaned(&self, reference: ObjectRef) -> bool {
        let state = self.state.lock();
        state
            .resolve(reference)
            .and_then(|id| state.objects.get(&id))
            .map(|object| object.orphaned)
            .unwrap_or(false)
    }

    /// Native address and capacity of a direct buffer
    fn buffer_of(&self, buffer: ObjectRef) -> Option<(u64, usize)> {
        let state = self.state.lock();
        let id = state.resolve(buffer)?;
        match state.objects.get(&id)?.kind {
            ObjectKind::Buffer { address, capacity } => Some((address, capacity)),
            _ => None,
        }
    }

    /// Instances of `class` constructed so far
    pub fn constructions(&self, class: &str) -> usize {
        self.state.lock().constructions.get(class).copied().unwrap_or(0)
    }

    pub fn live_objects(&self) -> usize {
        self.state
            .lock()
            .objects
            .values()
            .filter(|object| object.kind.is_collectable())
            .count()
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::Relaxed)
    }

    /// Teardown notifications received through `notify_native_dropped`
    pub fn teardown_notifications(&self) -> usize {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Releases whose kind did not match the reference's kind
    pub fn mismatched_releases(&self) -> usize {
        self.mismatched_releases.load(Ordering::Relaxed)
    }

    pub fn local_ref_count(&self) -> usize {
        self.count_refs(RefKind::Local)
    }

    pub fn strong_ref_count(&self) -> usize {
        self.count_refs(RefKind::Strong)
    }

    pub fn weak_ref_count(&self) -> usize {
        self.count_refs(RefKind::Weak)
    }

    fn count_refs(&self, kind: RefKind) -> usize {
        self.state
            .lock()
            .refs
            .values()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    /// Remove a reference of the given kind
    fn release(&self, reference: ObjectRef, kind: RefKind) {
        let mut state = self.state.lock();
        match state.refs.get(&reference.as_raw()).map(|entry| entry.kind) {
            Some(found) if found == kind => {
                state.refs.remove(&reference.as_raw());
                trace!(reference = reference.as_raw(), ?kind, "Reference deleted");
            }
            Some(found) => {
                self.mismatched_releases.fetch_add(1, Ordering::Relaxed);
                warn!(
                    reference = reference.as_raw(),
                    expected = ?kind,
                    found = ?found,
                    "Reference released through the wrong table"
                );
            }
            None => {
                warn!(reference = reference.as_raw(), ?kind, "Release of unknown reference");
            }
        }
    }

    fn promote(&self, reference: ObjectRef, kind: RefKind) -> Option<ObjectRef> {
        let mut state = self.state.lock();
        let object = state.resolve(reference)?;
        Some(state.new_ref(object, kind))
    }
}

impl ManagedRuntime for ManagedHeap {
    fn attach_current_thread(&self) -> Result<ThreadHandle, RuntimeError> {
        if self.refuse_attach.load(Ordering::Relaxed) {
            return Err(RuntimeError::AttachFailed("attach refused by heap".to_string()));
        }
        let heap = self
            .me
            .upgrade()
            .ok_or_else(|| RuntimeError::AttachFailed("heap is shutting down".to_string()))?;

        self.attaches.fetch_add(1, Ordering::Relaxed);
        Ok(HeapThread::attach(heap))
    }
}

impl core::fmt::Debug for ManagedHeap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManagedHeap")
            .field("objects", &state.objects.len())
            .field("refs", &state.refs.len())
            .field("classes", &state.classes.len())
            .finish()
    }
}
