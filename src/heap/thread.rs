//! Per-thread interface of the in-process heap

use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::ThreadId;

use super::{HeapObject, ManagedHeap, ObjectKind, RefKind};
use crate::error::RuntimeError;
use crate::logging::trace;
use crate::runtime::{
    MethodRef, NativeHandle, ObjectRef, RuntimeHandle, ThreadHandle, ThreadInterface,
};

pub(super) struct HeapThread {
    heap: Arc<ManagedHeap>,
    thread: ThreadId,
}

impl HeapThread {
    pub(super) fn attach(heap: Arc<ManagedHeap>) -> ThreadHandle {
        let thread = std::thread::current().id();
        trace!(?thread, "Heap thread attached");
        ThreadHandle::new(Rc::new(Self { heap, thread }))
    }
}

impl ThreadInterface for HeapThread {
    fn runtime(&self) -> RuntimeHandle {
        RuntimeHandle::from(self.heap.clone())
    }

    fn find_class(&self, name: &str) -> Result<ObjectRef, RuntimeError> {
        let mut state = self.heap.state.lock();
        let id = state
            .classes
            .get(name)
            .copied()
            .ok_or_else(|| RuntimeError::ClassNotFound(name.to_string()))?;
        Ok(state.new_ref(id, RefKind::Local))
    }

    fn find_constructor(&self, class: ObjectRef, signature: &str) -> Result<MethodRef, RuntimeError> {
        let mut state = self.heap.state.lock();
        let (class_id, name, def) = state.class_of(class)?;
        if !def.has_constructor(signature) {
            return Err(RuntimeError::MethodNotFound {
                class: name.to_string(),
                signature: signature.to_string(),
            });
        }

        let existing = state
            .methods
            .iter()
            .position(|(owner, sig)| *owner == class_id && sig == signature);
        let index = match existing {
            Some(index) => index,
            None => {
                state.methods.push((class_id, signature.to_string()));
                state.methods.len() - 1
            }
        };
        MethodRef::from_raw(index as u64 + 1).ok_or(RuntimeError::InvalidReference(0))
    }

    fn new_object(
        &self,
        class: ObjectRef,
        constructor: MethodRef,
        identity: NativeHandle,
    ) -> Result<ObjectRef, RuntimeError> {
        let delay = {
            let state = self.heap.state.lock();
            let (class_id, name, def) = state.class_of(class)?;
            let owner = state
                .methods
                .get(constructor.as_raw() as usize - 1)
                .map(|(owner, _)| *owner);
            if owner != Some(class_id) {
                return Err(RuntimeError::InvalidReference(constructor.as_raw()));
            }
            if def.failing {
                return Err(RuntimeError::InstantiationFailed(name.to_string()));
            }
            def.construct_delay
        };

        // Constructor body runs without the heap lock
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.heap.state.lock();
        let class_name = state.class_of(class)?.1.to_string();
        let id = state.alloc_id();
        state.objects.insert(
            id,
            HeapObject {
                kind: ObjectKind::Instance {
                    class: class_name.clone(),
                },
                native: (!identity.is_null()).then_some(identity),
                orphaned: false,
            },
        );
        *state.constructions.entry(class_name).or_insert(0) += 1;
        Ok(state.new_ref(id, RefKind::Local))
    }

    fn delete_local_ref(&self, object: ObjectRef) {
        self.heap.release(object, RefKind::Local);
    }

    fn new_strong_ref(&self, object: ObjectRef) -> Option<ObjectRef> {
        self.heap.promote(object, RefKind::Strong)
    }

    fn delete_strong_ref(&self, object: ObjectRef) {
        self.heap.release(object, RefKind::Strong);
    }

    fn new_weak_ref(&self, object: ObjectRef) -> Option<ObjectRef> {
        self.heap.promote(object, RefKind::Weak)
    }

    fn delete_weak_ref(&self, object: ObjectRef) {
        self.heap.release(object, RefKind::Weak);
    }

    fn is_same_object(&self, a: Option<ObjectRef>, b: Option<ObjectRef>) -> bool {
        let state = self.heap.state.lock();
        let a = a.and_then(|reference| state.resolve(reference));
        let b = b.and_then(|reference| state.resolve(reference));
        a == b
    }

    fn new_direct_buffer(&self, address: u64, capacity: usize) -> Result<ObjectRef, RuntimeError> {
        if address == 0 && capacity > 0 {
            return Err(RuntimeError::InvalidReference(0));
        }

        let mut state = self.heap.state.lock();
        let id = state.alloc_id();
        state.objects.insert(
            id,
            HeapObject {
                kind: ObjectKind::Buffer { address, capacity },
                native: None,
                orphaned: false,
            },
        );
        trace!(address, capacity, "Direct buffer created");
        Ok(state.new_ref(id, RefKind::Local))
    }

    fn direct_buffer_address(&self, buffer: ObjectRef) -> Option<u64> {
        self.heap.buffer_of(buffer).map(|(address, _)| address)
    }

    fn direct_buffer_capacity(&self, buffer: ObjectRef) -> Option<usize> {
        self.heap.buffer_of(buffer).map(|(_, capacity)| capacity)
    }

    fn notify_native_dropped(&self, mirror: ObjectRef) {
        let mut state = self.heap.state.lock();
        let Some(id) = state.resolve(mirror) else {
            return;
        };
        if let Some(object) = state.objects.get_mut(&id) {
            object.orphaned = true;
            self.heap.notifications.fetch_add(1, Ordering::Relaxed);
            trace!(mirror = mirror.as_raw(), thread = ?self.thread, "Mirror orphaned");
        }
    }
}
