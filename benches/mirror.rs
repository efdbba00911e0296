use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mirror_bridge::{
    ClassDef, LockPolicy, ManagedHeap, MirrorSlot, Mirrored, RuntimeHandle, RuntimeHandleCache,
    IDENTITY_CONSTRUCTOR_SIGNATURE,
};
use std::sync::Arc;

const BENCH_CLASS: &str = "bench/Peer";

struct Peer {
    slot: MirrorSlot,
}

impl Mirrored for Peer {
    fn mirror_slot(&self) -> &MirrorSlot {
        &self.slot
    }

    fn managed_class_name(&self) -> Option<&str> {
        Some(BENCH_CLASS)
    }
}

fn setup() -> (Arc<ManagedHeap>, Arc<RuntimeHandleCache>) {
    let heap = ManagedHeap::new();
    heap.define_class(
        BENCH_CLASS,
        ClassDef::new().constructor(IDENTITY_CONSTRUCTOR_SIGNATURE),
    );
    let cache = Arc::new(RuntimeHandleCache::new());
    cache.set_runtime(RuntimeHandle::from(heap.clone()));
    (heap, cache)
}

fn bench_existing_mirror(c: &mut Criterion) {
    let (_heap, cache) = setup();
    let peer = Peer {
        slot: MirrorSlot::with_policy(cache, LockPolicy::Shared),
    };
    peer.mirror();

    c.bench_function("mirror_existing", |b| {
        b.iter(|| black_box(peer.mirror()));
    });
}

fn bench_first_mirror(c: &mut Criterion) {
    let (heap, cache) = setup();

    c.bench_function("mirror_first_access", |b| {
        b.iter(|| {
            let peer = Peer {
                slot: MirrorSlot::with_policy(cache.clone(), LockPolicy::PerObject),
            };
            black_box(peer.mirror());
        });
        heap.collect();
    });
}

fn bench_thread_handle(c: &mut Criterion) {
    let (_heap, cache) = setup();
    cache.thread_handle();

    c.bench_function("thread_handle_cached", |b| {
        b.iter(|| black_box(cache.thread_handle()));
    });
}

criterion_group!(benches, bench_existing_mirror, bench_first_mirror, bench_thread_handle);
criterion_main!(benches);
