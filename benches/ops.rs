use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use memostore::{ConcurrentDataStore, DataStore, LockingDataStoreDecorator, SimpleDataStore};

use std::sync::{Arc, Barrier};
use std::thread;

const NUM_ITEMS: u64 = 10_000;
const NUM_THREADS: usize = 4;

fn prepopulated_concurrent() -> Arc<ConcurrentDataStore<u64, u64>> {
  let store = Arc::new(ConcurrentDataStore::new());
  for i in 0..NUM_ITEMS {
    store.set(i, i).unwrap();
  }
  store
}

fn prepopulated_locked() -> Arc<LockingDataStoreDecorator<u64, u64, SimpleDataStore<u64, u64>>> {
  let store = Arc::new(LockingDataStoreDecorator::new(SimpleDataStore::new()));
  for i in 0..NUM_ITEMS {
    store.set(i, i).unwrap();
  }
  store
}

/// Hammers the hit path of `get_or_create` from several threads at once.
fn run_hit_workload<S>(store: Arc<S>)
where
  S: DataStore<u64, u64> + Send + Sync + 'static,
{
  let barrier = Arc::new(Barrier::new(NUM_THREADS));
  let mut handles = vec![];
  for t in 0..NUM_THREADS {
    let store = store.clone();
    let barrier = barrier.clone();
    handles.push(thread::spawn(move || {
      barrier.wait();
      let mut key = t as u64;
      for _ in 0..NUM_ITEMS / NUM_THREADS as u64 {
        key = key.wrapping_mul(2_654_435_761).wrapping_add(1) % NUM_ITEMS;
        let value = store.get_or_create(key, |k| *k).unwrap();
        black_box(value);
      }
    }));
  }
  for handle in handles {
    handle.join().unwrap();
  }
}

fn bench_get_or_create_hits(c: &mut Criterion) {
  let mut group = c.benchmark_group("get_or_create_hits");
  group.throughput(Throughput::Elements(NUM_ITEMS));

  group.bench_function("concurrent_store", |b| {
    b.iter_batched(
      prepopulated_concurrent,
      run_hit_workload,
      criterion::BatchSize::LargeInput,
    )
  });

  group.bench_function("locking_decorator", |b| {
    b.iter_batched(
      prepopulated_locked,
      run_hit_workload,
      criterion::BatchSize::LargeInput,
    )
  });

  group.finish();
}

fn bench_single_thread_reads(c: &mut Criterion) {
  let mut group = c.benchmark_group("single_thread_get");
  group.throughput(Throughput::Elements(1));

  let concurrent = prepopulated_concurrent();
  group.bench_function("concurrent_store", |b| {
    b.iter(|| black_box(concurrent.get(black_box(&42)).unwrap()))
  });

  let simple: SimpleDataStore<u64, u64> = SimpleDataStore::new();
  for i in 0..NUM_ITEMS {
    simple.set(i, i).unwrap();
  }
  group.bench_function("simple_store", |b| {
    b.iter(|| black_box(simple.get(black_box(&42)).unwrap()))
  });

  group.finish();
}

criterion_group!(benches, bench_get_or_create_hits, bench_single_thread_reads);
criterion_main!(benches);
