//! Run with:
//!   cargo bench --bench invoke_benchmark

use arbcall::{Bridge, BridgeCreateInfo, CallDescriptor, Symbol};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

extern "C" fn add2(a: u64, b: u64) -> u64 {
    a.wrapping_add(b)
}

fn bench_resolve(c: &mut Criterion) {
    c.bench_function("resolve strlen", |b| {
        b.iter(|| arbcall::resolve(black_box(c"strlen")))
    });
}

fn bench_invoke(c: &mut Criterion) {
    // SAFETY: add2 is a C ABI function that lives for the whole run
    let symbol =
        unsafe { Symbol::from_raw(add2 as *const std::ffi::c_void) }.expect("non-null");
    c.bench_function("bind + invoke", |b| {
        b.iter(|| {
            let mut call = CallDescriptor::new("add2").expect("valid name");
            call.set_u64(0, black_box(40)).expect("slot 0");
            call.set_u64(1, black_box(2)).expect("slot 1");
            call.bind(symbol).expect("fresh descriptor");
            // SAFETY: add2 takes two u64 arguments
            unsafe { call.invoke() }
        })
    });

    let text = *b"the quick brown fox\0";
    c.bench_function("resolve + invoke strlen", |b| {
        b.iter(|| {
            let mut call = CallDescriptor::new("strlen").expect("valid name");
            call.set_ptr(0, black_box(text.as_ptr())).expect("slot 0");
            call.resolve();
            // SAFETY: strlen with a NUL terminated buffer
            unsafe { call.invoke() }
        })
    });
}

fn bench_bridge(c: &mut Criterion) {
    // buffers live as long as their bridge, so every run gets a fresh one
    c.bench_function("bridge strlen script", |b| {
        b.iter_batched(
            // SAFETY: the script only calls strlen on a literal
            || unsafe { Bridge::new(BridgeCreateInfo::default(), std::io::sink()) },
            |mut bridge| {
                bridge
                    .eval("\"strlen\" call-new 0 \"hello\" call-ptr! call-resolve call-invoke drop")
                    .expect("script runs");
                bridge
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_resolve, bench_invoke, bench_bridge);
criterion_main!(benches);
