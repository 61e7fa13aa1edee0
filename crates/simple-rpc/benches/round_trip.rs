// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Round-Trip Benchmark
//!
//! Measures one full call over the loopback transport:
//! alloc_rpc, send, server poll/receive/reply, client wait/receive.
//! Payload sizes from 16B to 64KB.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_precision_loss)]

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use simple_rpc::loopback::LoopbackNetwork;
use simple_rpc::{InMessage, Socket, Status};
use std::hint::black_box as bb;

/// Benchmark a complete request/reply exchange by payload size
fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip_by_size");

    let net = LoopbackNetwork::new();
    let client = Socket::new(net.endpoint());
    let server = Socket::new(net.endpoint());
    let server_addr = server.transport().address();

    for size in [16usize, 256, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64 * 2));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let payload = vec![0xAB; size];
            b.iter(|| {
                let rpc = client.alloc_rpc();
                rpc.send(&server_addr, bb(&payload)).expect("send");

                server.poll();
                let mut task = server.receive().expect("request delivered");
                let echo = task.request_bytes();
                task.reply(&echo).expect("reply");
                drop(task);

                assert_eq!(rpc.wait(), Status::Completed);
                bb(rpc.receive().map(|m| m.len()));
            });
        });
    }

    group.finish();
}

/// Benchmark the cost of dispatching a burst of requests in one poll
fn bench_poll_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll_burst");

    let net = LoopbackNetwork::new();
    let client = Socket::new(net.endpoint());
    let server = Socket::new(net.endpoint());
    let server_addr = server.transport().address();

    for burst in [1usize, 16, 128] {
        group.throughput(Throughput::Elements(burst as u64));
        group.bench_with_input(BenchmarkId::from_parameter(burst), &burst, |b, &burst| {
            b.iter(|| {
                let rpcs: Vec<_> = (0..burst)
                    .map(|_| {
                        let rpc = client.alloc_rpc();
                        rpc.send(&server_addr, b"burst").expect("send");
                        rpc
                    })
                    .collect();

                server.poll();
                while let Some(task) = server.receive() {
                    bb(task.request().len());
                }
                client.poll();
                drop(rpcs);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_poll_burst);
criterion_main!(benches);
