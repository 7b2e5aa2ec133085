//! Benchmarks for the per-request path: CIDR matching, gate evaluation and
//! config parsing

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use astats_server::router::{evaluate, CidrV4, CidrV6, Request};
use astats_server::snapshot::{parse_config, ConfigSnapshot};

const CONFIG_TEXT: &str = "\
# stats endpoint
path=_astats
record_types=122
allow_ip=127.0.0.1,10.0.0.0/8,172.16.0.0/12,192.168.0.0/16
allow_ip6=::1,fd00::/8,2001:db8::/32
";

fn cidr_benchmark(c: &mut Criterion) {
    let v4: CidrV4 = "10.20.0.0/14".parse().unwrap();
    let v6: CidrV6 = "2001:db8:abcd::/45".parse().unwrap();
    let hit = Ipv4Addr::new(10, 21, 3, 4);
    let miss = Ipv4Addr::new(192, 0, 2, 1);
    let hit6: Ipv6Addr = "2001:db8:abcd:7::1".parse().unwrap();

    let mut group = c.benchmark_group("cidr");

    group.bench_function("v4_match", |b| b.iter(|| black_box(v4.matches(black_box(hit)))));
    group.bench_function("v4_miss", |b| b.iter(|| black_box(v4.matches(black_box(miss)))));
    group.bench_function("v6_match", |b| b.iter(|| black_box(v6.matches(black_box(hit6)))));

    group.finish();
}

fn gate_benchmark(c: &mut Criterion) {
    let snapshot: ConfigSnapshot = parse_config(CONFIG_TEXT).unwrap();
    let allowed = Request {
        path: b"_astats",
        query: Some("application=http;cache&inf.name=eth0"),
        client: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10))),
    };
    let denied = Request {
        client: Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))),
        ..allowed
    };
    let other_path = Request {
        path: b"index.html",
        ..allowed
    };

    let mut group = c.benchmark_group("gate");
    group.throughput(Throughput::Elements(1));

    group.bench_function("intercept", |b| {
        b.iter(|| black_box(evaluate(black_box(&allowed), &snapshot)))
    });
    group.bench_function("denied", |b| {
        b.iter(|| black_box(evaluate(black_box(&denied), &snapshot)))
    });
    group.bench_function("path_mismatch", |b| {
        b.iter(|| black_box(evaluate(black_box(&other_path), &snapshot)))
    });

    group.finish();
}

fn parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    group.throughput(Throughput::Bytes(CONFIG_TEXT.len() as u64));

    group.bench_function("parse", |b| {
        b.iter(|| black_box(parse_config(black_box(CONFIG_TEXT))))
    });

    group.finish();
}

criterion_group!(benches, cidr_benchmark, gate_benchmark, parse_benchmark);
criterion_main!(benches);
