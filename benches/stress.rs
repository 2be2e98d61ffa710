use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use ulid::Ulid;

use reserva::model::Interval;
use reserva::{CatalogSpec, RegistryConfig, ReservationStore, StoreRegistry};

const HOUR: i64 = 3_600;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

/// Hour-long slot number `i` counted from a fixed origin, so every slot is
/// disjoint from its neighbors under the closed-interval rule.
fn slot(i: i64) -> Interval {
    let origin = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let start = origin + chrono::Duration::seconds(i * HOUR);
    Interval::new(start, start + chrono::Duration::seconds(HOUR - 1))
}

fn fresh_registry(tag: &str) -> StoreRegistry {
    let dir = std::env::temp_dir().join(format!("reserva_bench_{tag}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    StoreRegistry::new(RegistryConfig {
        data_dir: dir,
        compact_threshold: u64::MAX,
    })
}

async fn phase1_sequential(store: &ReservationStore) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        store
            .insert_if_available("room-0".into(), "bench".into(), slot(i as i64), None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent_disjoint(store: Arc<ReservationStore>) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            // One resource per task — no lock contention across tasks
            let resource = format!("room-{i}");
            for j in 0..n_per_task {
                store
                    .insert_if_available(
                        resource.clone(),
                        format!("bench-{i}"),
                        slot(j as i64),
                        None,
                    )
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contended_resource(store: Arc<ReservationStore>) {
    // Every task fights for the same 400 slots on one resource — exactly one
    // winner per slot, everyone else gets Conflict.
    let n_tasks = 8;
    let n_slots: i64 = 400;

    let granted = Arc::new(AtomicU64::new(0));
    let conflicts = Arc::new(AtomicU64::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let store = store.clone();
        let granted = granted.clone();
        let conflicts = conflicts.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..n_slots {
                let result = store
                    .insert_if_available(
                        "contended".into(),
                        format!("bench-{t}"),
                        slot(j),
                        None,
                    )
                    .await;
                match result {
                    Ok(_) => granted.fetch_add(1, Ordering::Relaxed),
                    Err(_) => conflicts.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let won = granted.load(Ordering::Relaxed);
    let lost = conflicts.load(Ordering::Relaxed);
    println!(
        "  {} attempts in {:.2}s: {won} granted, {lost} conflicts",
        won + lost,
        elapsed.as_secs_f64()
    );
    assert_eq!(won, n_slots as u64, "exactly one winner per slot");
}

async fn phase4_read_under_load(store: Arc<ReservationStore>) {
    // Pre-fill
    for i in 0..200 {
        store
            .insert_if_available("reads".into(), "bench".into(), slot(i), None)
            .await
            .unwrap();
    }

    // Writer tasks keep appending past the pre-filled window
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let store = store.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut j: i64 = 1000 + w * 10_000;
            while !stop.load(Ordering::Relaxed) {
                let _ = store
                    .insert_if_available("reads".into(), "writer".into(), slot(j), None)
                    .await;
                j += 1;
            }
        }));
    }

    // Measured reader: availability checks against the busy schedule
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    for i in 0..n {
        let t = Instant::now();
        let _ = store
            .is_available("reads", slot((i % 400) as i64), None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        h.await.unwrap();
    }

    print_latency("read latency under write load", &mut latencies);
}

#[tokio::main]
async fn main() {
    println!("reserva stress bench");

    println!("phase 1: sequential bookings, one resource");
    let registry = fresh_registry("p1");
    let store = registry.get_or_create(CatalogSpec::trusted("bench")).unwrap();
    phase1_sequential(&store).await;

    println!("phase 2: concurrent bookings, disjoint resources");
    let registry = fresh_registry("p2");
    let store = registry.get_or_create(CatalogSpec::trusted("bench")).unwrap();
    phase2_concurrent_disjoint(store).await;

    println!("phase 3: contended slots, one resource");
    let registry = fresh_registry("p3");
    let store = registry.get_or_create(CatalogSpec::trusted("bench")).unwrap();
    phase3_contended_resource(store).await;

    println!("phase 4: reads under write load");
    let registry = fresh_registry("p4");
    let store = registry.get_or_create(CatalogSpec::trusted("bench")).unwrap();
    phase4_read_under_load(store).await;
}
