use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

async fn connect(host: &str, port: u16, venue: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(venue)
        .user("courtbook")
        .password("courtbook");

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn fresh_venue() -> String {
    format!("bench_{}", Ulid::new())
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
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
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// First bookable hour: the server clock is wall time, so stay well in the future.
fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2100, 1, 4)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .expect("valid base time")
}

/// `n`-th one-hour slot inside 08:00-22:00, walking forward day by day.
fn hour_slot(n: i64) -> (String, String) {
    let day = n / 14;
    let hour = n % 14;
    let start = base_time() + TimeDelta::days(day) + TimeDelta::hours(hour);
    let end = start + TimeDelta::hours(1);
    let fmt = "%Y-%m-%d %H:%M:%S";
    (start.format(fmt).to_string(), end.format(fmt).to_string())
}

/// Creates one court and one customer in the client's venue.
async fn setup_court(client: &tokio_postgres::Client) -> (Ulid, String) {
    let court = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO resources (id, name, hourly_rate) VALUES ('{court}', 'Bench court', 25)"
        ))
        .await
        .unwrap();
    let rows = client
        .simple_query("INSERT INTO customers (email, name) VALUES ('bench@example.com', 'Bench')")
        .await
        .unwrap();
    let customer = rows
        .iter()
        .find_map(|m| match m {
            tokio_postgres::SimpleQueryMessage::Row(r) => r.get("id").map(str::to_string),
            _ => None,
        })
        .expect("customer row");
    (court, customer)
}

async fn book(
    client: &tokio_postgres::Client,
    court: Ulid,
    customer: &str,
    n: i64,
) -> Result<(), tokio_postgres::Error> {
    let (start, end) = hour_slot(n);
    client
        .batch_execute(&format!(
            "INSERT INTO reservations (id, resource_id, customer_id, start_time, end_time) \
             VALUES ('{}', '{court}', '{customer}', '{start}', '{end}')",
            Ulid::new()
        ))
        .await
}

async fn phase1_sequential(host: &str, port: u16) {
    let client = connect(host, port, &fresh_venue()).await;
    let (court, customer) = setup_court(&client).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        book(&client, court, &customer, i as i64).await.unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} reservations in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_contended(host: &str, port: u16) {
    let venue = fresh_venue();
    let setup = connect(host, port, &venue).await;
    let (court, customer) = setup_court(&setup).await;

    let n_tasks = 10;
    let n_slots = 200;
    let booked = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let host = host.to_string();
        let venue = venue.clone();
        let customer = customer.clone();
        let booked = booked.clone();
        let conflicts = conflicts.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &venue).await;
            // Every task races for the same slots on the same court.
            for n in 0..n_slots {
                match book(&client, court, &customer, n).await {
                    Ok(()) => booked.fetch_add(1, Ordering::Relaxed),
                    Err(_) => conflicts.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let booked = booked.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} tasks x {n_slots} slots in {:.2}s: {booked} booked, {} rejected",
        elapsed.as_secs_f64(),
        conflicts.load(Ordering::Relaxed),
    );
    assert_eq!(booked, n_slots as usize, "every slot booked exactly once");
}

async fn phase3_read_under_load(host: &str, port: u16) {
    let venue = fresh_venue();
    let setup = connect(host, port, &venue).await;
    let (court, customer) = setup_court(&setup).await;
    for n in (0..14).step_by(2) {
        book(&setup, court, &customer, n).await.unwrap();
    }
    let date = base_time().date();

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let host = host.to_string();
        let venue = venue.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &venue).await;
            // Writers book other courts in the same venue.
            let (wcourt, wcustomer) = setup_court(&client).await;
            let mut n = (w as i64) * 100_000;
            while !stop.load(Ordering::Relaxed) {
                let _ = book(&client, wcourt, &wcustomer, n).await;
                n += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let host = host.to_string();
        let venue = venue.clone();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &venue).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                client
                    .batch_execute(&format!(
                        r#"SELECT * FROM availability WHERE resource_id = '{court}' AND "date" = '{date}'"#
                    ))
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("availability query", &mut all_latencies);
}

async fn phase4_connection_storm(host: &str, port: u16) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for _ in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port, &fresh_venue()).await;
            let (court, customer) = setup_court(&client).await;
            for n in 0..ops_per_conn {
                book(&client, court, &customer, n).await.unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("COURTBOOK_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("COURTBOOK_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid COURTBOOK_PORT");

    println!("=== courtbook stress benchmark ===");
    println!("target: {host}:{port}\n");

    println!("[phase 1] sequential write throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] contended writes on one court");
    phase2_contended(&host, port).await;

    println!("\n[phase 3] availability latency under write load");
    phase3_read_under_load(&host, port).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&host, port).await;

    println!("\n=== benchmark complete ===");
}
