use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use tracing_subscriber::EnvFilter;

use quotaline::store::{MemoryWindowStore, WindowStore};
use quotaline::{RateLimitDecision, RateLimiter, RateLimiterOptions, RedisKey};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Provider {
    Memory,
    Redis,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyDist {
    Hot,
    Uniform,
    Skewed,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "quotaline-stress",
    about = "Load test / benchmark harness for quotaline"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Provider::Memory)]
    provider: Provider,

    #[arg(long, value_enum, default_value_t = KeyDist::Hot)]
    key_dist: KeyDist,

    /// Concurrent callers.
    #[arg(long, default_value_t = 8)]
    tasks: usize,

    #[arg(long, default_value_t = 30)]
    duration_s: u64,

    #[arg(long, default_value_t = 1000)]
    window_ms: u64,

    #[arg(long, default_value_t = 100)]
    limit: u64,

    #[arg(long, default_value_t = 4)]
    workers: usize,

    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,

    #[arg(long, default_value_t = 1000)]
    task_timeout_ms: u64,

    #[arg(long, default_value_t = 10_000)]
    key_space: usize,

    #[arg(long, default_value_t = 0.8)]
    hot_fraction: f64,

    #[arg(long, default_value_t = 10)]
    sample_every: u64,

    /// Only used when `--provider redis`.
    #[arg(long, default_value_t = 4)]
    redis_connections: usize,

    #[arg(long, default_value = "redis://127.0.0.1:6379/")]
    redis_url: String,

    #[arg(long, default_value = "stress")]
    redis_prefix: String,
}

#[derive(Default)]
struct Counts {
    allowed: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
}

fn build_options(args: &Args) -> RateLimiterOptions {
    RateLimiterOptions {
        prefix: Some(RedisKey::try_from(args.redis_prefix.as_str()).unwrap()),
        limit: args.limit,
        window: Duration::from_millis(args.window_ms),
        task_timeout: Duration::from_millis(args.task_timeout_ms),
        queue_capacity: args.queue_capacity,
        worker_count: args.workers,
        ..Default::default()
    }
}

fn build_keys(args: &Args) -> Vec<String> {
    let n = match args.key_dist {
        KeyDist::Hot => 1,
        _ => args.key_space.max(1),
    };
    (0..n).map(|i| format!("user_{i}")).collect()
}

fn pick_key<'a>(args: &Args, keys: &'a [String], rng: &mut impl FnMut() -> u64) -> &'a str {
    match args.key_dist {
        KeyDist::Hot => &keys[0],
        KeyDist::Uniform => &keys[(rng() as usize) % keys.len()],
        KeyDist::Skewed => {
            let r = (rng() % 10_000) as f64 / 10_000.0;
            if r < args.hot_fraction {
                &keys[0]
            } else {
                let idx = 1 + ((rng() as usize) % keys.len().saturating_sub(1).max(1));
                &keys[idx % keys.len()]
            }
        }
    }
}

fn print_results(args: &Args, elapsed: Duration, hist: &Histogram<u64>, counts: &Counts) {
    let allowed = counts.allowed.load(Ordering::Relaxed);
    let rejected = counts.rejected.load(Ordering::Relaxed);
    let errors = counts.errors.load(Ordering::Relaxed);
    let ops = allowed + rejected + errors;

    println!("provider={:?} key_dist={:?}", args.provider, args.key_dist);
    println!(
        "tasks={} workers={} limit={} window_ms={} key_space={}",
        args.tasks, args.workers, args.limit, args.window_ms, args.key_space
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("allowed={allowed} rejected={rejected} errors={errors}");

    if hist.is_empty() {
        println!("no latency samples collected");
        return;
    }

    println!(
        "lat_us p50={} p95={} p99={} p999={} max={}",
        hist.value_at_quantile(0.50),
        hist.value_at_quantile(0.95),
        hist.value_at_quantile(0.99),
        hist.value_at_quantile(0.999),
        hist.max()
    );
    println!("sample_every={} samples={}", args.sample_every, hist.len());
}

async fn run<S>(args: Args, rl: Arc<RateLimiter<S>>)
where
    S: WindowStore + 'static,
{
    let keys = Arc::new(build_keys(&args));
    let stop = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(Counts::default());

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_s);

    let mut handles = Vec::with_capacity(args.tasks);
    for t in 0..args.tasks {
        let rl = Arc::clone(&rl);
        let keys = Arc::clone(&keys);
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let args = args.clone();

        handles.push(tokio::spawn(async move {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1) * 0x9E37_79B9_7F4A_7C15;

            let mut rng = move || {
                // xorshift64*
                seed ^= seed >> 12;
                seed ^= seed << 25;
                seed ^= seed >> 27;
                seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                seed
            };

            while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
                i = i.wrapping_add(1);
                let key = pick_key(&args, &keys, &mut rng);
                let sample = args.sample_every <= 1 || i.is_multiple_of(args.sample_every);
                let t0 = Instant::now();

                match rl.allow(key).await {
                    Ok(RateLimitDecision::Allowed) => {
                        counts.allowed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(RateLimitDecision::Rejected { .. }) => {
                        counts.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "allow failed");
                        counts.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }

                if sample {
                    let us = t0.elapsed().as_micros() as u64;
                    let _ = hist.record(us.max(1));
                }
            }

            hist
        }));
    }

    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for handle in handles {
        match handle.await {
            Ok(h) => {
                let _ = hist.add(h);
            }
            Err(err) => tracing::error!(error = %err, "stress task panicked"),
        }
    }

    let elapsed = started.elapsed();
    rl.shutdown().await;

    print_results(&args, elapsed, &hist, &counts);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let options = build_options(&args);

    match args.provider {
        Provider::Memory => {
            let rl = RateLimiter::new(Some(MemoryWindowStore::new()), options).unwrap();
            run(args, Arc::new(rl)).await;
        }
        #[cfg(feature = "redis-tokio")]
        Provider::Redis => {
            use quotaline::redis::RedisWindowClient;

            let client = redis::Client::open(args.redis_url.as_str()).unwrap();
            let client = RedisWindowClient::from_client(client, args.redis_connections)
                .await
                .unwrap();
            let rl = RateLimiter::redis(client, options).unwrap();
            run(args, Arc::new(rl)).await;
        }
        #[cfg(not(feature = "redis-tokio"))]
        Provider::Redis => {
            eprintln!("redis provider requires the redis-tokio feature");
            std::process::exit(2);
        }
    }
}
