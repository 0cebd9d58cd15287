use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use clap::Parser;
use slide_limit::Limiter;
use slide_limit::Overflow;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceExt;
use tower::service_fn;
use tower_slide::AdmissionLayer;
use tower_slide::GateError;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fire bursts of requests through a sliding window limiter and report what got through.
#[derive(Debug, Parser)]
struct Args {
    /// Maximum admissions per window
    #[arg(long, default_value_t = 100)]
    capacity: usize,

    /// Window length, e.g. "1s" or "250ms"
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    window: Duration,

    /// Overflow strategy: "drop" or "error"
    #[arg(long, default_value = "drop")]
    overflow: Overflow,

    /// Requests per burst
    #[arg(long, default_value_t = 250)]
    requests: usize,

    /// Number of bursts
    #[arg(long, default_value_t = 3)]
    bursts: usize,

    /// Pause between bursts, e.g. "500ms"
    #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
    pause: Duration,
}

#[derive(Debug, Default)]
struct Tally {
    ok: usize,
    dropped: usize,
    rate_limited: usize,
    other: usize,
}

async fn mock_api_call(_req: ()) -> Result<&'static str, BoxError> {
    sleep(Duration::from_millis(5)).await;
    Ok("success")
}

async fn run_burst<S>(svc: S, requests: usize) -> Tally
where
    S: Service<(), Response = &'static str, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send,
{
    let mut tasks = JoinSet::new();
    for _ in 0..requests {
        let mut local_svc = svc.clone();
        tasks.spawn(async move { local_svc.ready().await?.call(()).await });
    }

    let mut tally = Tally::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(_)) => tally.ok += 1,
            Ok(Err(e)) => match e.downcast_ref::<GateError>() {
                Some(GateError::Dropped { .. }) => tally.dropped += 1,
                Some(GateError::RateLimited { .. }) => tally.rate_limited += 1,
                _ => tally.other += 1,
            },
            Err(_) => tally.other += 1,
        }
    }
    tally
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let limiter = Arc::new(Limiter::new(args.capacity, args.window, args.overflow)?);
    let svc = AdmissionLayer::new(Arc::clone(&limiter)).layer(service_fn(mock_api_call));

    let start = Instant::now();
    for burst in 1..=args.bursts {
        let tally = run_burst(svc.clone(), args.requests).await;
        info!(
            burst,
            ok = tally.ok,
            dropped = tally.dropped,
            rate_limited = tally.rate_limited,
            other = tally.other,
            used = limiter.used_capacity(),
            "burst finished"
        );
        if burst < args.bursts {
            sleep(args.pause).await;
        }
    }

    println!("--- Sliding Window Burst ---");
    println!("Total Duration:  {:.2?}", start.elapsed());
    println!("Limiter:         {limiter}");
    Ok(())
}
