use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use futures_util::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "weather-cli")]
#[command(about = "Client for the instrumented weather service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the five-day forecast
    Forecast,
    /// Aggregated health report
    Health,
    /// Readiness report
    Ready,
    /// Liveness check
    Live,
    /// Generate a burst of demo metrics
    Demo,
    /// Dump the Prometheus scrape
    Metrics,
    /// Fire forecast requests and report outcomes and latency
    Load {
        #[arg(short = 'n', long, default_value_t = 100)]
        requests: usize,

        #[arg(short, long, default_value_t = 10)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Forecast => print_json(client.get(format!("{}/api/weather", base)).send().await?).await?,
        Commands::Health => print_json(client.get(format!("{}/health", base)).send().await?).await?,
        Commands::Ready => print_json(client.get(format!("{}/health/ready", base)).send().await?).await?,
        Commands::Live => print_json(client.get(format!("{}/health/live", base)).send().await?).await?,
        Commands::Demo => {
            print_json(client.get(format!("{}/api/weather/metrics-demo", base)).send().await?).await?
        }
        Commands::Metrics => {
            let res = client.get(format!("{}/metrics", base)).send().await?;
            let status = res.status();
            let body = res.text().await?;
            if status.is_success() {
                print!("{}", body);
            } else {
                eprintln!("Error: metrics endpoint returned status {}: {}", status, body);
            }
        }
        Commands::Load { requests, concurrency } => {
            let report = run_load(&client, &base, requests, concurrency.max(1)).await;
            report.print();
        }
    }

    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}

#[derive(Default)]
struct LoadReport {
    ok: usize,
    unavailable: usize,
    other_status: usize,
    transport_errors: usize,
    latencies: Vec<Duration>,
    elapsed: Duration,
}

impl LoadReport {
    fn percentile(&self, p: f64) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let rank = ((p / 100.0) * (self.latencies.len() - 1) as f64).round() as usize;
        self.latencies[rank.min(self.latencies.len() - 1)]
    }

    fn print(&self) {
        let total = self.ok + self.unavailable + self.other_status + self.transport_errors;
        println!("requests:          {}", total);
        println!("ok (200):          {}", self.ok);
        println!("unavailable (503): {}", self.unavailable);
        println!("other status:      {}", self.other_status);
        println!("transport errors:  {}", self.transport_errors);
        println!("elapsed:           {:.2?}", self.elapsed);
        for p in [50.0, 90.0, 99.0, 100.0] {
            println!("p{:<3}               {:.1?}", p as u32, self.percentile(p));
        }
    }
}

async fn run_load(client: &reqwest::Client, base: &str, requests: usize, concurrency: usize) -> LoadReport {
    let url = format!("{}/api/weather", base);
    let started = Instant::now();

    let outcomes: Vec<(Result<StatusCode, reqwest::Error>, Duration)> = stream::iter(0..requests)
        .map(|_| {
            let request = client.get(&url);
            async move {
                let sent = Instant::now();
                let status = request.send().await.map(|res| res.status());
                (status, sent.elapsed())
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut report = LoadReport {
        elapsed: started.elapsed(),
        ..LoadReport::default()
    };
    for (status, latency) in outcomes {
        match status {
            Ok(StatusCode::OK) => report.ok += 1,
            Ok(StatusCode::SERVICE_UNAVAILABLE) => report.unavailable += 1,
            Ok(_) => report.other_status += 1,
            Err(_) => report.transport_errors += 1,
        }
        report.latencies.push(latency);
    }
    report.latencies.sort();
    report
}
