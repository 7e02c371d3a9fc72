mod cli;

use tracing_subscriber::EnvFilter;

use trackat::adapters::TokioTimeProvider;
use trackat::sim::run_simulation;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (config, plan) = match cli::run() {
        cli::RunOutcome::Simulate(config, plan) => (config, plan),
        cli::RunOutcome::Exit(code) => std::process::exit(code),
    };

    match run_simulation(&config, &plan, TokioTimeProvider).await {
        Ok(report) => {
            println!("started:          {}", report.started_at);
            println!("clients:          {}", report.clients);
            println!("alerts sent:      {}", report.alerts_sent);
            println!("alerts delivered: {}", report.alerts_received);
            println!("users located:    {}", report.users_located);
            for label in &report.labels {
                println!(
                    "  {:<12} ({:>8.1}, {:>8.1})",
                    label.text, label.point.x, label.point.y
                );
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}
