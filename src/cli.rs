use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use trackat::config::SyncConfig;
use trackat::sim::SimulationPlan;
use trackat::types::Coords;

pub(crate) enum RunOutcome {
    Simulate(SyncConfig, SimulationPlan),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return RunOutcome::Exit(2);
        }
    };
    let plan = match resolve_plan(&cli) {
        Ok(plan) => plan,
        Err(err) => {
            eprintln!("error: {err}");
            return RunOutcome::Exit(2);
        }
    };

    RunOutcome::Simulate(config, plan)
}

#[derive(Parser, Debug)]
#[command(
    name = "trackat",
    version,
    about = "Simulates live-location clients sharing positions and alerts"
)]
struct Cli {
    #[arg(long, env = "TRACKAT_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    clients: usize,
    #[arg(long, default_value_t = 20)]
    steps: usize,
    #[arg(long, default_value_t = 1000)]
    step_ms: u64,
    #[arg(long, default_value_t = 5)]
    alert_every: usize,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Starting point as "lat,lon".
    #[arg(long)]
    origin: Option<String>,
    #[arg(long, env = "TRACKAT_ALERT_WINDOW")]
    alert_window: Option<usize>,
    #[arg(long, env = "TRACKAT_HISTORY_LIMIT")]
    history_limit: Option<usize>,
    #[arg(long, env = "TRACKAT_INTERVAL_MS")]
    interval_ms: Option<u64>,
    #[arg(long, env = "TRACKAT_MIN_DISTANCE_M")]
    min_distance_m: Option<f64>,
}

fn resolve_config(cli: &Cli) -> Result<SyncConfig, String> {
    let mut config = match cli.config.as_deref() {
        Some(path) => SyncConfig::load(path).map_err(|err| err.to_string())?,
        None => SyncConfig::default(),
    };
    if let Some(window) = cli.alert_window {
        config.alert_window = window;
    }
    if let Some(limit) = cli.history_limit {
        config.history_limit = limit;
    }
    if let Some(interval) = cli.interval_ms {
        config.tracking.interval_ms = interval;
    }
    if let Some(distance) = cli.min_distance_m {
        config.tracking.min_distance_m = distance;
    }
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

fn resolve_plan(cli: &Cli) -> Result<SimulationPlan, String> {
    let defaults = SimulationPlan::default();
    let origin = match cli.origin.as_deref() {
        Some(raw) => parse_origin(raw)?,
        None => defaults.origin,
    };
    Ok(SimulationPlan {
        clients: cli.clients,
        steps: cli.steps,
        step: Duration::from_millis(cli.step_ms),
        alert_every: cli.alert_every,
        seed: cli.seed,
        origin,
    })
}

fn parse_origin(raw: &str) -> Result<Coords, String> {
    let invalid = || format!("invalid origin '{raw}'; expected <lat>,<lon>");
    let (lat, lon) = raw.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
    let coords = Coords::new(lat, lon);
    if !coords.is_valid() {
        return Err(format!("origin out of range: {raw}"));
    }
    Ok(coords)
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            config: None,
            clients: 3,
            steps: 20,
            step_ms: 1000,
            alert_every: 5,
            seed: 7,
            origin: None,
            alert_window: None,
            history_limit: None,
            interval_ms: None,
            min_distance_m: None,
        }
    }

    #[test]
    fn parse_origin__should_parse_pairs() {
        // When
        let coords = parse_origin("-23.5, -46.6").expect("origin");

        // Then
        assert_eq!(coords, Coords::new(-23.5, -46.6));
    }

    #[test]
    fn parse_origin__should_reject_invalid_values() {
        assert!(parse_origin("").is_err());
        assert!(parse_origin("12").is_err());
        assert!(parse_origin("abc,1").is_err());
        assert!(parse_origin("91,0").is_err());
    }

    #[test]
    fn resolve_config__should_apply_overrides() {
        // Given
        let mut cli = base_cli();
        cli.alert_window = Some(50);
        cli.min_distance_m = Some(0.0);

        // When
        let config = resolve_config(&cli).expect("config");

        // Then
        assert_eq!(config.alert_window, 50);
        assert_eq!(config.tracking.min_distance_m, 0.0);
        assert_eq!(config.history_limit, 5);
    }

    #[test]
    fn resolve_config__should_reject_invalid_overrides() {
        // Given
        let mut cli = base_cli();
        cli.history_limit = Some(0);

        // Then
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn resolve_plan__should_use_flags() {
        // Given
        let mut cli = base_cli();
        cli.step_ms = 250;
        cli.origin = Some("10,20".into());

        // When
        let plan = resolve_plan(&cli).expect("plan");

        // Then
        assert_eq!(plan.step, Duration::from_millis(250));
        assert_eq!(plan.origin, Coords::new(10.0, 20.0));
    }
}
