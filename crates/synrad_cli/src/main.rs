//! Headless SynRad driver.
//!
//! Loads a scenario, traces it for a fixed wall-clock budget (or until the
//! desorption limit is reached) and prints the per-facet results.
//!
//! Run with: cargo run --release --bin synrad -- demos/bend_chamber.json --seconds 10

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use synrad_core::{PhysicsTables, ResultBuffer, Scenario, SimulationParams};
use synrad_tracer::{Model, Simulation};

const USAGE: &str = "Usage: synrad <scenario.json> [--seconds N] [--workers N] [--limit N] [--seed N] [--low-flux]";

/// Interval between progress lines.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
struct Options {
    scenario: PathBuf,
    seconds: f64,
    workers: Option<usize>,
    limit: Option<u64>,
    seed: Option<u64>,
    low_flux: bool,
}

impl Options {
    /// Parse everything after the program name. `Ok(None)` means help was requested.
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Option<Self>> {
        let mut scenario = None;
        let mut seconds = 10.0;
        let mut workers = None;
        let mut limit = None;
        let mut seed = None;
        let mut low_flux = false;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("{flag} expects a value"))
            };
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--seconds" => {
                    seconds = value("--seconds")?.parse().context("invalid --seconds")?;
                }
                "--workers" => {
                    workers = Some(value("--workers")?.parse().context("invalid --workers")?);
                }
                "--limit" => {
                    limit = Some(value("--limit")?.parse().context("invalid --limit")?);
                }
                "--seed" => {
                    seed = Some(value("--seed")?.parse().context("invalid --seed")?);
                }
                "--low-flux" => low_flux = true,
                flag if flag.starts_with('-') => bail!("unknown option '{flag}'"),
                path => {
                    if scenario.is_some() {
                        bail!("more than one scenario given");
                    }
                    scenario = Some(PathBuf::from(path));
                }
            }
        }

        let Some(scenario) = scenario else {
            bail!("no scenario given");
        };
        if !(seconds > 0.0) {
            bail!("--seconds must be positive, got {seconds}");
        }

        Ok(Some(Self {
            scenario,
            seconds,
            workers,
            limit,
            seed,
            low_flux,
        }))
    }

    /// Scenario parameters with the command-line overrides applied.
    fn apply(&self, params: &mut SimulationParams) {
        if let Some(workers) = self.workers {
            params.worker_count = workers;
        }
        if let Some(limit) = self.limit {
            params.desorption_limit = Some(limit);
        }
        if self.seed.is_some() {
            params.seed = self.seed;
        }
        if self.low_flux {
            params.low_flux_mode = true;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(options) = Options::parse(std::env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let mut scenario = Scenario::load(&options.scenario)
        .with_context(|| format!("failed to load {}", options.scenario.display()))?;
    options.apply(&mut scenario.params);
    let loaded = scenario.build()?;
    let params = loaded.params.clone();

    log::info!("Building physics tables...");
    let start = Instant::now();
    let tables = Arc::new(PhysicsTables::build()?);
    log::info!("Physics tables ready in {:.2?}", start.elapsed());

    for region in &loaded.regions {
        let summary = region.summary(&tables);
        println!(
            "Region '{}': {} points, {:.3e} ph/s, {:.3} W",
            region.params.name, summary.points, summary.flux, summary.power
        );
    }

    let mut simulation = Simulation::new(params)?;
    simulation.load(loaded, tables)?;
    let errors = simulation.errors();
    if let Some((id, message)) = errors.first() {
        bail!("worker {id} rejected the scenario: {message}");
    }

    simulation.start()?;
    let budget = Duration::from_secs_f64(options.seconds);
    let started = Instant::now();
    let mut last_report = started;
    while started.elapsed() < budget && !simulation.is_done() {
        std::thread::sleep(Duration::from_millis(50));
        if last_report.elapsed() >= PROGRESS_INTERVAL {
            log::info!("Desorbed {}", simulation.status_string());
            last_report = Instant::now();
        }
        if let Some((id, message)) = simulation.errors().first() {
            bail!("worker {id} failed: {message}");
        }
    }
    simulation.pause()?;
    let elapsed = started.elapsed();

    let results = simulation.snapshot()?;
    if let Some(model) = simulation.model() {
        print_results(model, &results, elapsed);
    }
    simulation.exit()?;
    Ok(())
}

fn print_results(model: &Model, results: &ResultBuffer, elapsed: Duration) {
    let header = results.header();
    let norm = results.normalisation();
    let desorbed = header.counter.nb_desorbed;

    println!();
    println!(
        "Desorbed {} photons in {:.2?} ({:.0} ph/s)",
        desorbed,
        elapsed,
        desorbed as f64 / elapsed.as_secs_f64().max(1e-9)
    );
    println!(
        "Hits {}  absorbed {}  leaked {}",
        header.counter.nb_mc_hit, header.counter.nb_abs, header.counter.nb_leaked
    );
    println!(
        "Generated flux {:.3e} ph/s, power {:.3} W",
        header.generated_flux * norm,
        header.generated_power * norm
    );
    println!(
        "Absorbed  flux {:.3e} ph/s, power {:.3} W",
        header.counter.flux_abs * norm,
        header.counter.power_abs * norm
    );

    println!();
    println!(
        "{:>5} {:>10} {:>10} {:>12} {:>12} {:>12}",
        "facet", "hits", "abs", "flux ph/s", "power W", "W/cm²"
    );
    for facet in &model.geometry.facets {
        let c = results.counter(facet.id);
        let power = c.power_abs * norm;
        let density = if facet.area > 0.0 { power / facet.area } else { 0.0 };
        println!(
            "{:>5} {:>10} {:>10} {:>12.3e} {:>12.4} {:>12.4e}",
            facet.id,
            c.nb_mc_hit,
            c.nb_abs,
            c.flux_abs * norm,
            power,
            density
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Options>> {
        Options::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_defaults() {
        let options = parse(&["chamber.json"]).unwrap().unwrap();
        assert_eq!(options.scenario, PathBuf::from("chamber.json"));
        assert_eq!(options.seconds, 10.0);
        assert_eq!(options.workers, None);
        assert!(!options.low_flux);
    }

    #[test]
    fn test_parse_overrides() {
        let options = parse(&[
            "--workers", "8", "chamber.json", "--limit", "1000", "--seed", "7", "--low-flux",
            "--seconds", "2.5",
        ])
        .unwrap()
        .unwrap();
        assert_eq!(options.workers, Some(8));
        assert_eq!(options.limit, Some(1000));
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.seconds, 2.5);
        assert!(options.low_flux);

        let mut params = SimulationParams::default();
        options.apply(&mut params);
        assert_eq!(params.worker_count, 8);
        assert_eq!(params.desorption_limit, Some(1000));
        assert_eq!(params.seed, Some(7));
        assert!(params.low_flux_mode);
    }

    #[test]
    fn test_parse_help() {
        assert_eq!(parse(&["--help"]).unwrap(), None);
        assert_eq!(parse(&["chamber.json", "-h"]).unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
        assert!(parse(&["a.json", "--workers"]).is_err());
        assert!(parse(&["a.json", "--workers", "many"]).is_err());
        assert!(parse(&["a.json", "--seconds", "0"]).is_err());
        assert!(parse(&["a.json", "--verbose"]).is_err());
    }

    #[test]
    fn test_demo_scenario_builds() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/bend_chamber.json");
        let loaded = Scenario::load(path).unwrap().build().unwrap();
        assert_eq!(loaded.geometry.facets.len(), 6);
        assert_eq!(loaded.regions.len(), 1);
        assert!(loaded.geometry.check_links().is_ok());
    }
}
