use anyhow::{bail, Context, Result};

use open_energy_model::{Config, EnergySystem, Scenario};

fn main() -> Result<()> {
    open_energy_model::telemetry::init_tracing();

    let path = match std::env::args().nth(1) {
        Some(p) => p,
        None => bail!("usage: open-energy-model <scenario.yaml>"),
    };
    let config = Config::load().context("loading configuration")?;

    let file = std::fs::File::open(&path).with_context(|| format!("opening scenario {path}"))?;
    let scenario: Scenario =
        serde_yaml::from_reader(file).with_context(|| format!("parsing scenario {path}"))?;
    let timesteps: Vec<usize> = (0..scenario.timesteps).collect();
    let mut system = EnergySystem::new(scenario.entities);

    let objective =
        open_energy_model::optimize(&mut system, &timesteps, config.model, &config.solver)
            .context("optimisation failed")?;

    let report = serde_json::json!({
        "objective": objective,
        "entities": system.entities,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
