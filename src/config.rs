//! Layered runtime configuration: a TOML file overridden by `OEM__`
//! environment variables (`OEM__MODEL__INVEST=true`, `OEM__SOLVER__WRITE_LP=true`).

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::model::ModelOptions;
use crate::solver::SolverConfig;

const CONFIG_FILE: &str = "config/default.toml";
const ENV_PREFIX: &str = "OEM__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelOptions,
    pub solver: SolverConfig,
}

impl Config {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}
