//! Merge CLI flags, environment variables, and hard defaults: `CLI flag >
//! environment variable > hardcoded default` (spec.md §4.9). This is an
//! explicit departure from the teacher workspace's project-TOML-over-user-
//! TOML merge — no config file layer is part of this spec's surface.

use aav3_core::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub consensus_threshold: f64,
    pub max_rounds: u32,
    pub model: String,
    pub llm_timeout_sec: u64,
    pub python_syntax_timeout_sec: u64,
    pub docker_build_timeout_sec: u64,
    pub unit_test_timeout_sec: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            consensus_threshold: 0.67,
            max_rounds: 50,
            model: "gpt-4".to_string(),
            llm_timeout_sec: 900,
            python_syntax_timeout_sec: 30,
            docker_build_timeout_sec: 600,
            unit_test_timeout_sec: 120,
        }
    }
}

/// The subset of options a CLI flag can override. `None` means "not passed
/// on the command line", falling through to the environment variable, then
/// the hardcoded default.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub consensus_threshold: Option<f64>,
    pub max_rounds: Option<u32>,
    pub model: Option<String>,
    pub llm_timeout_sec: Option<u64>,
    pub python_syntax_timeout_sec: Option<u64>,
    pub docker_build_timeout_sec: Option<u64>,
    pub unit_test_timeout_sec: Option<u64>,
}

/// Resolve the final `Config`, given CLI overrides and a function that
/// looks up an environment variable by name (injected so this is testable
/// without mutating real process environment).
pub fn resolve(
    overrides: &CliOverrides,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, AppError> {
    let defaults = Config::default();

    let consensus_threshold = resolve_f64(
        overrides.consensus_threshold,
        "AAV3_CONSENSUS_THRESHOLD",
        defaults.consensus_threshold,
        &env_lookup,
    )?;
    let max_rounds = resolve_u32(
        overrides.max_rounds,
        "AAV3_MAX_ROUNDS",
        defaults.max_rounds,
        &env_lookup,
    )?;
    let model = overrides
        .model
        .clone()
        .or_else(|| env_lookup("AAV3_MODEL"))
        .unwrap_or(defaults.model);
    let llm_timeout_sec = resolve_u64(
        overrides.llm_timeout_sec,
        "AAV3_LLM_TIMEOUT_SEC",
        defaults.llm_timeout_sec,
        &env_lookup,
    )?;
    let python_syntax_timeout_sec = resolve_u64(
        overrides.python_syntax_timeout_sec,
        "AAV3_PYTHON_SYNTAX_TIMEOUT_SEC",
        defaults.python_syntax_timeout_sec,
        &env_lookup,
    )?;
    let docker_build_timeout_sec = resolve_u64(
        overrides.docker_build_timeout_sec,
        "AAV3_DOCKER_BUILD_TIMEOUT_SEC",
        defaults.docker_build_timeout_sec,
        &env_lookup,
    )?;
    let unit_test_timeout_sec = resolve_u64(
        overrides.unit_test_timeout_sec,
        "AAV3_UNIT_TEST_TIMEOUT_SEC",
        defaults.unit_test_timeout_sec,
        &env_lookup,
    )?;

    let config = Config {
        consensus_threshold,
        max_rounds,
        model,
        llm_timeout_sec,
        python_syntax_timeout_sec,
        docker_build_timeout_sec,
        unit_test_timeout_sec,
    };
    validate(&config)?;
    Ok(config)
}

fn resolve_f64(
    cli: Option<f64>,
    env_name: &str,
    default: f64,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Result<f64, AppError> {
    if let Some(v) = cli {
        return Ok(v);
    }
    match env_lookup(env_name) {
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|_| AppError::ConfigError(format!("{env_name}='{raw}' is not a valid number"))),
        None => Ok(default),
    }
}

fn resolve_u32(
    cli: Option<u32>,
    env_name: &str,
    default: u32,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Result<u32, AppError> {
    if let Some(v) = cli {
        return Ok(v);
    }
    match env_lookup(env_name) {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| AppError::ConfigError(format!("{env_name}='{raw}' is not a valid integer"))),
        None => Ok(default),
    }
}

fn resolve_u64(
    cli: Option<u64>,
    env_name: &str,
    default: u64,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Result<u64, AppError> {
    if let Some(v) = cli {
        return Ok(v);
    }
    match env_lookup(env_name) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| AppError::ConfigError(format!("{env_name}='{raw}' is not a valid integer"))),
        None => Ok(default),
    }
}

fn validate(config: &Config) -> Result<(), AppError> {
    if !(0.0..=1.0).contains(&config.consensus_threshold) {
        return Err(AppError::ConfigError(format!(
            "consensus_threshold must be in [0,1], got {}",
            config.consensus_threshold
        )));
    }
    if config.max_rounds == 0 {
        return Err(AppError::ConfigError("max_rounds must be positive".to_string()));
    }
    if config.llm_timeout_sec == 0
        || config.python_syntax_timeout_sec == 0
        || config.docker_build_timeout_sec == 0
        || config.unit_test_timeout_sec == 0
    {
        return Err(AppError::ConfigError("timeouts must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_map(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_with_no_cli_or_env() {
        let config = resolve(&CliOverrides::default(), env_map(&[])).unwrap();
        assert_eq!(config.consensus_threshold, 0.67);
        assert_eq!(config.max_rounds, 50);
        assert_eq!(config.model, "gpt-4");
    }

    #[test]
    fn env_var_overrides_default() {
        let config = resolve(
            &CliOverrides::default(),
            env_map(&[("AAV3_MAX_ROUNDS", "10")]),
        )
        .unwrap();
        assert_eq!(config.max_rounds, 10);
    }

    #[test]
    fn cli_flag_overrides_env_var() {
        let overrides = CliOverrides {
            max_rounds: Some(5),
            ..Default::default()
        };
        let config = resolve(&overrides, env_map(&[("AAV3_MAX_ROUNDS", "10")])).unwrap();
        assert_eq!(config.max_rounds, 5);
    }

    #[test]
    fn invalid_threshold_is_a_config_error() {
        let overrides = CliOverrides {
            consensus_threshold: Some(1.5),
            ..Default::default()
        };
        let err = resolve(&overrides, env_map(&[])).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn zero_max_rounds_is_a_config_error() {
        let overrides = CliOverrides {
            max_rounds: Some(0),
            ..Default::default()
        };
        let err = resolve(&overrides, env_map(&[])).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn malformed_env_value_is_a_config_error() {
        let err = resolve(
            &CliOverrides::default(),
            env_map(&[("AAV3_CONSENSUS_THRESHOLD", "not-a-number")]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn model_env_var_is_honored_when_no_cli_flag() {
        let config = resolve(
            &CliOverrides::default(),
            env_map(&[("AAV3_MODEL", "gpt-4o")]),
        )
        .unwrap();
        assert_eq!(config.model, "gpt-4o");
    }
}
