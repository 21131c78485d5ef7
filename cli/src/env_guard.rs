//! Environment-variable contract.
//!
//! The agent honors a closed set of `SPOTVORTEX_*` variables and refuses
//! to start on any misuse: synthetic prices are never acceptable (live
//! markets are the whole point), synthetic metrics only in dry-run, and
//! the scripted oracle only inside the e2e suite. Checked before any
//! outbound I/O so a misconfigured pod fails fast and loudly.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::bail;

pub const ENV_METRICS_MODE: &str = "SPOTVORTEX_METRICS_MODE";
pub const ENV_PRICE_MODE: &str = "SPOTVORTEX_PRICE_MODE";
pub const ENV_TEST_PRICE_FILE: &str = "SPOTVORTEX_TEST_PRICE_PROVIDER_FILE";
pub const ENV_TEST_PRICE_JSON: &str = "SPOTVORTEX_TEST_PRICE_PROVIDER_JSON";
pub const ENV_E2E_SUITE: &str = "SPOTVORTEX_E2E_SUITE";

const KNOWN_VARS: [&str; 5] = [
    ENV_METRICS_MODE,
    ENV_PRICE_MODE,
    ENV_TEST_PRICE_FILE,
    ENV_TEST_PRICE_JSON,
    ENV_E2E_SUITE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceSource {
    Cloud,
    ScriptedFile(PathBuf),
    ScriptedJson(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsMode {
    Live,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSelection {
    pub price: PriceSource,
    pub metrics: MetricsMode,
}

/// Validate the process environment.
pub fn validate_env(dry_run: bool) -> anyhow::Result<SourceSelection> {
    let vars: HashMap<String, String> = std::env::vars()
        .filter(|(k, _)| k.starts_with("SPOTVORTEX_"))
        .collect();
    validate_env_from(&vars, dry_run)
}

/// Validate an explicit variable map (testable form).
pub fn validate_env_from(
    vars: &HashMap<String, String>,
    dry_run: bool,
) -> anyhow::Result<SourceSelection> {
    for key in vars.keys() {
        if key.starts_with("SPOTVORTEX_") && !KNOWN_VARS.contains(&key.as_str()) {
            bail!("unknown environment variable {key}; the SPOTVORTEX_* set is closed");
        }
    }

    if let Some(mode) = vars.get(ENV_PRICE_MODE) {
        if mode == "synthetic" {
            bail!(
                "{ENV_PRICE_MODE}=synthetic is never permitted; capacity decisions require live market prices"
            );
        }
        bail!("unsupported {ENV_PRICE_MODE} value {mode:?}");
    }

    let metrics = match vars.get(ENV_METRICS_MODE).map(String::as_str) {
        None => MetricsMode::Live,
        Some("synthetic") => {
            if !dry_run {
                bail!("{ENV_METRICS_MODE}=synthetic requires --dry-run=true");
            }
            MetricsMode::Synthetic
        }
        Some(other) => bail!("unsupported {ENV_METRICS_MODE} value {other:?}"),
    };

    let file = vars.get(ENV_TEST_PRICE_FILE);
    let json = vars.get(ENV_TEST_PRICE_JSON);

    let price = match (file, json) {
        (Some(_), Some(_)) => {
            bail!("{ENV_TEST_PRICE_FILE} and {ENV_TEST_PRICE_JSON} are mutually exclusive");
        }
        (None, None) => PriceSource::Cloud,
        (file, json) => {
            if !vars.contains_key(ENV_E2E_SUITE) {
                bail!(
                    "the scripted price oracle requires {ENV_E2E_SUITE} to be set"
                );
            }
            if !dry_run {
                bail!("the scripted price oracle requires --dry-run=true");
            }
            match (file, json) {
                (Some(path), None) => PriceSource::ScriptedFile(PathBuf::from(path)),
                (None, Some(raw)) => PriceSource::ScriptedJson(raw.clone()),
                _ => unreachable!("exclusivity checked above"),
            }
        }
    };

    Ok(SourceSelection { price, metrics })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_environment_selects_live_sources() {
        let sel = validate_env_from(&vars(&[]), true).unwrap();
        assert_eq!(sel.price, PriceSource::Cloud);
        assert_eq!(sel.metrics, MetricsMode::Live);
    }

    #[test]
    fn synthetic_prices_are_always_fatal() {
        for dry_run in [true, false] {
            let err = validate_env_from(&vars(&[(ENV_PRICE_MODE, "synthetic")]), dry_run)
                .unwrap_err();
            assert!(err.to_string().contains("SPOTVORTEX_PRICE_MODE"));
        }
    }

    #[test]
    fn synthetic_metrics_require_dry_run() {
        let sel =
            validate_env_from(&vars(&[(ENV_METRICS_MODE, "synthetic")]), true).unwrap();
        assert_eq!(sel.metrics, MetricsMode::Synthetic);

        let err =
            validate_env_from(&vars(&[(ENV_METRICS_MODE, "synthetic")]), false).unwrap_err();
        assert!(err.to_string().contains("SPOTVORTEX_METRICS_MODE"));
    }

    #[test]
    fn scripted_oracle_sources_are_mutually_exclusive() {
        let err = validate_env_from(
            &vars(&[
                (ENV_TEST_PRICE_FILE, "/tmp/scenario.json"),
                (ENV_TEST_PRICE_JSON, "{}"),
                (ENV_E2E_SUITE, "1"),
            ]),
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn scripted_oracle_requires_the_suite_flag_and_dry_run() {
        let err = validate_env_from(
            &vars(&[(ENV_TEST_PRICE_FILE, "/tmp/scenario.json")]),
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("SPOTVORTEX_E2E_SUITE"));

        let err = validate_env_from(
            &vars(&[
                (ENV_TEST_PRICE_FILE, "/tmp/scenario.json"),
                (ENV_E2E_SUITE, "1"),
            ]),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("dry-run"));

        let sel = validate_env_from(
            &vars(&[
                (ENV_TEST_PRICE_JSON, r#"{ "default": { "current_price": 1.0 } }"#),
                (ENV_E2E_SUITE, "1"),
            ]),
            true,
        )
        .unwrap();
        assert!(matches!(sel.price, PriceSource::ScriptedJson(_)));
    }

    #[test]
    fn unknown_prefixed_variables_are_rejected() {
        let err =
            validate_env_from(&vars(&[("SPOTVORTEX_TURBO", "on")]), true).unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
