// src/config/validate.rs

use regex::Regex;

use crate::config::model::{Manifest, RawManifest, ServiceConfig, ServiceSpec};
use crate::dag::validate;
use crate::errors::{BootError, Result};
use crate::types::{parse_duration, Readiness, Timeouts};

impl TryFrom<RawManifest> for Manifest {
    type Error = BootError;

    fn try_from(raw: RawManifest) -> std::result::Result<Self, Self::Error> {
        ensure_has_services(&raw)?;
        let timeouts = validate_global_config(&raw)?;
        let services = raw
            .service
            .into_iter()
            .map(|(name, cfg)| validate_service(name, cfg))
            .collect::<Result<Vec<_>>>()?;
        validate(&services)?;
        Ok(Manifest::new_unchecked(timeouts, services))
    }
}

fn ensure_has_services(raw: &RawManifest) -> Result<()> {
    if raw.service.is_empty() {
        return Err(BootError::Config(
            "manifest must contain at least one [service.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(raw: &RawManifest) -> Result<Timeouts> {
    let ready = parse_duration(&raw.config.ready_timeout)
        .map_err(|e| BootError::Config(format!("[config].ready_timeout: {e}")))?;
    let stop = parse_duration(&raw.config.stop_timeout)
        .map_err(|e| BootError::Config(format!("[config].stop_timeout: {e}")))?;

    if ready.is_zero() {
        return Err(BootError::Config(
            "[config].ready_timeout must be greater than zero".to_string(),
        ));
    }

    Ok(Timeouts { ready, stop })
}

fn validate_service(name: String, cfg: ServiceConfig) -> Result<ServiceSpec> {
    if cfg.cmd.trim().is_empty() {
        return Err(BootError::Config(format!(
            "service '{name}' has an empty `cmd`"
        )));
    }

    let readiness = match (&cfg.ready_on_stdout, &cfg.ready_after) {
        (Some(_), Some(_)) => {
            return Err(BootError::Config(format!(
                "service '{name}' sets both `ready_on_stdout` and `ready_after`; pick one"
            )));
        }
        (Some(pattern), None) => {
            let re = Regex::new(pattern).map_err(|e| {
                BootError::Config(format!(
                    "service '{name}' has an invalid `ready_on_stdout` regex: {e}"
                ))
            })?;
            Readiness::Stdout(re)
        }
        (None, Some(after)) => {
            let dur = parse_duration(after).map_err(|e| {
                BootError::Config(format!("service '{name}' `ready_after`: {e}"))
            })?;
            Readiness::After(dur)
        }
        (None, None) => Readiness::Exit,
    };

    Ok(ServiceSpec {
        name,
        cmd: cfg.cmd,
        needs: cfg.needs,
        readiness,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn parse(toml_src: &str) -> Result<Manifest> {
        let raw: RawManifest = toml::from_str(toml_src)?;
        Manifest::try_from(raw)
    }

    #[test]
    fn valid_manifest_with_defaults() {
        let manifest = parse(
            r#"
[service.db]
cmd = "sleep 60"
ready_on_stdout = "^ready"

[service.app]
cmd = "sleep 60"
needs = ["db"]
ready_after = "250ms"

[service.migrate]
cmd = "true"
needs = ["db"]
"#,
        )
        .unwrap();

        assert_eq!(manifest.timeouts, Timeouts::default());
        let names: Vec<_> = manifest.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["app", "db", "migrate"]);
        assert!(matches!(
            manifest.services[0].readiness,
            Readiness::After(d) if d == Duration::from_millis(250)
        ));
        assert!(matches!(manifest.services[1].readiness, Readiness::Stdout(_)));
        assert!(matches!(manifest.services[2].readiness, Readiness::Exit));
    }

    #[test]
    fn empty_manifest_is_rejected() {
        assert!(matches!(parse(""), Err(BootError::Config(_))));
    }

    #[test]
    fn bad_durations_and_regexes_are_config_errors() {
        let err =
            parse("[config]\nready_timeout = \"soon\"\n[service.a]\ncmd = \"true\"\n").unwrap_err();
        assert!(err.to_string().contains("ready_timeout"));

        let err = parse("[service.a]\ncmd = \"true\"\nready_on_stdout = \"(\"\n").unwrap_err();
        assert!(err.to_string().contains("invalid `ready_on_stdout` regex"));

        let err = parse("[service.a]\ncmd = \"true\"\nready_on_stdout = \"x\"\nready_after = \"1s\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("pick one"));
    }

    #[test]
    fn graph_defects_use_flawed_graph_format() {
        let err = parse(
            r#"
[service.a]
cmd = "true"
needs = ["b"]

[service.b]
cmd = "true"
needs = ["a", "ghost"]
"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Flawed dependency graph:\n  - [a] circles around via [a -> b -> a]\n  - [b] needs [ghost], which has no provider"
        );
    }
}
