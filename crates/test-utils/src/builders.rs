#![allow(dead_code)]

use std::collections::BTreeMap;

use bootdag::config::{ConfigSection, Manifest, RawManifest, ServiceConfig};

/// Builder for `Manifest` to simplify test setup.
pub struct ManifestBuilder {
    manifest: RawManifest,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self {
            manifest: RawManifest {
                config: ConfigSection::default(),
                service: BTreeMap::new(),
            },
        }
    }

    pub fn with_service(mut self, name: &str, service: ServiceConfig) -> Self {
        self.manifest.service.insert(name.to_string(), service);
        self
    }

    pub fn ready_timeout(mut self, duration: &str) -> Self {
        self.manifest.config.ready_timeout = duration.to_string();
        self
    }

    pub fn stop_timeout(mut self, duration: &str) -> Self {
        self.manifest.config.stop_timeout = duration.to_string();
        self
    }

    pub fn raw(self) -> RawManifest {
        self.manifest
    }

    pub fn build(self) -> Manifest {
        Manifest::try_from(self.manifest).expect("Failed to build valid manifest from builder")
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ServiceConfig`.
pub struct ServiceConfigBuilder {
    service: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            service: ServiceConfig {
                cmd: cmd.to_string(),
                needs: vec![],
                ready_on_stdout: None,
                ready_after: None,
            },
        }
    }

    pub fn needs(mut self, dep: &str) -> Self {
        self.service.needs.push(dep.to_string());
        self
    }

    pub fn ready_on_stdout(mut self, pattern: &str) -> Self {
        self.service.ready_on_stdout = Some(pattern.to_string());
        self
    }

    pub fn ready_after(mut self, duration: &str) -> Self {
        self.service.ready_after = Some(duration.to_string());
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.service
    }
}
