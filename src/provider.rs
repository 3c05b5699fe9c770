//! Provider selection and configuration overrides (v0.1)
//!
//! Handles the local-emulator switch and per-region provider handles.
//! Uses DashMap for the write-once provider cache.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RiggingError;
use crate::graph::{EntityHandle, ResourceOptions};

/// Environment switch enabling the local emulator
const STAGE_VAR: &str = "STAGE";
const EMULATOR_STAGE: &str = "local";

/// Region sources consulted after explicit argument and stack config
const REGION_VARS: [&str; 2] = ["AWS_REGION", "AWS_DEFAULT_REGION"];

/// Per-service endpoints of the local emulator
static EMULATOR_ENDPOINTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("apigateway", "http://localhost:4567"),
        ("cloudformation", "http://localhost:4581"),
        ("cloudwatch", "http://localhost:4582"),
        ("cloudwatchlogs", "http://localhost:4586"),
        ("dynamodb", "http://localhost:4569"),
        ("es", "http://localhost:4578"),
        ("firehose", "http://localhost:4573"),
        ("iam", "http://localhost:4593"),
        ("kinesis", "http://localhost:4568"),
        ("kms", "http://localhost:4584"),
        ("lambda", "http://localhost:4574"),
        ("redshift", "http://localhost:4577"),
        ("route53", "http://localhost:4580"),
        ("s3", "http://localhost:4572"),
        ("ses", "http://localhost:4579"),
        ("sns", "http://localhost:4575"),
        ("sqs", "http://localhost:4576"),
        ("ssm", "http://localhost:4583"),
        ("sts", "http://localhost:4592"),
    ])
});

/// Configuration handle attached to child resource calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provider {
    pub name: String,
    pub region: String,
    /// service → endpoint overrides (populated for the emulator)
    pub endpoints: HashMap<String, String>,
    pub skip_credential_checks: bool,
}

impl Provider {
    pub fn for_region(region: impl Into<String>) -> Self {
        let region = region.into();
        Self {
            name: region.clone(),
            region,
            endpoints: HashMap::new(),
            skip_credential_checks: false,
        }
    }

    /// The local-emulator provider: fixed region, mock credentials, every
    /// service pointed at a local endpoint.
    pub fn emulator() -> Self {
        Self {
            name: "localstack".to_string(),
            region: "us-east-1".to_string(),
            endpoints: EMULATOR_ENDPOINTS
                .iter()
                .map(|(service, endpoint)| (service.to_string(), endpoint.to_string()))
                .collect(),
            skip_credential_checks: true,
        }
    }

    pub fn endpoint(&self, service: &str) -> Option<&str> {
        self.endpoints.get(service).map(String::as_str)
    }

    pub fn is_emulator(&self) -> bool {
        !self.endpoints.is_empty()
    }
}

/// Provider registry with a write-once per-region cache.
///
/// In emulator mode every lookup returns the emulator provider, whatever
/// the region.
pub struct ProviderRegistry {
    emulator: Option<Arc<Provider>>,
    cache: DashMap<String, Arc<Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            emulator: None,
            cache: DashMap::new(),
        }
    }

    pub fn with_emulator(provider: Provider) -> Self {
        Self {
            emulator: Some(Arc::new(provider)),
            cache: DashMap::new(),
        }
    }

    /// Honors the `STAGE=local` switch.
    pub fn from_env() -> Self {
        if std::env::var(STAGE_VAR).as_deref() == Ok(EMULATOR_STAGE) {
            Self::with_emulator(Provider::emulator())
        } else {
            Self::new()
        }
    }

    pub fn is_emulated(&self) -> bool {
        self.emulator.is_some()
    }

    /// Get or create the provider for a region (atomic via DashMap entry API)
    pub fn for_region(&self, region: &str) -> Arc<Provider> {
        if let Some(emulator) = &self.emulator {
            return Arc::clone(emulator);
        }

        use dashmap::mapref::entry::Entry;

        match self.cache.entry(region.to_string()) {
            Entry::Occupied(e) => Arc::clone(e.get()),
            Entry::Vacant(e) => {
                debug!(region, "creating provider");
                let provider = Arc::new(Provider::for_region(region));
                e.insert(Arc::clone(&provider));
                provider
            }
        }
    }

    /// Assembles [`ResourceOptions`] for a resource call.
    ///
    /// The emulator provider is attached only to top-level resources;
    /// children inherit their parent's provider. Outside emulator mode a
    /// region, when given, selects a cached per-region provider.
    pub fn options(&self, region: Option<&str>, parent: Option<EntityHandle>) -> ResourceOptions {
        let mut options = ResourceOptions {
            parent,
            provider: None,
        };
        if let Some(emulator) = &self.emulator {
            if options.parent.is_none() {
                options.provider = Some(Arc::clone(emulator));
            }
        } else if let Some(region) = region {
            options.provider = Some(self.for_region(region));
        }
        options
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Detects the region for resource calls.
///
/// Precedence: explicit argument, then stack configuration, then
/// `AWS_REGION`, then `AWS_DEFAULT_REGION`.
pub fn detect_region(
    explicit: Option<&str>,
    config: Option<&str>,
) -> Result<String, RiggingError> {
    detect_region_with(explicit, config, |var| std::env::var(var).ok())
}

fn detect_region_with<F>(
    explicit: Option<&str>,
    config: Option<&str>,
    env: F,
) -> Result<String, RiggingError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(region) = explicit {
        return Ok(region.to_string());
    }
    if let Some(region) = config {
        return Ok(region.to_string());
    }
    for var in REGION_VARS {
        if let Some(region) = env(var) {
            if !region.is_empty() {
                return Ok(region);
            }
        }
    }
    Err(RiggingError::NoRegion)
}
