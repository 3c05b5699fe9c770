//! # Lifecycle Tests
//!
//! End-to-end tests for component construction against the in-memory graph:
//! - wiring one component's outputs into another's setup
//! - provider/emulator options on registered entities
//! - failure forwarding and the diagnostic trail

use std::sync::Arc;

use rigging::{
    ComponentSpec, Coordinator, DiagnosticKind, GraphRuntime, InMemoryGraph, Outputs, Provider,
    ProviderRegistry, ResourceOptions, RiggingError, SetupPhase,
};
use serde_json::{json, Value};

// ============================================================================
// TEST HELPERS
// ============================================================================

fn coordinator() -> (Coordinator, Arc<InMemoryGraph>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let graph = Arc::new(InMemoryGraph::new());
    let runtime: Arc<dyn GraphRuntime> = graph.clone();
    (Coordinator::new(runtime), graph)
}

fn outputs_of(pairs: &[(&str, Value)]) -> Outputs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn network_spec() -> ComponentSpec {
    ComponentSpec::new("pkg:net:Network")
        .unwrap()
        .outputs(["endpoint", "cidr"])
        .setup_async(|input| async move {
            Ok(Some(outputs_of(&[
                (
                    "endpoint",
                    json!({"host": format!("{}.internal", input.name), "port": 5432}),
                ),
                ("cidr", json!("10.0.0.0/16")),
            ])))
        })
}

// ============================================================================
// COMPONENT WIRING - outputs feed downstream setups
// ============================================================================

#[tokio::test]
async fn downstream_setup_consumes_upstream_outputs() {
    let (coordinator, graph) = coordinator();

    let network = coordinator
        .construct(
            &network_spec(),
            "core",
            json!({}),
            ResourceOptions::default(),
        )
        .unwrap();

    // Wire the pending endpoint straight into the app's setup.
    let endpoint = network.output("endpoint").unwrap();
    let app_spec = ComponentSpec::new("pkg:app:Service")
        .unwrap()
        .outputs(["dsn"])
        .setup_async(move |input| {
            let endpoint = endpoint.clone();
            async move {
                let endpoint = endpoint.await.map_err(anyhow::Error::new)?;
                let dsn = format!(
                    "postgres://{}:{}/{}",
                    endpoint["host"].as_str().unwrap(),
                    endpoint["port"],
                    input.name,
                );
                Ok(Some(outputs_of(&[("dsn", json!(dsn))])))
            }
        });

    let mut app = coordinator
        .construct(&app_spec, "api", json!({}), ResourceOptions::default())
        .unwrap();

    app.take_setup_task().unwrap().await.unwrap().unwrap();
    assert_eq!(
        app.output("dsn").unwrap().await,
        Ok(json!("postgres://core.internal:5432/api"))
    );

    assert_eq!(graph.len(), 2);
    assert!(graph.outputs("pkg:net:Network::core").is_some());
}

#[tokio::test]
async fn projections_off_component_outputs() {
    let (coordinator, _graph) = coordinator();

    let mut network = coordinator
        .construct(
            &network_spec(),
            "edge",
            json!({}),
            ResourceOptions::default(),
        )
        .unwrap();

    let host = network.output("endpoint").unwrap().get_attr("host");
    assert_eq!(host.peek(), None);

    network.take_setup_task().unwrap().await.unwrap().unwrap();
    assert_eq!(host.await, Ok(json!("edge.internal")));
}

#[tokio::test]
async fn upstream_failure_reaches_downstream_consumers() {
    let (coordinator, _graph) = coordinator();

    let spec = ComponentSpec::new("pkg:net:Network")
        .unwrap()
        .outputs(["endpoint"])
        .setup_async(|_| async { Err(anyhow::anyhow!("no capacity")) });

    let mut network = coordinator
        .construct(&spec, "core", json!({}), ResourceOptions::default())
        .unwrap();

    let host = network.output("endpoint").unwrap().get_attr("host");

    let err = network
        .take_setup_task()
        .unwrap()
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(host.await, Err(err));
    assert_eq!(network.setup_phase(), SetupPhase::Failed);
    assert_eq!(coordinator.diagnostics().failures().len(), 1);
}

// ============================================================================
// PROVIDER OPTIONS - emulator and per-region providers on entities
// ============================================================================

#[tokio::test]
async fn emulator_options_attach_to_top_level_entities() {
    let (coordinator, graph) = coordinator();
    let registry = ProviderRegistry::with_emulator(Provider::emulator());

    let spec = ComponentSpec::new("pkg:store:Bucket").unwrap();
    let component = coordinator
        .construct(&spec, "assets", json!({}), registry.options(None, None))
        .unwrap();

    let registered = graph.entity(component.urn()).unwrap();
    let provider = registered.provider.unwrap();
    assert!(provider.is_emulator());
    assert_eq!(provider.endpoint("s3"), Some("http://localhost:4572"));

    // A child parented to the bucket inherits instead.
    let child_options = registry.options(None, Some(component.handle().clone()));
    let child = coordinator
        .construct(&spec, "assets-logs", json!({}), child_options)
        .unwrap();
    let registered = graph.entity(child.urn()).unwrap();
    assert!(registered.provider.is_none());
    assert_eq!(registered.parent.unwrap(), *component.handle());
}

#[tokio::test]
async fn regional_providers_are_shared_between_entities() {
    let (coordinator, graph) = coordinator();
    let registry = ProviderRegistry::new();

    let spec = ComponentSpec::new("pkg:store:Bucket").unwrap();
    let first = coordinator
        .construct(
            &spec,
            "a",
            json!({}),
            registry.options(Some("eu-west-1"), None),
        )
        .unwrap();
    let second = coordinator
        .construct(
            &spec,
            "b",
            json!({}),
            registry.options(Some("eu-west-1"), None),
        )
        .unwrap();

    let p1 = graph.entity(first.urn()).unwrap().provider.unwrap();
    let p2 = graph.entity(second.urn()).unwrap().provider.unwrap();
    assert!(Arc::ptr_eq(&p1, &p2));
}

// ============================================================================
// DIAGNOSTIC TRAIL
// ============================================================================

#[tokio::test]
async fn lifecycle_leaves_an_ordered_diagnostic_trail() {
    let (coordinator, _graph) = coordinator();

    let mut network = coordinator
        .construct(
            &network_spec(),
            "core",
            json!({}),
            ResourceOptions::default(),
        )
        .unwrap();
    network.take_setup_task().unwrap().await.unwrap().unwrap();

    let trail = coordinator.diagnostics().for_entity("pkg:net:Network::core");
    let kinds: Vec<&str> = trail
        .iter()
        .map(|d| match &d.kind {
            DiagnosticKind::ComponentRegistered { .. } => "registered",
            DiagnosticKind::SetupDispatched { .. } => "dispatched",
            DiagnosticKind::SetupSucceeded { .. } => "succeeded",
            DiagnosticKind::SetupFailed { .. } => "failed",
            DiagnosticKind::OutputOmitted { .. } => "omitted",
        })
        .collect();

    assert_eq!(kinds, ["registered", "dispatched", "succeeded"]);

    let json = coordinator.diagnostics().to_json();
    assert!(json.is_array());
    assert_eq!(json.as_array().unwrap().len(), trail.len());
}

#[tokio::test]
async fn construction_failures_are_ordinary_errors() {
    let (coordinator, _graph) = coordinator();

    let spec = ComponentSpec::new("pkg:db:Cluster")
        .unwrap()
        .outputs(["conn"])
        .setup_sync(|input| {
            let region = input.args["region"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("region required"))?;
            Ok(Some(outputs_of(&[(
                "conn",
                json!(format!("{region}.db.example.com")),
            )])))
        });

    let err = coordinator
        .construct(&spec, "main", json!({}), ResourceOptions::default())
        .unwrap_err();
    assert!(matches!(
        &err,
        RiggingError::SetupFailed { cause, .. } if cause.contains("region required")
    ));

    let ok = coordinator
        .construct(
            &spec,
            "replica",
            json!({"region": "eu-west-1"}),
            ResourceOptions::default(),
        )
        .unwrap();
    assert_eq!(
        ok.output("conn").unwrap().await,
        Ok(json!("eu-west-1.db.example.com"))
    );
}
