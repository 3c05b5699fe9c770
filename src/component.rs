//! Component lifecycle coordination (v0.1)
//!
//! A [`ComponentSpec`] describes a composite entity: a namespace token, the
//! declared output names, and a setup routine that is either synchronous or
//! asynchronous. [`Coordinator::construct`] registers the entity, exposes
//! every declared output as a pending [`Eventual`] before setup runs, then
//! dispatches the routine. Setup failures are forwarded to every pending
//! output, so consumers never hang on a failed initialization.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use crate::diagnostics::{DiagnosticKind, DiagnosticLog, SetupMode};
use crate::error::RiggingError;
use crate::eventual::{Eventual, Resolver};
use crate::graph::{EntityHandle, GraphRuntime, Outputs, ResourceOptions};

/// Pattern for `pkg:module:Type` namespace tokens
static NAMESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][\w-]*(:[A-Za-z][\w-]*)+$").unwrap());

/// Pattern for instance names
static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][\w.-]*$").unwrap());

/// What a setup routine returns: a mapping of produced outputs, or nothing
/// (equivalent to an empty mapping).
pub type SetupResult = anyhow::Result<Option<Outputs>>;

/// Everything a setup routine gets to work with
pub struct SetupInput {
    /// Instance name
    pub name: String,
    /// The entity's own handle, usable as the parent of child resources
    pub handle: EntityHandle,
    /// Caller-supplied arguments
    pub args: Value,
    /// Options the entity itself was constructed with
    pub options: ResourceOptions,
}

/// A setup routine, tagged by dispatch mode.
///
/// The coordinator branches on the variant at construction time; there is
/// no call-time introspection.
pub enum Setup {
    Sync(Box<dyn Fn(SetupInput) -> SetupResult + Send + Sync>),
    Async(Box<dyn Fn(SetupInput) -> BoxFuture<'static, SetupResult> + Send + Sync>),
}

impl Setup {
    fn mode(&self) -> SetupMode {
        match self {
            Setup::Sync(_) => SetupMode::Sync,
            Setup::Async(_) => SetupMode::Async,
        }
    }
}

/// Setup lifecycle of one constructed instance. Terminal in both
/// `Succeeded` and `Failed`; there are no retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupPhase {
    Created,
    Running,
    Succeeded,
    Failed,
}

/// Reusable descriptor for a composite entity.
///
/// ```
/// use rigging::{ComponentSpec, Outputs};
/// use serde_json::json;
///
/// let spec = ComponentSpec::new("pkg:web:Site")
///     .unwrap()
///     .outputs(["url"])
///     .setup_sync(|input| {
///         let mut outs = Outputs::new();
///         outs.insert("url".into(), json!(format!("https://{}", input.name)));
///         Ok(Some(outs))
///     });
/// assert_eq!(spec.declared_outputs(), ["url"]);
/// ```
pub struct ComponentSpec {
    namespace: String,
    outputs: Vec<String>,
    setup: Setup,
}

impl ComponentSpec {
    pub fn new(namespace: impl Into<String>) -> Result<Self, RiggingError> {
        let namespace = namespace.into();
        if !NAMESPACE_PATTERN.is_match(&namespace) {
            return Err(RiggingError::InvalidToken {
                token: namespace,
                expected: "namespace",
            });
        }
        Ok(Self {
            namespace,
            outputs: Vec::new(),
            setup: Setup::Sync(Box::new(|_| Ok(None))),
        })
    }

    /// Declares the entity's output names, in order.
    pub fn outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn setup_sync<F>(mut self, setup: F) -> Self
    where
        F: Fn(SetupInput) -> SetupResult + Send + Sync + 'static,
    {
        self.setup = Setup::Sync(Box::new(setup));
        self
    }

    pub fn setup_async<F, Fut>(mut self, setup: F) -> Self
    where
        F: Fn(SetupInput) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = SetupResult> + Send + 'static,
    {
        self.setup = Setup::Async(Box::new(move |input| setup(input).boxed()));
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn declared_outputs(&self) -> &[String] {
        &self.outputs
    }
}

/// Drives component construction against a graph runtime, recording
/// lifecycle diagnostics along the way.
#[derive(Clone)]
pub struct Coordinator {
    graph: Arc<dyn GraphRuntime>,
    diagnostics: DiagnosticLog,
}

impl Coordinator {
    pub fn new(graph: Arc<dyn GraphRuntime>) -> Self {
        Self {
            graph,
            diagnostics: DiagnosticLog::new(),
        }
    }

    pub fn with_diagnostics(graph: Arc<dyn GraphRuntime>, diagnostics: DiagnosticLog) -> Self {
        Self { graph, diagnostics }
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    /// Constructs one instance of `spec`.
    ///
    /// Registration and output pre-allocation happen before setup is
    /// dispatched, so the returned [`Component`] always carries usable (if
    /// still pending) outputs. A synchronous setup runs inline and its
    /// failure fails this call. An asynchronous setup is scheduled as a
    /// background task (requires a tokio runtime) and cannot be cancelled;
    /// its failure fails every pending output, is recorded in the
    /// diagnostic log, and surfaces through the task's `JoinHandle`.
    #[instrument(skip_all, fields(namespace = %spec.namespace, resource = %name))]
    pub fn construct(
        &self,
        spec: &ComponentSpec,
        name: &str,
        args: Value,
        options: ResourceOptions,
    ) -> Result<Component, RiggingError> {
        if !NAME_PATTERN.is_match(name) {
            return Err(RiggingError::InvalidToken {
                token: name.to_string(),
                expected: "resource name",
            });
        }

        let handle = self
            .graph
            .register_composite(&spec.namespace, name, &options)?;
        self.diagnostics.record(DiagnosticKind::ComponentRegistered {
            urn: handle.urn_arc(),
        });

        // Outputs are usable by the caller before setup has run.
        let mut outputs = HashMap::with_capacity(spec.outputs.len());
        let mut resolvers = Vec::with_capacity(spec.outputs.len());
        for output in &spec.outputs {
            let (eventual, resolver) = Eventual::pending();
            outputs.insert(output.clone(), eventual);
            resolvers.push((output.clone(), resolver));
        }

        let phase = Arc::new(RwLock::new(SetupPhase::Created));
        let input = SetupInput {
            name: name.to_string(),
            handle: handle.clone(),
            args,
            options,
        };
        self.diagnostics.record(DiagnosticKind::SetupDispatched {
            urn: handle.urn_arc(),
            mode: spec.setup.mode(),
        });

        let setup_task = match &spec.setup {
            Setup::Sync(setup) => {
                debug!("running synchronous setup");
                *phase.write() = SetupPhase::Running;
                let result = setup(input);
                self.finish(&handle, &phase, result, resolvers, false)?;
                None
            }
            Setup::Async(setup) => {
                debug!("scheduling asynchronous setup");
                *phase.write() = SetupPhase::Running;
                let future = setup(input);
                let coordinator = self.clone();
                let task_handle = handle.clone();
                let task_phase = Arc::clone(&phase);
                Some(tokio::spawn(async move {
                    let result = future.await;
                    coordinator.finish(&task_handle, &task_phase, result, resolvers, true)
                }))
            }
        };

        Ok(Component {
            name: name.to_string(),
            handle,
            declared: spec.outputs.clone(),
            outputs,
            phase,
            setup_task,
        })
    }

    /// Delivers a finished setup: register the output set with the graph
    /// runtime first, then settle every declared output.
    fn finish(
        &self,
        handle: &EntityHandle,
        phase: &RwLock<SetupPhase>,
        result: SetupResult,
        resolvers: Vec<(String, Resolver)>,
        background: bool,
    ) -> Result<(), RiggingError> {
        match result {
            Ok(produced) => {
                let produced = produced.unwrap_or_default();
                match self.bind_outputs(handle, produced, resolvers) {
                    Ok(bound) => {
                        *phase.write() = SetupPhase::Succeeded;
                        self.diagnostics.record(DiagnosticKind::SetupSucceeded {
                            urn: handle.urn_arc(),
                            bound,
                        });
                        Ok(())
                    }
                    Err(err) => {
                        *phase.write() = SetupPhase::Failed;
                        if background {
                            self.report_background(handle, &err);
                        }
                        Err(err)
                    }
                }
            }
            Err(cause) => {
                let err = RiggingError::SetupFailed {
                    urn: handle.urn().to_string(),
                    cause: format!("{cause:#}"),
                };
                for (_, mut resolver) in resolvers {
                    let _ = resolver.fail(err.clone());
                }
                *phase.write() = SetupPhase::Failed;
                if background {
                    self.report_background(handle, &err);
                }
                Err(err)
            }
        }
    }

    fn bind_outputs(
        &self,
        handle: &EntityHandle,
        produced: Outputs,
        resolvers: Vec<(String, Resolver)>,
    ) -> Result<usize, RiggingError> {
        if let Err(err) = self.graph.register_outputs(handle, &produced) {
            for (_, mut resolver) in resolvers {
                let _ = resolver.fail(err.clone());
            }
            return Err(err);
        }

        let mut bound = 0;
        for (output, mut resolver) in resolvers {
            match produced.get(&output) {
                Some(value) => {
                    let _ = resolver.resolve(value.clone());
                    bound += 1;
                }
                None => {
                    // Declared but not produced: settle to null so holders
                    // of the eventual never hang.
                    self.diagnostics.record(DiagnosticKind::OutputOmitted {
                        urn: handle.urn_arc(),
                        output,
                    });
                    let _ = resolver.resolve(Value::Null);
                }
            }
        }
        Ok(bound)
    }

    fn report_background(&self, handle: &EntityHandle, err: &RiggingError) {
        error!(urn = %handle.urn(), %err, "background setup failed");
        self.diagnostics.record(DiagnosticKind::SetupFailed {
            urn: handle.urn_arc(),
            error: err.to_string(),
        });
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

/// One constructed instance of a [`ComponentSpec`].
pub struct Component {
    name: String,
    handle: EntityHandle,
    declared: Vec<String>,
    outputs: HashMap<String, Eventual>,
    phase: Arc<RwLock<SetupPhase>>,
    setup_task: Option<JoinHandle<Result<(), RiggingError>>>,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &EntityHandle {
        &self.handle
    }

    pub fn urn(&self) -> &str {
        self.handle.urn()
    }

    /// A declared output. Pending until setup delivers it.
    pub fn output(&self, name: &str) -> Option<Eventual> {
        self.outputs.get(name).cloned()
    }

    /// Declared output names, in declaration order.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(String::as_str)
    }

    pub fn setup_phase(&self) -> SetupPhase {
        *self.phase.read()
    }

    /// The background setup task's failure channel (asynchronous setups
    /// only). `None` for synchronous setups, or once taken.
    pub fn take_setup_task(&mut self) -> Option<JoinHandle<Result<(), RiggingError>>> {
        self.setup_task.take()
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("urn", &self.urn())
            .field("outputs", &self.declared)
            .field("phase", &self.setup_phase())
            .finish()
    }
}
