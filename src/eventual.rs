//! Deferred values (v0.1)
//!
//! `Eventual` wraps a `serde_json::Value` that may not be known yet. It can
//! be awaited directly, projected with `apply`/`get_attr`/`get_item`, and
//! constructed already-resolved, from a pending pair, or from an arbitrary
//! async computation. Settlement is broadcast: every clone of an `Eventual`
//! observes the identical value or the identical error.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::RiggingError;

/// Outcome of a settled `Eventual`.
pub type Settled = Result<Value, RiggingError>;

/// What a computation handed to an `Eventual` actually produced: a concrete
/// value, another deferred value (to be flattened), or a failure.
///
/// This is the explicit classification that replaces "is it awaitable?"
/// introspection: constructors and projections match on it instead of
/// guessing at call time.
#[derive(Debug)]
pub enum Resolution {
    Concrete(Value),
    Deferred(Eventual),
    Failed(RiggingError),
}

/// Conversion into an `Eventual`, classifying the input first.
pub trait IntoEventual {
    fn into_resolution(self) -> Resolution;

    fn into_eventual(self) -> Eventual
    where
        Self: Sized,
    {
        match self.into_resolution() {
            Resolution::Concrete(value) => Eventual::resolved(value),
            Resolution::Deferred(inner) => inner,
            Resolution::Failed(error) => Eventual::failed(error),
        }
    }
}

impl IntoEventual for Value {
    fn into_resolution(self) -> Resolution {
        Resolution::Concrete(self)
    }
}

impl IntoEventual for Eventual {
    fn into_resolution(self) -> Resolution {
        Resolution::Deferred(self)
    }
}

impl<T> IntoEventual for Result<T, RiggingError>
where
    T: IntoEventual,
{
    fn into_resolution(self) -> Resolution {
        match self {
            Ok(inner) => inner.into_resolution(),
            Err(error) => Resolution::Failed(error),
        }
    }
}

macro_rules! into_eventual_via_value {
    ($($ty:ty),+ $(,)?) => {
        $(impl IntoEventual for $ty {
            fn into_resolution(self) -> Resolution {
                Resolution::Concrete(Value::from(self))
            }
        })+
    };
}

into_eventual_via_value!(bool, i32, i64, u32, u64, f64, String, &str, Vec<Value>);

/// Key for `get_item`: an array index or an object field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Field(String),
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&str> for Key {
    fn from(field: &str) -> Self {
        Key::Field(field.to_string())
    }
}

impl From<String> for Key {
    fn from(field: String) -> Self {
        Key::Field(field)
    }
}

/// A value that will eventually settle to success or failure.
///
/// Cheap to clone; all clones share one settlement. There is no
/// cancellation: once the computation behind an `Eventual` is scheduled it
/// runs to settlement.
#[derive(Clone)]
pub struct Eventual {
    inner: Shared<BoxFuture<'static, Settled>>,
}

impl Eventual {
    fn from_settled_future<F>(future: F) -> Self
    where
        F: Future<Output = Settled> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// An `Eventual` settled to `value` immediately.
    pub fn resolved(value: impl Into<Value>) -> Self {
        Self::from_settled_future(futures::future::ready(Ok(value.into())))
    }

    /// An `Eventual` settled to `error` immediately.
    pub fn failed(error: RiggingError) -> Self {
        Self::from_settled_future(futures::future::ready(Err(error)))
    }

    /// Wraps anything convertible. A concrete value settles immediately;
    /// an already-deferred value is passed through, so nesting flattens:
    /// `wrap(wrap(wrap(5)))` settles to `5`.
    pub fn wrap(value: impl IntoEventual) -> Self {
        value.into_eventual()
    }

    /// A pending `Eventual` plus the resolver that controls it.
    ///
    /// The resolver is the only writer; dropping it unsettled fails the
    /// `Eventual` with [`RiggingError::ResolverDropped`] so awaiters never
    /// hang.
    pub fn pending() -> (Self, Resolver) {
        let (tx, rx) = oneshot::channel::<Settled>();
        let eventual = Self::from_settled_future(async move {
            match rx.await {
                Ok(settled) => settled,
                Err(_) => Err(RiggingError::ResolverDropped),
            }
        });
        (eventual, Resolver { tx: Some(tx) })
    }

    /// Drives an arbitrary async computation to settlement.
    ///
    /// If the future's output is itself deferred it is awaited through
    /// before this `Eventual` settles; that almost always indicates a
    /// caller bug, so a warning is logged.
    pub fn from_future<F, R>(future: F) -> Self
    where
        F: Future<Output = R> + Send + 'static,
        R: IntoEventual + Send + 'static,
    {
        Self::from_settled_future(async move {
            let produced = future.await.into_resolution();
            flatten(produced).await
        })
    }

    /// Runs a synchronous, CPU-bound closure on a worker thread and bridges
    /// the result back into an `Eventual`.
    pub fn from_blocking<F, R>(f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoEventual + Send + 'static,
    {
        Self::from_settled_future(async move {
            match tokio::task::spawn_blocking(f).await {
                Ok(out) => {
                    let produced = out.into_resolution();
                    flatten(produced).await
                }
                Err(join) => Err(RiggingError::Background(join.to_string())),
            }
        })
    }

    /// Eventually calls `f` with the settled value.
    ///
    /// The projection settles strictly after its source. `f` may return a
    /// concrete value, a `Result`, or another `Eventual` (awaited through
    /// before the projection settles). If the source failed, or `f` fails,
    /// the projection fails with that cause. `f` should be a pure
    /// projection; purity is not enforced.
    pub fn apply<F, R>(&self, f: F) -> Eventual
    where
        F: FnOnce(Value) -> R + Send + 'static,
        R: IntoEventual + Send + 'static,
    {
        let source = self.clone();
        Self::from_settled_future(async move {
            let value = source.await?;
            let produced = f(value).into_resolution();
            match produced {
                Resolution::Concrete(value) => Ok(value),
                Resolution::Deferred(inner) => inner.await,
                Resolution::Failed(error) => Err(error),
            }
        })
    }

    /// Shortcut to read a named field off the eventual value.
    pub fn get_attr(&self, field: impl Into<String>) -> Eventual {
        let field = field.into();
        self.apply(move |value| {
            let value_type = value_type(&value);
            match value.get(field.as_str()) {
                Some(found) => Ok(found.clone()),
                None => Err(RiggingError::FieldNotFound { field, value_type }),
            }
        })
    }

    /// Shortcut to read an indexed or keyed element off the eventual value.
    pub fn get_item(&self, key: impl Into<Key>) -> Eventual {
        let key = key.into();
        self.apply(move |value| {
            let value_type = value_type(&value);
            match key {
                Key::Index(index) => match value.get(index) {
                    Some(found) => Ok(found.clone()),
                    None => Err(RiggingError::IndexNotFound { index, value_type }),
                },
                Key::Field(field) => match value.get(field.as_str()) {
                    Some(found) => Ok(found.clone()),
                    None => Err(RiggingError::FieldNotFound { field, value_type }),
                },
            }
        })
    }

    /// The settled outcome, awaited without consuming this handle.
    pub async fn settled(&self) -> Settled {
        self.clone().await
    }

    /// The settled outcome, if some awaiter has already driven this value
    /// to settlement. `None` means pending or not yet observed.
    pub fn peek(&self) -> Option<Settled> {
        self.inner.peek().cloned()
    }
}

impl Future for Eventual {
    type Output = Settled;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl std::fmt::Debug for Eventual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.peek() {
            Some(Ok(value)) => f.debug_tuple("Eventual").field(value).finish(),
            Some(Err(error)) => f.debug_tuple("Eventual").field(error).finish(),
            None => f.write_str("Eventual(<pending>)"),
        }
    }
}

/// Write half of a pending pair. `resolve`/`fail` each settle at most once;
/// the second attempt returns [`RiggingError::AlreadySettled`] and leaves
/// the first settlement untouched.
#[derive(Debug)]
pub struct Resolver {
    tx: Option<oneshot::Sender<Settled>>,
}

impl Resolver {
    pub fn resolve(&mut self, value: impl Into<Value>) -> Result<(), RiggingError> {
        self.settle(Ok(value.into()))
    }

    pub fn fail(&mut self, error: RiggingError) -> Result<(), RiggingError> {
        self.settle(Err(error))
    }

    pub fn is_settled(&self) -> bool {
        self.tx.is_none()
    }

    fn settle(&mut self, outcome: Settled) -> Result<(), RiggingError> {
        match self.tx.take() {
            Some(tx) => {
                // All readers gone: the settlement has no audience, discard it.
                let _ = tx.send(outcome);
                Ok(())
            }
            None => Err(RiggingError::AlreadySettled),
        }
    }
}

/// Awaits through a deferred result until a concrete value remains.
async fn flatten(produced: Resolution) -> Settled {
    match produced {
        Resolution::Concrete(value) => Ok(value),
        Resolution::Failed(error) => Err(error),
        Resolution::Deferred(inner) => {
            warn!("nested deferred value, awaiting through; this usually indicates a caller bug");
            inner.await
        }
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
