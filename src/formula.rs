use std::fmt;
use std::sync::Arc;

use crate::{Result, Scope, SpaceId, Value};

type Body<T> = dyn Fn(&mut Scope<'_>) -> Result<T> + Send + Sync;

/// The executable part of a cell.
///
/// How a formula was authored is none of the model's business: it only sees
/// the declared parameters and an opaque body which reads everything else
/// through the [`Scope`] it is handed. Cloning is cheap.
#[derive(Clone)]
pub struct Formula {
    params: Arc<[String]>,
    symbols: Arc<[String]>,
    body: Arc<Body<Value>>,
}

impl Formula {
    pub fn new<P, F>(params: P, body: F) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        F: Fn(&mut Scope<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            symbols: Arc::from(Vec::new()),
            body: Arc::new(body),
        }
    }

    /// A formula without parameters.
    pub fn nullary<F>(body: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(std::iter::empty::<String>(), body)
    }

    /// A formula which always returns `value`.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::nullary(move |_| Ok(value.clone()))
    }

    /// Declare the free symbols this formula may read. Only used by
    /// [`Model::unresolved_symbols`](crate::Model::unresolved_symbols).
    pub fn with_symbols<S>(mut self, symbols: S) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub(crate) fn evaluate(&self, scope: &mut Scope<'_>) -> Result<Value> {
        (self.body)(scope)
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Formula({})", self.params.join(", "))
    }
}

/// What a deriving rule returns for one argument tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    pub name: String,
    pub bases: Vec<SpaceId>,
}

impl ChildSpec {
    pub fn new(name: impl Into<String>, bases: impl IntoIterator<Item = SpaceId>) -> Self {
        Self {
            name: name.into(),
            bases: bases.into_iter().collect(),
        }
    }
}

/// Turns a space into a parameterized archetype whose instances are created on demand.
///
/// The body runs once per distinct argument tuple, with the archetype as
/// [`Scope::this`] and the arguments bound to `params`.
#[derive(Clone)]
pub struct DerivingRule {
    params: Arc<[String]>,
    body: Arc<Body<ChildSpec>>,
}

impl DerivingRule {
    pub fn new<P, F>(params: P, body: F) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        F: Fn(&mut Scope<'_>) -> Result<ChildSpec> + Send + Sync + 'static,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            body: Arc::new(body),
        }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub(crate) fn derive(&self, scope: &mut Scope<'_>) -> Result<ChildSpec> {
        (self.body)(scope)
    }
}

impl fmt::Debug for DerivingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivingRule({})", self.params.join(", "))
    }
}
