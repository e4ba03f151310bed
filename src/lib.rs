//! # Cellspace
//!
//! cellspace is a library for building numerical models out of memoized formula cells
//! which are recomputed only when something they read changes.
//!
//! A central [`Model`] owns a tree of _spaces_. Each space holds named _cells_ (formulas
//! with parameters whose results are cached per argument tuple), named _references_ (plain
//! values), and child spaces. Formulas must be pure: a result is computed once for each
//! argument tuple and returned from the cache afterwards, so side effects are not repeated.
//!
//! For this example we're going to model the following spreadsheet:
//!
//! ```text
//!       [  A  ] [     B    ]
//! [ 1 ] [ 12  ] [ =A1 + 8  ]
//! [ 2 ] [  4  ] [ =B1 + A2 ]
//! ```
//!
//! `a1` and `a2` are inputs, so they become references. `b1` and `b2` are computed, so they
//! become cells. A formula reads every name through the [`Scope`] it is handed, which is how
//! the model learns that `b1` depends on `a1` and that `b2` depends on `b1` and `a2` directly
//! and on `a1` transitively:
//!
//! ```
//! use cellspace::{Formula, Model, Owner, Value};
//!
//! let mut model = Model::new("Spreadsheet")?;
//! let sheet = model.new_space(Owner::Model, "Sheet1")?;
//! model.set_ref(sheet, "a1", 12)?;
//! model.set_ref(sheet, "a2", 4)?;
//!
//! let b1 = model.new_cell(sheet, "b1", Formula::nullary(|scope| {
//!     Ok(Value::Int(scope.get("a1")?.as_int()? + 8))
//! }))?;
//! let b2 = model.new_cell(sheet, "b2", Formula::nullary(|scope| {
//!     let b1 = scope.get("b1")?.as_int()?;
//!     Ok(Value::Int(b1 + scope.get("a2")?.as_int()?))
//! }))?;
//!
//! assert_eq!(model.call(b2, &[])?, Value::Int(24));
//!
//! // b2 is stale and gets recomputed, but b1 does not read a2 and keeps its value.
//! model.set_ref(sheet, "a2", 10)?;
//! assert!(model.is_cached(b1, &[]));
//! assert!(!model.is_cached(b2, &[]));
//! assert_eq!(model.call(b2, &[])?, Value::Int(30));
//! # Ok::<(), cellspace::Error>(())
//! ```
//!
//! Cells can also take parameters, in which case every argument tuple is cached separately:
//!
//! ```
//! # use cellspace::{Formula, Model, Owner, Value};
//! # let mut model = Model::new("Math")?;
//! # let space = model.new_space(Owner::Model, "Space1")?;
//! // Not exponential time since each sub-result is cached!
//! let fibonacci = model.new_cell(space, "fibonacci", Formula::new(["x"], |scope| {
//!     let x = scope.arg("x")?.as_int()?;
//!     if x <= 1 {
//!         return Ok(Value::Int(x));
//!     }
//!     let a = scope.call("fibonacci", &[Value::Int(x - 1)])?.as_int()?;
//!     let b = scope.call("fibonacci", &[Value::Int(x - 2)])?.as_int()?;
//!     Ok(Value::Int(a + b))
//! }))?;
//!
//! assert_eq!(model.call(fibonacci, &[Value::Int(50)])?, Value::Int(12586269025));
//! # Ok::<(), cellspace::Error>(())
//! ```
//!
//! Spaces can inherit cells from other spaces, see [`Model::add_base`], and a space with a
//! [`DerivingRule`] creates parameterized child spaces on demand, see [`Model::item`].
mod config;
mod error;
mod formula;
mod graph;
mod model;
mod node;
mod value;

pub use config::{DEFAULT_MAX_DEPTH, ModelConfig, default_max_depth, set_default_max_depth};
pub use error::{Error, Result};
pub use formula::{ChildSpec, DerivingRule, Formula};
pub use graph::DependencyGraph;
pub use model::{GraphSnapshot, InstanceKey, Model, NodeKey, SavedNode, Scope};
pub use node::{CellId, Member, Node, Owner, RefId, SpaceId};
pub use value::{Args, Value, args};
