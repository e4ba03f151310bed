use std::sync::Arc;

use crate::value::{Args, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(u32);

macro_rules! arena_index {
    ($($id:ident),*) => {$(
        impl $id {
            pub(crate) fn new(index: usize) -> Self {
                Self(index as u32)
            }

            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }
    )*};
}

arena_index!(SpaceId, CellId, RefId);

/// Anything a name can be bound to inside a space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Member {
    Cell(CellId),
    Ref(RefId),
    Space(SpaceId),
}

/// Where a reference or a space is defined: directly on the model, or inside a space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    Model,
    Space(SpaceId),
}

impl From<SpaceId> for Owner {
    fn from(space: SpaceId) -> Self {
        Owner::Space(space)
    }
}

/// A vertex of the dependency graph and the unit of memoization.
///
/// Two cell nodes are equal when they name the same cell with equal argument
/// tuples, see [`Value`] for what "equal" means for arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Cell { cell: CellId, args: Args },
    Ref(RefId),
}

impl Node {
    pub fn cell<I>(cell: CellId, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Node::Cell {
            cell,
            args: crate::value::args(args),
        }
    }

    pub(crate) fn with_args(cell: CellId, args: Args) -> Self {
        Node::Cell { cell, args }
    }

    pub fn owner(&self) -> Member {
        match self {
            Node::Cell { cell, .. } => Member::Cell(*cell),
            Node::Ref(reference) => Member::Ref(*reference),
        }
    }

    pub fn args(&self) -> Option<&Args> {
        match self {
            Node::Cell { args, .. } => Some(args),
            Node::Ref(_) => None,
        }
    }
}

impl From<RefId> for Node {
    fn from(reference: RefId) -> Self {
        Node::Ref(reference)
    }
}

pub(crate) fn no_args() -> Args {
    Arc::from(Vec::new())
}
