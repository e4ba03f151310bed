use super::Model;
use super::namespace::member_kind;
use crate::{Error, Member, Owner, Result, SpaceId, Value};

/// What a formula body sees while it runs.
///
/// Every name a formula reads goes through its scope, which is how the model
/// learns what the formula depends on. Parameters shadow everything else.
pub struct Scope<'m> {
    model: &'m mut Model,
    space: SpaceId,
    params: &'m [String],
    args: &'m [Value],
}

impl<'m> Scope<'m> {
    pub(crate) fn new(model: &'m mut Model, space: SpaceId, params: &'m [String], args: &'m [Value]) -> Self {
        Self {
            model,
            space,
            params,
            args,
        }
    }

    /// The space the running formula belongs to. For a deriving rule this is
    /// the archetype.
    pub fn this(&self) -> SpaceId {
        self.space
    }

    pub fn model(&self) -> &Model {
        &*self.model
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn arg(&self, name: &str) -> Result<&Value> {
        self.param(name).ok_or_else(|| Error::NameResolution {
            name: name.to_string(),
            scope: format!("the parameters of {}", self.model.describe_owner(Owner::Space(self.space))),
        })
    }

    fn param(&self, name: &str) -> Option<&Value> {
        let position = self.params.iter().position(|param| param == name)?;
        self.args.get(position)
    }

    /// Read a name or dotted path: a parameter, a reference, or a cell
    /// without parameters.
    pub fn get(&mut self, path: &str) -> Result<Value> {
        if let Some(value) = self.param(path) {
            return Ok(value.clone());
        }
        let member = self.model.resolve_path(self.space, path)?;
        self.model.read_member(member)
    }

    /// Call the cell found at `path` with `args`.
    pub fn call(&mut self, path: &str, args: &[Value]) -> Result<Value> {
        let member = self.model.resolve_path(self.space, path)?;
        self.invoke(member, args)
    }

    /// The space found at `path`.
    pub fn space(&mut self, path: &str) -> Result<SpaceId> {
        match self.model.resolve_path(self.space, path)? {
            Member::Space(space) => Ok(space),
            other => Err(Error::Type {
                expected: "space",
                found: member_kind(other),
            }),
        }
    }

    /// The dynamic instance of the archetype at `path` for `args`.
    pub fn item(&mut self, path: &str, args: &[Value]) -> Result<SpaceId> {
        let archetype = self.space(path)?;
        self.model.instance(archetype, args.into())
    }

    /// Read an attribute path of another space, e.g. one returned by [`Scope::item`].
    pub fn get_in(&mut self, space: SpaceId, path: &str) -> Result<Value> {
        let member = self.model.resolve_attr_path(space, path)?;
        self.model.read_member(member)
    }

    /// Call a cell found through the attributes of another space.
    pub fn call_in(&mut self, space: SpaceId, path: &str, args: &[Value]) -> Result<Value> {
        let member = self.model.resolve_attr_path(space, path)?;
        self.invoke(member, args)
    }

    fn invoke(&mut self, member: Member, args: &[Value]) -> Result<Value> {
        match member {
            Member::Cell(cell) => self.model.invoke(cell, args.into()),
            other => Err(Error::Type {
                expected: "cell",
                found: member_kind(other),
            }),
        }
    }
}
