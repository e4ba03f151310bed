use std::collections::HashSet;

use super::namespace::{Binding, member_kind};
use super::{Model, RefData, SpaceData, validate_name};
use crate::node::no_args;
use crate::{Args, CellId, Error, Formula, Member, Node, Owner, RefId, Result, Scope, SpaceId, Value};

/// One in-progress evaluation on the model's explicit call stack.
pub(crate) struct Frame {
    node: Node,
    precedents: Vec<Node>,
    seen: HashSet<Node>,
}

impl Frame {
    fn new(node: Node) -> Self {
        Self {
            node,
            precedents: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl Model {
    /// Evaluate `cell` for `args`, or return its memoized value.
    pub fn call(&mut self, cell: CellId, args: &[Value]) -> Result<Value> {
        self.discard_stale_frames();
        self.invoke(cell, args.into())
    }

    /// Host calls always start from an empty stack. Frames left over mean a
    /// formula panicked and the host caught the unwind.
    fn discard_stale_frames(&mut self) {
        if !self.stack.is_empty() {
            tracing::warn!(frames = self.stack.len(), "discarding frames of an interrupted evaluation");
            self.stack.clear();
        }
    }

    /// [`Model::call`] on the cell found at a dotted path, see [`Model::get_object`].
    pub fn call_path(&mut self, path: &str, args: &[Value]) -> Result<Value> {
        match self.get_object(path)? {
            Member::Cell(cell) => self.call(cell, args),
            other => Err(Error::Type {
                expected: "cell",
                found: member_kind(other),
            }),
        }
    }

    /// The value at a dotted path: a reference's value, or the result of a
    /// cell without parameters.
    pub fn value(&mut self, path: &str) -> Result<Value> {
        self.discard_stale_frames();
        let member = self.get_object(path)?;
        self.read_member(member)
    }

    pub(crate) fn read_member(&mut self, member: Member) -> Result<Value> {
        match member {
            Member::Ref(reference) => self.read_ref(reference),
            Member::Cell(cell) => self.invoke(cell, no_args()),
            Member::Space(_) => Err(Error::Type {
                expected: "value",
                found: "space",
            }),
        }
    }

    pub(crate) fn read_ref(&mut self, reference: RefId) -> Result<Value> {
        let value = self.reference(reference)?.value.clone();
        if !self.stack.is_empty() {
            let node = Node::Ref(reference);
            self.graph.insert(node.clone());
            self.record(node);
        }
        Ok(value)
    }

    /// Note `node` as a precedent of the evaluation currently on top of the stack.
    fn record(&mut self, node: Node) {
        if let Some(frame) = self.stack.last_mut() {
            if frame.seen.insert(node.clone()) {
                frame.precedents.push(node);
            }
        }
    }

    pub(crate) fn invoke(&mut self, cell: CellId, args: Args) -> Result<Value> {
        let node = Node::with_args(cell, args.clone());

        let cached = self.cell(cell)?.memo.get(&args).cloned();
        if let Some(value) = cached {
            tracing::trace!(node = %self.describe(&node), "cache hit");
            self.record(node);
            return Ok(value);
        }

        if let Some(position) = self.stack.iter().position(|frame| frame.node == node) {
            let mut cycle: Vec<String> = self.stack[position..]
                .iter()
                .map(|frame| self.describe(&frame.node))
                .collect();
            cycle.push(self.describe(&node));
            tracing::debug!(cycle = %cycle.join(" -> "), "circular reference");
            return Err(Error::CircularReference { cycle });
        }

        let max_depth = self.max_depth();
        if self.stack.len() > max_depth {
            let node = self.describe(&node);
            tracing::debug!(%node, max_depth, "maximum depth exceeded");
            return Err(Error::DeepReference { max_depth, node });
        }

        let formula = self.effective_formula(cell)?;
        if formula.params().len() != args.len() {
            return Err(Error::ArgumentCount {
                callee: self.qualified_name(Member::Cell(cell))?,
                expected: formula.params().len(),
                found: args.len(),
            });
        }
        let space = self.cell(cell)?.space;

        self.stack.push(Frame::new(node.clone()));
        tracing::trace!(node = %self.describe(&node), depth = self.stack.len(), "evaluating");

        let result = formula.evaluate(&mut Scope::new(self, space, formula.params(), &args[..]));
        let frame = self.stack.pop().expect("evaluation frame was pushed above");
        let value = result?;

        self.cell_mut(cell)?.memo.insert(args, value.clone());
        self.graph.set_precedents(&node, &frame.precedents);
        self.record(node);
        Ok(value)
    }

    /// The formula `cell` runs: its own, or for a derived cell whatever its
    /// space currently inherits under that name.
    pub(crate) fn effective_formula(&mut self, cell: CellId) -> Result<Formula> {
        let data = self.cell(cell)?;
        if let Some(formula) = &data.formula {
            return Ok(formula.clone());
        }

        let (space, name) = (data.space, data.name.clone());
        match self.namespace(space)?.attr(&name) {
            Some(Binding::Inherited(source)) => self
                .cell(source)?
                .formula
                .clone()
                .ok_or_else(|| Error::Deleted(format!("the definition of '{name}'"))),
            _ => Err(Error::NameResolution {
                name,
                scope: format!("the bases of {}", self.describe_owner(Owner::Space(space))),
            }),
        }
    }

    // ----------------------------------------------------------------------
    // Dynamic instances

    /// The instance of the archetype `space` for `args`, created by its
    /// deriving rule on first request. Equal arguments always yield the same space.
    pub fn item(&mut self, space: SpaceId, args: &[Value]) -> Result<SpaceId> {
        self.discard_stale_frames();
        self.instance(space, args.into())
    }

    pub(crate) fn instance(&mut self, space: SpaceId, args: Args) -> Result<SpaceId> {
        let data = self.space(space)?;
        if let Some(instance) = data.instances.get(&args) {
            return Ok(*instance);
        }

        let Some(rule) = data.rule.clone() else {
            return Err(Error::NoDerivingRule {
                space: self.space_path(space)?,
            });
        };
        if rule.params().len() != args.len() {
            return Err(Error::ArgumentCount {
                callee: self.space_path(space)?,
                expected: rule.params().len(),
                found: args.len(),
            });
        }
        for param in rule.params() {
            validate_name(param)?;
        }

        let spec = rule.derive(&mut Scope::new(self, space, rule.params(), &args[..]))?;
        validate_name(&spec.name)?;
        for base in &spec.bases {
            self.space(*base)?;
        }

        let archetype = self.space(space)?;
        let mut taken = archetype.own_member(&spec.name).is_some();
        for other in archetype.instances.values() {
            taken |= self.space(*other)?.name == spec.name;
        }
        if taken {
            return Err(Error::DuplicateName {
                name: spec.name,
                scope: self.describe_owner(Owner::Space(space)),
            });
        }

        let mut data = SpaceData::new(spec.name, Some(space));
        data.instance_args = Some(args.clone());
        for base in spec.bases {
            if !data.bases.contains(&base) {
                data.bases.push(base);
            }
        }
        let instance = self.push_space(data);

        for (param, value) in rule.params().iter().zip(args.iter()) {
            let reference = self.push_ref(RefData {
                name: param.clone(),
                owner: Owner::Space(instance),
                value: value.clone(),
            });
            self.space_mut(instance)?.refs.insert(param.clone(), reference);
        }
        self.space_mut(space)?.instances.insert(args, instance);

        tracing::debug!(instance = %self.describe_owner(Owner::Space(instance)), "created dynamic instance");
        Ok(instance)
    }
}
