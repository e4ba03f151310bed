use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::graph::DependencyGraph;
use crate::{
    Args, CellId, DerivingRule, Error, Formula, Member, Node, Owner, RefId, Result, SpaceId, Value,
};

mod eval;
mod invalidate;
mod namespace;
mod scope;
mod serialize;
mod tests;

pub use scope::Scope;
pub use serialize::{GraphSnapshot, InstanceKey, NodeKey, SavedNode};

use eval::Frame;
use namespace::Namespace;

pub(crate) struct SpaceData {
    pub(crate) name: String,
    pub(crate) parent: Option<SpaceId>,
    pub(crate) cells: BTreeMap<String, CellId>,
    pub(crate) refs: BTreeMap<String, RefId>,
    pub(crate) children: BTreeMap<String, SpaceId>,
    pub(crate) bases: Vec<SpaceId>,
    pub(crate) rule: Option<DerivingRule>,
    /// Dynamic instances created by `rule`, by construction arguments.
    pub(crate) instances: HashMap<Args, SpaceId>,
    /// Set when this space is itself a dynamic instance.
    pub(crate) instance_args: Option<Args>,
    /// Cells materialized from the base chain, see `Model::derived_cell`.
    pub(crate) derived: HashMap<String, CellId>,
    pub(crate) namespace: Option<(u64, Arc<Namespace>)>,
}

impl SpaceData {
    fn new(name: String, parent: Option<SpaceId>) -> Self {
        Self {
            name,
            parent,
            cells: BTreeMap::new(),
            refs: BTreeMap::new(),
            children: BTreeMap::new(),
            bases: Vec::new(),
            rule: None,
            instances: HashMap::new(),
            instance_args: None,
            derived: HashMap::new(),
            namespace: None,
        }
    }

    fn own_member(&self, name: &str) -> Option<Member> {
        if let Some(cell) = self.cells.get(name) {
            Some(Member::Cell(*cell))
        } else if let Some(reference) = self.refs.get(name) {
            Some(Member::Ref(*reference))
        } else {
            self.children.get(name).map(|space| Member::Space(*space))
        }
    }
}

pub(crate) struct CellData {
    pub(crate) name: String,
    pub(crate) space: SpaceId,
    /// `None` for derived cells, whose formula is looked up through the base chain.
    pub(crate) formula: Option<Formula>,
    pub(crate) memo: HashMap<Args, Value>,
}

pub(crate) struct RefData {
    pub(crate) name: String,
    pub(crate) owner: Owner,
    pub(crate) value: Value,
}

/// The root container of a session.
///
/// A model owns a forest of spaces, a set of global references and the single
/// dependency graph every evaluation in it records into. Dropping the model
/// releases all of it.
///
/// All state, including the explicit evaluation stack, is mutated through
/// `&mut self`. A host needing access from several threads should wrap the
/// whole model in one `Mutex`.
pub struct Model {
    name: String,
    config: ModelConfig,
    spaces: Vec<Option<SpaceData>>,
    cells: Vec<Option<CellData>>,
    refs: Vec<Option<RefData>>,
    top: BTreeMap<String, SpaceId>,
    globals: BTreeMap<String, RefId>,
    graph: DependencyGraph,
    stack: Vec<Frame>,
    /// Bumped on every structural change. Cached namespaces built under an
    /// older generation are rebuilt on their next use.
    generation: u64,
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

impl Model {
    pub fn new(name: &str) -> Result<Self> {
        Self::with_config(name, ModelConfig::default())
    }

    pub fn with_config(name: &str, config: ModelConfig) -> Result<Self> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            config,
            spaces: Vec::new(),
            cells: Vec::new(),
            refs: Vec::new(),
            top: BTreeMap::new(),
            globals: BTreeMap::new(),
            graph: DependencyGraph::new(),
            stack: Vec::new(),
            generation: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The maximum evaluation depth in effect for this model.
    pub fn max_depth(&self) -> usize {
        self.config.max_depth()
    }

    /// Override the process-wide maximum depth for this model, or go back to
    /// following it with `None`.
    pub fn set_max_depth(&mut self, depth: Option<usize>) {
        self.config.max_depth = depth;
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// What `node` read during its last successful evaluation, in first-read order.
    pub fn precedents(&self, node: &Node) -> Vec<Node> {
        self.graph.precedents(node)
    }

    pub fn dependents(&self, node: &Node) -> HashSet<Node> {
        self.graph.dependents(node)
    }

    // ----------------------------------------------------------------------
    // Arena access

    pub(crate) fn space(&self, id: SpaceId) -> Result<&SpaceData> {
        self.spaces
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::Deleted(format!("space #{}", id.index())))
    }

    pub(crate) fn space_mut(&mut self, id: SpaceId) -> Result<&mut SpaceData> {
        self.spaces
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::Deleted(format!("space #{}", id.index())))
    }

    pub(crate) fn cell(&self, id: CellId) -> Result<&CellData> {
        self.cells
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::Deleted(format!("cell #{}", id.index())))
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> Result<&mut CellData> {
        self.cells
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::Deleted(format!("cell #{}", id.index())))
    }

    pub(crate) fn reference(&self, id: RefId) -> Result<&RefData> {
        self.refs
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::Deleted(format!("reference #{}", id.index())))
    }

    fn reference_mut(&mut self, id: RefId) -> Result<&mut RefData> {
        self.refs
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::Deleted(format!("reference #{}", id.index())))
    }

    pub(crate) fn live_spaces(&self) -> impl Iterator<Item = SpaceId> + '_ {
        self.spaces
            .iter()
            .enumerate()
            .filter(|(_, space)| space.is_some())
            .map(|(index, _)| SpaceId::new(index))
    }

    fn push_cell(&mut self, data: CellData) -> CellId {
        self.cells.push(Some(data));
        CellId::new(self.cells.len() - 1)
    }

    fn push_ref(&mut self, data: RefData) -> RefId {
        self.refs.push(Some(data));
        RefId::new(self.refs.len() - 1)
    }

    fn push_space(&mut self, data: SpaceData) -> SpaceId {
        self.spaces.push(Some(data));
        SpaceId::new(self.spaces.len() - 1)
    }

    /// Invalidate every cached namespace.
    fn touch(&mut self) {
        self.generation += 1;
    }

    // ----------------------------------------------------------------------
    // Names

    fn own_member(&self, owner: Owner, name: &str) -> Result<Option<Member>> {
        Ok(match owner {
            Owner::Model => match self.top.get(name) {
                Some(space) => Some(Member::Space(*space)),
                None => self.globals.get(name).map(|r| Member::Ref(*r)),
            },
            Owner::Space(space) => self.space(space)?.own_member(name),
        })
    }

    /// Whether `name` is an own member of `owner` or, for an archetype, the
    /// name of one of its dynamic instances.
    fn name_taken(&self, owner: Owner, name: &str) -> Result<bool> {
        if self.own_member(owner, name)?.is_some() {
            return Ok(true);
        }
        Ok(match owner {
            Owner::Model => false,
            Owner::Space(space) => self.instance_named(space, name).is_ok(),
        })
    }

    fn ensure_unused(&self, owner: Owner, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.name_taken(owner, name)? {
            return Err(Error::DuplicateName {
                name: name.to_string(),
                scope: self.describe_owner(owner),
            });
        }
        Ok(())
    }

    /// The dotted name of `space` relative to the model, e.g. `Outer.Inner`.
    pub fn space_path(&self, space: SpaceId) -> Result<String> {
        let mut names = Vec::new();
        let mut current = Some(space);
        while let Some(id) = current {
            let data = self.space(id)?;
            names.push(data.name.as_str());
            current = data.parent;
        }
        names.reverse();
        Ok(names.join("."))
    }

    /// The dotted name of a member relative to the model. Global references
    /// are just their name.
    pub fn qualified_name(&self, member: Member) -> Result<String> {
        match member {
            Member::Space(space) => self.space_path(space),
            Member::Cell(cell) => {
                let data = self.cell(cell)?;
                Ok(format!("{}.{}", self.space_path(data.space)?, data.name))
            }
            Member::Ref(reference) => {
                let data = self.reference(reference)?;
                match data.owner {
                    Owner::Model => Ok(data.name.clone()),
                    Owner::Space(space) => Ok(format!("{}.{}", self.space_path(space)?, data.name)),
                }
            }
        }
    }

    /// A human readable rendering of a node, e.g. `Space1.foo(3)` or `Space1.x`.
    pub fn describe(&self, node: &Node) -> String {
        let name = self
            .qualified_name(node.owner())
            .unwrap_or_else(|_| "<deleted>".to_string());

        match node {
            Node::Ref(_) => name,
            Node::Cell { args, .. } => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                format!("{name}({})", args.join(", "))
            }
        }
    }

    pub(crate) fn describe_owner(&self, owner: Owner) -> String {
        match owner {
            Owner::Model => format!("model '{}'", self.name),
            Owner::Space(space) => match self.space_path(space) {
                Ok(path) => format!("space '{path}'"),
                Err(_) => "a deleted space".to_string(),
            },
        }
    }

    // ----------------------------------------------------------------------
    // Introspection

    /// Top-level spaces by name.
    pub fn spaces(&self) -> impl Iterator<Item = (&str, SpaceId)> {
        self.top.iter().map(|(name, space)| (name.as_str(), *space))
    }

    pub fn space_name(&self, space: SpaceId) -> Result<&str> {
        Ok(&self.space(space)?.name)
    }

    pub fn parent(&self, space: SpaceId) -> Result<Option<SpaceId>> {
        Ok(self.space(space)?.parent)
    }

    pub fn bases(&self, space: SpaceId) -> Result<&[SpaceId]> {
        Ok(&self.space(space)?.bases)
    }

    /// The construction arguments of a dynamic instance, `None` for any other space.
    pub fn instance_args(&self, space: SpaceId) -> Result<Option<&[Value]>> {
        Ok(self.space(space)?.instance_args.as_deref())
    }

    /// Members defined directly on `owner`, sorted by name. Inherited and
    /// derived members are not included.
    pub fn members(&self, owner: impl Into<Owner>) -> Result<Vec<(String, Member)>> {
        let mut members: Vec<(String, Member)> = match owner.into() {
            Owner::Model => {
                let spaces = self.top.iter().map(|(n, s)| (n.clone(), Member::Space(*s)));
                let refs = self.globals.iter().map(|(n, r)| (n.clone(), Member::Ref(*r)));
                spaces.chain(refs).collect()
            }
            Owner::Space(space) => {
                let data = self.space(space)?;
                let cells = data.cells.iter().map(|(n, c)| (n.clone(), Member::Cell(*c)));
                let refs = data.refs.iter().map(|(n, r)| (n.clone(), Member::Ref(*r)));
                let spaces = data.children.iter().map(|(n, s)| (n.clone(), Member::Space(*s)));
                cells.chain(refs).chain(spaces).collect()
            }
        };
        members.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(members)
    }

    pub fn cell_name(&self, cell: CellId) -> Result<&str> {
        Ok(&self.cell(cell)?.name)
    }

    pub fn cell_space(&self, cell: CellId) -> Result<SpaceId> {
        Ok(self.cell(cell)?.space)
    }

    /// True for cells materialized from a base space which have not been redefined.
    pub fn is_derived(&self, cell: CellId) -> Result<bool> {
        Ok(self.cell(cell)?.formula.is_none())
    }

    pub fn cached_value(&self, cell: CellId, args: &[Value]) -> Option<&Value> {
        self.cell(cell).ok()?.memo.get(args)
    }

    pub fn is_cached(&self, cell: CellId, args: &[Value]) -> bool {
        self.cached_value(cell, args).is_some()
    }

    pub fn ref_value(&self, reference: RefId) -> Result<&Value> {
        Ok(&self.reference(reference)?.value)
    }

    // ----------------------------------------------------------------------
    // Spaces

    pub fn new_space(&mut self, owner: impl Into<Owner>, name: &str) -> Result<SpaceId> {
        let owner = owner.into();
        self.ensure_unused(owner, name)?;
        self.invalidate_name(owner, name)?;

        let parent = match owner {
            Owner::Model => None,
            Owner::Space(space) => Some(space),
        };
        let space = self.push_space(SpaceData::new(name.to_string(), parent));
        match owner {
            Owner::Model => {
                self.top.insert(name.to_string(), space);
            }
            Owner::Space(parent) => {
                self.space_mut(parent)?.children.insert(name.to_string(), space);
            }
        }

        self.touch();
        tracing::debug!(space = %self.describe_owner(Owner::Space(space)), "created space");
        Ok(space)
    }

    /// Create a space named `Space1`, `Space2`, ..., whichever is free first.
    pub fn new_anonymous_space(&mut self, owner: impl Into<Owner>) -> Result<SpaceId> {
        let owner = owner.into();
        let mut n = 1;
        loop {
            let name = format!("Space{n}");
            if !self.name_taken(owner, &name)? {
                return self.new_space(owner, &name);
            }
            n += 1;
        }
    }

    /// Append `base` to the inheritance list of `space`. Adding a base that is
    /// already listed does nothing.
    pub fn add_base(&mut self, space: SpaceId, base: SpaceId) -> Result<()> {
        self.check_inheritance(space, base)?;
        if self.space(space)?.bases.contains(&base) {
            return Ok(());
        }

        self.clear_inheritance_chain(space)?;
        self.space_mut(space)?.bases.push(base);
        self.touch();
        Ok(())
    }

    pub fn remove_base(&mut self, space: SpaceId, base: SpaceId) -> Result<()> {
        if !self.space(space)?.bases.contains(&base) {
            return Err(Error::NameResolution {
                name: self.space_path(base)?,
                scope: format!("the bases of {}", self.describe_owner(Owner::Space(space))),
            });
        }

        self.clear_inheritance_chain(space)?;
        self.space_mut(space)?.bases.retain(|b| *b != base);
        self.touch();
        Ok(())
    }

    /// Install, replace or remove the deriving rule of `space`. Any dynamic
    /// instances created by a previous rule are deleted.
    pub fn set_rule(&mut self, space: SpaceId, rule: Option<DerivingRule>) -> Result<()> {
        let instances: Vec<SpaceId> = self.space(space)?.instances.values().copied().collect();
        for instance in &instances {
            self.check_deletable(*instance)?;
        }
        for instance in instances {
            self.delete_space_tree(instance)?;
        }

        let data = self.space_mut(space)?;
        data.instances.clear();
        data.rule = rule;
        self.touch();
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Cells

    /// Define a cell in `space`. Redefining an existing cell of `space` keeps
    /// its identity and behaves like [`Model::set_formula`]; defining a name
    /// that `space` inherits overrides the inherited definition.
    pub fn new_cell(&mut self, space: SpaceId, name: &str, formula: Formula) -> Result<CellId> {
        if let Some(&cell) = self.space(space)?.cells.get(name) {
            self.set_formula(cell, formula)?;
            return Ok(cell);
        }

        let owner = Owner::Space(space);
        self.ensure_unused(owner, name)?;
        self.invalidate_name(owner, name)?;

        let cell = self.push_cell(CellData {
            name: name.to_string(),
            space,
            formula: Some(formula),
            memo: HashMap::new(),
        });
        self.space_mut(space)?.cells.insert(name.to_string(), cell);
        self.touch();
        Ok(cell)
    }

    /// Replace the formula of `cell`, discarding every value it memoized and
    /// everything computed from them. Redefining a derived cell makes it an
    /// own cell of its space.
    pub fn set_formula(&mut self, cell: CellId, formula: Formula) -> Result<()> {
        let data = self.cell(cell)?;
        let (space, name, was_derived) = (data.space, data.name.clone(), data.formula.is_none());

        if was_derived {
            self.invalidate_name_keeping(Owner::Space(space), &name, Some(cell))?;
        } else {
            self.clear_by_owner(Member::Cell(cell))?;
            self.clear_inherited_copies(space, &name)?;
        }

        self.cell_mut(cell)?.formula = Some(formula);
        if was_derived {
            let data = self.space_mut(space)?;
            data.derived.remove(&name);
            data.cells.insert(name, cell);
            self.touch();
        }

        tracing::debug!(cell = %self.qualified_name(Member::Cell(cell))?, "formula replaced");
        Ok(())
    }

    /// Assign the value of `cell` for `args` directly, as an input. Anything
    /// computed from the previous value is cleared.
    pub fn set_value(&mut self, cell: CellId, args: &[Value], value: Value) -> Result<()> {
        let expected = self.effective_formula(cell)?.params().len();
        if expected != args.len() {
            return Err(Error::ArgumentCount {
                callee: self.qualified_name(Member::Cell(cell))?,
                expected,
                found: args.len(),
            });
        }

        let args: Args = args.into();
        let node = Node::with_args(cell, args.clone());
        self.clear_descendants(&node, true);

        self.cell_mut(cell)?.memo.insert(args, value);
        self.graph.insert(node);
        Ok(())
    }

    /// Discard every memoized value of `cell` and everything computed from them.
    pub fn clear_cell(&mut self, cell: CellId) -> Result<()> {
        self.clear_by_owner(Member::Cell(cell))?;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // References

    /// Bind `name` to `value` on `owner`. Replacing the value of an existing
    /// reference keeps its identity and clears everything computed from it.
    pub fn set_ref(&mut self, owner: impl Into<Owner>, name: &str, value: impl Into<Value>) -> Result<RefId> {
        let owner = owner.into();
        let value = value.into();

        if let Some(Member::Ref(reference)) = self.own_member(owner, name)? {
            self.clear_by_owner(Member::Ref(reference))?;
            self.reference_mut(reference)?.value = value;
            tracing::debug!(reference = %self.describe(&Node::Ref(reference)), "reference updated");
            return Ok(reference);
        }

        self.ensure_unused(owner, name)?;
        self.invalidate_name(owner, name)?;

        let reference = self.push_ref(RefData {
            name: name.to_string(),
            owner,
            value,
        });
        match owner {
            Owner::Model => {
                self.globals.insert(name.to_string(), reference);
            }
            Owner::Space(space) => {
                self.space_mut(space)?.refs.insert(name.to_string(), reference);
            }
        }
        self.touch();
        Ok(reference)
    }

    // ----------------------------------------------------------------------
    // Attribute protocol

    /// Look `name` up from `owner`: for a space this is full namespace
    /// resolution, for the model only its own members are visible.
    pub fn get(&mut self, owner: impl Into<Owner>, name: &str) -> Result<Member> {
        match owner.into() {
            Owner::Space(space) => self.resolve(space, name),
            Owner::Model => self.own_member(Owner::Model, name)?.ok_or_else(|| Error::NameResolution {
                name: name.to_string(),
                scope: self.describe_owner(Owner::Model),
            }),
        }
    }

    /// Delete the member `name` defined on `owner`. Everything computed from
    /// it, or from whatever the name resolved to in spaces that see it, is cleared.
    pub fn delete(&mut self, owner: impl Into<Owner>, name: &str) -> Result<()> {
        let owner = owner.into();
        let Some(member) = self.own_member(owner, name)? else {
            return Err(Error::NameResolution {
                name: name.to_string(),
                scope: self.describe_owner(owner),
            });
        };

        if let Member::Space(space) = member {
            self.check_deletable(space)?;
        }

        self.invalidate_name(owner, name)?;

        match member {
            Member::Cell(cell) => {
                self.clear_by_owner(member)?;
                if let Owner::Space(space) = owner {
                    self.space_mut(space)?.cells.remove(name);
                }
                self.cells[cell.index()] = None;
            }
            Member::Ref(reference) => {
                self.clear_by_owner(member)?;
                match owner {
                    Owner::Model => {
                        self.globals.remove(name);
                    }
                    Owner::Space(space) => {
                        self.space_mut(space)?.refs.remove(name);
                    }
                }
                self.refs[reference.index()] = None;
            }
            Member::Space(space) => {
                match owner {
                    Owner::Model => {
                        self.top.remove(name);
                    }
                    Owner::Space(parent) => {
                        self.space_mut(parent)?.children.remove(name);
                    }
                }
                self.delete_space_tree(space)?;
            }
        }

        self.touch();
        tracing::debug!(name, owner = %self.describe_owner(owner), "deleted");
        Ok(())
    }

    /// A space can go once nothing outside its own subtree inherits from it
    /// or from one of its descendants.
    fn check_deletable(&self, space: SpaceId) -> Result<()> {
        let subtree = self.subtree(space)?;
        for other in self.live_spaces() {
            if subtree.contains(&other) {
                continue;
            }
            for base in &self.space(other)?.bases {
                if subtree.contains(base) {
                    return Err(Error::SpaceInUse {
                        space: self.space_path(*base)?,
                        user: self.space_path(other)?,
                    });
                }
            }
        }
        Ok(())
    }

    /// Clear and free `space` and everything below it, including dynamic
    /// instances. The caller unlinks `space` from its parent.
    fn delete_space_tree(&mut self, space: SpaceId) -> Result<()> {
        for id in self.subtree(space)? {
            self.clear_space(id)?;

            let Some(data) = self.spaces[id.index()].take() else {
                continue;
            };
            for cell in data.cells.values().chain(data.derived.values()) {
                self.cells[cell.index()] = None;
            }
            for reference in data.refs.values() {
                self.refs[reference.index()] = None;
            }
        }
        self.touch();
        Ok(())
    }
}
