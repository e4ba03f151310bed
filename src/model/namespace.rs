//! Name resolution.
//!
//! A space sees, in order: its own members, whatever its bases provide (first
//! listed base first, each base contributing its own members and then its
//! own bases), the own members of each ancestor from the parent outwards,
//! and finally the model's top-level spaces and global references.
//!
//! The composed chain is cached per space and tagged with the model's
//! generation. Structural edits only bump the generation, so a burst of
//! edits costs nothing until the next lookup.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{CellData, Model, SpaceData};
use crate::{CellId, Error, Member, Owner, RefId, Result, SpaceId};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Binding {
    Cell(CellId),
    /// A cell defined somewhere along the base chain. Resolving it yields the
    /// derived cell of the resolving space, never the base's own cell.
    Inherited(CellId),
    Ref(RefId),
    Space(SpaceId),
}

#[derive(Debug, Default)]
pub(crate) struct Namespace {
    /// Own members followed by inherited ones.
    attrs: HashMap<String, Binding>,
    /// Ancestors' own members followed by the model's.
    outer: HashMap<String, Binding>,
}

impl Namespace {
    pub(crate) fn get(&self, name: &str) -> Option<Binding> {
        self.attr(name).or_else(|| self.outer.get(name).copied())
    }

    pub(crate) fn attr(&self, name: &str) -> Option<Binding> {
        self.attrs.get(name).copied()
    }

    pub(crate) fn attrs(&self) -> impl Iterator<Item = (&str, Binding)> + '_ {
        self.attrs.iter().map(|(name, binding)| (name.as_str(), *binding))
    }
}

fn own_bindings(data: &SpaceData) -> impl Iterator<Item = (&String, Binding)> {
    let cells = data.cells.iter().map(|(name, cell)| (name, Binding::Cell(*cell)));
    let refs = data.refs.iter().map(|(name, r)| (name, Binding::Ref(*r)));
    let spaces = data.children.iter().map(|(name, space)| (name, Binding::Space(*space)));
    cells.chain(refs).chain(spaces)
}

pub(crate) fn member_kind(member: Member) -> &'static str {
    match member {
        Member::Cell(_) => "cell",
        Member::Ref(_) => "reference",
        Member::Space(_) => "space",
    }
}

impl Model {
    pub(crate) fn namespace(&mut self, space: SpaceId) -> Result<Arc<Namespace>> {
        let data = self.space(space)?;
        if let Some((generation, namespace)) = &data.namespace {
            if *generation == self.generation {
                return Ok(namespace.clone());
            }
        }

        let mut attrs: HashMap<String, Binding> = own_bindings(data)
            .map(|(name, binding)| (name.clone(), binding))
            .collect();
        let bases = data.bases.clone();

        let mut outer = HashMap::new();
        let mut ancestor = data.parent;
        while let Some(id) = ancestor {
            let data = self.space(id)?;
            for (name, binding) in own_bindings(data) {
                outer.entry(name.clone()).or_insert(binding);
            }
            ancestor = data.parent;
        }
        for (name, space) in &self.top {
            outer.entry(name.clone()).or_insert(Binding::Space(*space));
        }
        for (name, reference) in &self.globals {
            outer.entry(name.clone()).or_insert(Binding::Ref(*reference));
        }

        for base in bases {
            let inherited = self.namespace(base)?;
            for (name, binding) in &inherited.attrs {
                let binding = match *binding {
                    Binding::Cell(cell) => Binding::Inherited(cell),
                    other => other,
                };
                attrs.entry(name.clone()).or_insert(binding);
            }
        }

        let namespace = Arc::new(Namespace { attrs, outer });
        let generation = self.generation;
        self.space_mut(space)?.namespace = Some((generation, namespace.clone()));
        Ok(namespace)
    }

    pub(crate) fn lookup(&mut self, space: SpaceId, name: &str) -> Result<Option<Binding>> {
        Ok(self.namespace(space)?.get(name))
    }

    fn materialize(&mut self, space: SpaceId, name: &str, binding: Binding) -> Result<Member> {
        Ok(match binding {
            Binding::Cell(cell) => Member::Cell(cell),
            Binding::Ref(reference) => Member::Ref(reference),
            Binding::Space(space) => Member::Space(space),
            Binding::Inherited(_) => Member::Cell(self.derived_cell(space, name)?),
        })
    }

    /// The cell `space` owns for an inherited `name`, created on first use.
    /// Its formula is looked up through the base chain whenever it runs.
    fn derived_cell(&mut self, space: SpaceId, name: &str) -> Result<CellId> {
        if let Some(cell) = self.space(space)?.derived.get(name) {
            return Ok(*cell);
        }

        let cell = self.push_cell(CellData {
            name: name.to_string(),
            space,
            formula: None,
            memo: HashMap::new(),
        });
        self.space_mut(space)?.derived.insert(name.to_string(), cell);
        tracing::trace!(space = %self.describe_owner(Owner::Space(space)), name, "derived cell");
        Ok(cell)
    }

    /// Resolve a free symbol the way a formula of `space` would.
    pub fn resolve(&mut self, space: SpaceId, symbol: &str) -> Result<Member> {
        match self.lookup(space, symbol)? {
            Some(binding) => self.materialize(space, symbol, binding),
            None => Err(Error::NameResolution {
                name: symbol.to_string(),
                scope: self.describe_owner(Owner::Space(space)),
            }),
        }
    }

    /// Resolve `name` as an attribute of `space`: own and inherited members only.
    pub(crate) fn resolve_attr(&mut self, space: SpaceId, name: &str) -> Result<Member> {
        match self.namespace(space)?.attr(name) {
            Some(binding) => self.materialize(space, name, binding),
            None => Err(Error::NameResolution {
                name: name.to_string(),
                scope: self.describe_owner(Owner::Space(space)),
            }),
        }
    }

    /// Resolve a dotted path from inside `space`. The first segment is a free
    /// symbol, every following one an attribute of the space before it.
    pub(crate) fn resolve_path(&mut self, space: SpaceId, path: &str) -> Result<Member> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let member = self.resolve(space, first)?;
        self.resolve_segments(member, segments, false)
    }

    /// Resolve a dotted path of attributes starting at `space`.
    pub(crate) fn resolve_attr_path(&mut self, space: SpaceId, path: &str) -> Result<Member> {
        self.resolve_segments(Member::Space(space), path.split('.'), false)
    }

    /// Find a member by its dotted name relative to the model, e.g.
    /// `Outer.Inner.x`. Dynamic instances are found by their derived names.
    pub fn get_object(&mut self, path: &str) -> Result<Member> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let member = self.get(Owner::Model, first)?;
        self.resolve_segments(member, segments, true)
    }

    fn resolve_segments<'p>(
        &mut self,
        mut member: Member,
        segments: impl Iterator<Item = &'p str>,
        include_instances: bool,
    ) -> Result<Member> {
        for segment in segments {
            let Member::Space(space) = member else {
                return Err(Error::Type {
                    expected: "space",
                    found: member_kind(member),
                });
            };

            member = match self.resolve_attr(space, segment) {
                Err(Error::NameResolution { .. }) if include_instances => {
                    self.instance_named(space, segment)?
                }
                other => other?,
            };
        }
        Ok(member)
    }

    pub(crate) fn instance_named(&self, space: SpaceId, name: &str) -> Result<Member> {
        for instance in self.space(space)?.instances.values() {
            if self.space(*instance)?.name == name {
                return Ok(Member::Space(*instance));
            }
        }
        Err(Error::NameResolution {
            name: name.to_string(),
            scope: self.describe_owner(Owner::Space(space)),
        })
    }

    /// The declared free symbols of `cell`'s formula which do not currently
    /// resolve from its space. Parameters count as resolved.
    pub fn unresolved_symbols(&mut self, cell: CellId) -> Result<Vec<String>> {
        let formula = self.effective_formula(cell)?;
        let space = self.cell(cell)?.space;

        let mut missing = Vec::new();
        for symbol in formula.symbols() {
            let first = symbol.split('.').next().unwrap_or_default();
            if formula.params().iter().any(|param| param == first) {
                continue;
            }
            if self.resolve_path(space, symbol).is_err() {
                missing.push(symbol.clone());
            }
        }
        Ok(missing)
    }

    // ----------------------------------------------------------------------
    // Structure queries

    /// Every space `space` inherits from, directly or transitively.
    pub(crate) fn base_closure(&self, space: SpaceId) -> Result<HashSet<SpaceId>> {
        let mut closure = HashSet::new();
        let mut pending = self.space(space)?.bases.clone();
        while let Some(base) = pending.pop() {
            if closure.insert(base) {
                pending.extend(self.space(base)?.bases.iter().copied());
            }
        }
        Ok(closure)
    }

    /// Every other space inheriting from `space`, directly or transitively.
    pub(crate) fn inheritors(&self, space: SpaceId) -> Result<Vec<SpaceId>> {
        let mut inheritors = Vec::new();
        for other in self.live_spaces() {
            if other != space && self.base_closure(other)?.contains(&space) {
                inheritors.push(other);
            }
        }
        Ok(inheritors)
    }

    /// `space` followed by all of its children and dynamic instances, recursively.
    pub(crate) fn subtree(&self, space: SpaceId) -> Result<Vec<SpaceId>> {
        let mut subtree = vec![space];
        let mut next = 0;
        while next < subtree.len() {
            let data = self.space(subtree[next])?;
            subtree.extend(data.children.values().copied());
            subtree.extend(data.instances.values().copied());
            next += 1;
        }
        Ok(subtree)
    }

    /// Spaces whose namespace includes the own members of `space`.
    pub(crate) fn affected_by(&self, space: SpaceId) -> Result<Vec<SpaceId>> {
        let mut affected = self.subtree(space)?;
        for inheritor in self.inheritors(space)? {
            if !affected.contains(&inheritor) {
                affected.push(inheritor);
            }
        }
        Ok(affected)
    }

    /// A space must never inherit from itself or from one of its descendants.
    pub(crate) fn check_inheritance(&self, space: SpaceId, base: SpaceId) -> Result<()> {
        let subtree: HashSet<SpaceId> = self.subtree(space)?.into_iter().collect();
        let mut chain = self.base_closure(base)?;
        chain.insert(base);

        if chain.iter().any(|ancestor| subtree.contains(ancestor)) {
            return Err(Error::InheritanceCycle {
                space: self.space_path(space)?,
                base: self.space_path(base)?,
            });
        }
        Ok(())
    }
}
