use std::collections::HashSet;

use super::Model;
use super::namespace::Binding;
use crate::{CellId, Member, Node, Owner, RefId, Result, SpaceId};

impl Model {
    /// Remove every node computed from `node` from the graph and forget the
    /// memoized values behind them. `node` itself goes too if `include_source`
    /// is set. Returns the removed nodes.
    pub fn clear_descendants(&mut self, node: &Node, include_source: bool) -> HashSet<Node> {
        let removed = self.graph.clear_descendants(node, include_source);
        for cleared in &removed {
            if let Node::Cell { cell, args } = cleared {
                if let Some(Some(data)) = self.cells.get_mut(cell.index()) {
                    data.memo.remove(args);
                }
            }
        }

        if !removed.is_empty() {
            tracing::debug!(source = %self.describe(node), removed = removed.len(), "cleared descendants");
        }
        removed
    }

    /// Clear every node owned by `member` along with its descendants: all
    /// argument tuples of a cell, the node of a reference, or every cell and
    /// reference of a space.
    pub fn clear_by_owner(&mut self, member: Member) -> Result<HashSet<Node>> {
        match member {
            Member::Cell(cell) => {
                let keys: Vec<_> = self.cell(cell)?.memo.keys().cloned().collect();
                let mut removed = HashSet::new();
                for args in keys {
                    removed.extend(self.clear_descendants(&Node::with_args(cell, args), true));
                }
                Ok(removed)
            }
            Member::Ref(reference) => {
                self.reference(reference)?;
                Ok(self.clear_descendants(&Node::Ref(reference), true))
            }
            Member::Space(space) => self.clear_space(space),
        }
    }

    pub(crate) fn clear_space(&mut self, space: SpaceId) -> Result<HashSet<Node>> {
        let data = self.space(space)?;
        let cells: Vec<CellId> = data.cells.values().chain(data.derived.values()).copied().collect();
        let refs: Vec<RefId> = data.refs.values().copied().collect();

        let mut removed = HashSet::new();
        for cell in cells {
            removed.extend(self.clear_by_owner(Member::Cell(cell))?);
        }
        for reference in refs {
            removed.extend(self.clear_by_owner(Member::Ref(reference))?);
        }
        Ok(removed)
    }

    /// Clear `space` and every space below it, dynamic instances included.
    pub(crate) fn clear_subtree(&mut self, space: SpaceId) -> Result<()> {
        for id in self.subtree(space)? {
            self.clear_space(id)?;
        }
        Ok(())
    }

    /// Forget whatever `name` currently resolves to in every space which can
    /// see the own members of `owner`, ahead of `name` being bound or unbound there.
    pub(crate) fn invalidate_name(&mut self, owner: Owner, name: &str) -> Result<()> {
        self.invalidate_name_keeping(owner, name, None)
    }

    /// Like [`Model::invalidate_name`], but the derived cell `keep` is only
    /// cleared, not dropped.
    pub(crate) fn invalidate_name_keeping(
        &mut self,
        owner: Owner,
        name: &str,
        keep: Option<CellId>,
    ) -> Result<()> {
        let affected: Vec<SpaceId> = match owner {
            Owner::Model => self.live_spaces().collect(),
            Owner::Space(space) => self.affected_by(space)?,
        };

        for space in affected {
            match self.lookup(space, name)? {
                None => {}
                Some(Binding::Cell(cell)) => {
                    self.clear_by_owner(Member::Cell(cell))?;
                }
                Some(Binding::Ref(reference)) => {
                    self.clear_by_owner(Member::Ref(reference))?;
                }
                Some(Binding::Inherited(_)) => {
                    let Some(derived) = self.space(space)?.derived.get(name).copied() else {
                        continue;
                    };
                    self.clear_by_owner(Member::Cell(derived))?;
                    if Some(derived) != keep {
                        self.space_mut(space)?.derived.remove(name);
                        self.cells[derived.index()] = None;
                    }
                }
                // Anything in the space may have been reached through the old
                // space, and anything reached through the old space by this name.
                Some(Binding::Space(old)) => {
                    self.clear_space(space)?;
                    self.clear_subtree(old)?;
                }
            }
        }
        Ok(())
    }

    /// Clear the derived copies of `name` held by spaces inheriting from `space`.
    pub(crate) fn clear_inherited_copies(&mut self, space: SpaceId, name: &str) -> Result<()> {
        for inheritor in self.inheritors(space)? {
            if let Some(derived) = self.space(inheritor)?.derived.get(name).copied() {
                self.clear_by_owner(Member::Cell(derived))?;
            }
        }
        Ok(())
    }

    /// The bases of `space` are about to change: clear it and every space
    /// inheriting from it, drop their derived cells, and clear the inherited
    /// references and spaces their attributes currently resolve to.
    pub(crate) fn clear_inheritance_chain(&mut self, space: SpaceId) -> Result<()> {
        let mut affected = vec![space];
        affected.extend(self.inheritors(space)?);

        for id in affected {
            let namespace = self.namespace(id)?;
            let data = self.space(id)?;
            let inherited: Vec<Binding> = namespace
                .attrs()
                .filter(|(name, _)| data.own_member(name).is_none())
                .map(|(_, binding)| binding)
                .collect();
            for binding in inherited {
                match binding {
                    Binding::Ref(reference) => {
                        self.clear_by_owner(Member::Ref(reference))?;
                    }
                    Binding::Space(target) => self.clear_subtree(target)?,
                    Binding::Cell(_) | Binding::Inherited(_) => {}
                }
            }

            self.clear_space(id)?;
            let derived: Vec<CellId> = self.space_mut(id)?.derived.drain().map(|(_, cell)| cell).collect();
            for cell in derived {
                self.cells[cell.index()] = None;
            }
        }
        Ok(())
    }

    /// Panic unless the graph, the memo tables and the space structure agree
    /// with each other. Meant for tests.
    pub fn check_consistency(&self) {
        assert!(self.stack.is_empty(), "evaluation stack is not empty");

        for node in self.graph.nodes() {
            match node {
                Node::Cell { cell, args } => {
                    let data = self
                        .cell(*cell)
                        .unwrap_or_else(|_| panic!("graph node of a deleted cell: {node:?}"));
                    assert!(
                        data.memo.contains_key(args),
                        "graph node without a value: {}",
                        self.describe(node)
                    );
                }
                Node::Ref(reference) => {
                    assert!(
                        self.reference(*reference).is_ok(),
                        "graph node of a deleted reference: {node:?}"
                    );
                }
            }
        }

        for (index, data) in self.cells.iter().enumerate() {
            let Some(data) = data else { continue };
            for args in data.memo.keys() {
                let node = Node::with_args(CellId::new(index), args.clone());
                assert!(self.graph.contains(&node), "value without a graph node: {}", self.describe(&node));
            }
        }

        for (precedent, dependent) in self.graph.edges() {
            assert!(
                matches!(dependent, Node::Cell { .. }),
                "{} is recorded as depending on {}",
                self.describe(dependent),
                self.describe(precedent)
            );
        }

        for space in self.live_spaces() {
            let closure = self.base_closure(space).unwrap_or_default();
            assert!(!closure.contains(&space), "space #{} inherits from itself", space.index());
        }
    }
}
