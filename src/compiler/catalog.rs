//! The universal catalog of transformation units.
//!
//! Every rule and composite that exists is stored exactly once, as a node of
//! an immutable arena tree. Named pipelines never copy this tree; they are
//! views selecting a subset of its nodes (see [`crate::compiler::Pipeline`]).
//!
//! Catalogs are assembled with the closure-based [`CatalogBuilder`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use pcodeflow::compiler::{CatalogBuilder, DeadCodeAction, IdentityRule};
//!
//! let catalog = CatalogBuilder::new().root_fixpoint("universal", "", |u| {
//!     u.sequence("mainloop", "", true, |s| {
//!         s.pool("oppool1", "", true, |p| {
//!             p.rule(Arc::new(IdentityRule));
//!         });
//!         s.action(Arc::new(DeadCodeAction));
//!     });
//! })?;
//! assert!(catalog.find("identity").is_some());
//! # Ok::<(), pcodeflow::Error>(())
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    compiler::pass::{Action, Rule},
    Error, Result,
};

/// Shape of one catalog node.
#[derive(Clone)]
pub enum UnitKind {
    /// Children run once each in order; with `repeat`, the whole list is
    /// re-run while it changes anything.
    Sequence {
        /// Child node indices, in execution order.
        children: Vec<usize>,
        /// Loop to a local fixpoint.
        repeat: bool,
    },
    /// A repeating sequence that also owns the per-function pass number.
    Fixpoint {
        /// Child node indices, in execution order.
        children: Vec<usize>,
        /// Round bound overriding [`crate::SchedulerConfig::max_restarts`].
        max_restarts: Option<usize>,
    },
    /// A bag of rules dispatched by opcode over every live operation.
    Pool {
        /// Rule node indices, in registration order.
        rules: Vec<usize>,
        /// Re-scan while a scan changes anything.
        repeat: bool,
    },
    /// A whole-function transformation.
    Action(Arc<dyn Action>),
    /// A local rewrite; only run through its enclosing pool.
    Rule(Arc<dyn Rule>),
}

impl UnitKind {
    /// Returns the children of a composite, or an empty slice for leaves.
    #[must_use]
    pub fn children(&self) -> &[usize] {
        match self {
            Self::Sequence { children, .. } | Self::Fixpoint { children, .. } => children,
            Self::Pool { rules, .. } => rules,
            Self::Action(_) | Self::Rule(_) => &[],
        }
    }

    /// Returns `true` for rules and actions.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Action(_) | Self::Rule(_))
    }

    fn children_mut(&mut self) -> Option<&mut Vec<usize>> {
        match self {
            Self::Sequence { children, .. } | Self::Fixpoint { children, .. } => Some(children),
            Self::Pool { rules, .. } => Some(rules),
            Self::Action(_) | Self::Rule(_) => None,
        }
    }
}

impl fmt::Debug for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence { children, repeat } => f
                .debug_struct("Sequence")
                .field("children", children)
                .field("repeat", repeat)
                .finish(),
            Self::Fixpoint {
                children,
                max_restarts,
            } => f
                .debug_struct("Fixpoint")
                .field("children", children)
                .field("max_restarts", max_restarts)
                .finish(),
            Self::Pool { rules, repeat } => f
                .debug_struct("Pool")
                .field("rules", rules)
                .field("repeat", repeat)
                .finish(),
            Self::Action(action) => write!(f, "Action({})", action.name()),
            Self::Rule(rule) => write!(f, "Rule({})", rule.name()),
        }
    }
}

/// One transformation unit of the catalog.
#[derive(Debug, Clone)]
pub struct UnitNode {
    name: String,
    group: String,
    kind: UnitKind,
    parent: Option<usize>,
}

impl UnitNode {
    /// Returns the unit's unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the group tag; empty for untagged composites.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns the node's shape.
    #[must_use]
    pub const fn kind(&self) -> &UnitKind {
        &self.kind
    }

    /// Returns the index of the enclosing composite.
    #[must_use]
    pub const fn parent(&self) -> Option<usize> {
        self.parent
    }
}

/// Immutable arena of transformation units rooted at one composite.
#[derive(Debug)]
pub struct Catalog {
    nodes: Vec<UnitNode>,
    by_name: HashMap<String, usize>,
    root: usize,
}

impl Catalog {
    /// Returns the root node index.
    #[must_use]
    pub const fn root(&self) -> usize {
        self.root
    }

    /// Returns the node at `index`.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&UnitNode> {
        self.nodes.get(index)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the catalog has no nodes. Built catalogs always have a root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks a unit up by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Iterates over `(index, node)` pairs in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &UnitNode)> {
        self.nodes.iter().enumerate()
    }

    /// Returns every distinct group tag used in the catalog, sorted.
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self
            .nodes
            .iter()
            .map(|n| n.group.as_str())
            .filter(|g| !g.is_empty())
            .collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
}

/// Builder for [`Catalog`]s.
///
/// Duplicate unit names are reported by the final `root_*` call.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    nodes: Vec<UnitNode>,
    by_name: HashMap<String, usize>,
    duplicate: Option<String>,
}

impl CatalogBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog whose root is a fixpoint driver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateUnit`] if two units share a name.
    pub fn root_fixpoint<F>(mut self, name: &str, group: &str, f: F) -> Result<Catalog>
    where
        F: FnOnce(&mut CompositeContext<'_>),
    {
        let root = self.push(
            name,
            group,
            UnitKind::Fixpoint {
                children: Vec::new(),
                max_restarts: None,
            },
            None,
        );
        f(&mut CompositeContext {
            builder: &mut self,
            index: root,
        });
        self.finish(root)
    }

    /// Builds a catalog whose root is a sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateUnit`] if two units share a name.
    pub fn root_sequence<F>(mut self, name: &str, group: &str, repeat: bool, f: F) -> Result<Catalog>
    where
        F: FnOnce(&mut CompositeContext<'_>),
    {
        let root = self.push(
            name,
            group,
            UnitKind::Sequence {
                children: Vec::new(),
                repeat,
            },
            None,
        );
        f(&mut CompositeContext {
            builder: &mut self,
            index: root,
        });
        self.finish(root)
    }

    fn finish(self, root: usize) -> Result<Catalog> {
        if let Some(name) = self.duplicate {
            return Err(Error::DuplicateUnit(name));
        }
        Ok(Catalog {
            nodes: self.nodes,
            by_name: self.by_name,
            root,
        })
    }

    fn push(&mut self, name: &str, group: &str, kind: UnitKind, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        if self.by_name.insert(name.to_string(), index).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(name.to_string());
        }
        self.nodes.push(UnitNode {
            name: name.to_string(),
            group: group.to_string(),
            kind,
            parent,
        });
        if let Some(children) = parent.and_then(|p| self.nodes[p].kind.children_mut()) {
            children.push(index);
        }
        index
    }
}

/// Context for adding children to a sequence or fixpoint under construction.
pub struct CompositeContext<'a> {
    builder: &'a mut CatalogBuilder,
    index: usize,
}

impl CompositeContext<'_> {
    /// Adds a nested sequence.
    pub fn sequence<F>(&mut self, name: &str, group: &str, repeat: bool, f: F) -> &mut Self
    where
        F: FnOnce(&mut CompositeContext<'_>),
    {
        let kind = UnitKind::Sequence {
            children: Vec::new(),
            repeat,
        };
        let index = self.builder.push(name, group, kind, Some(self.index));
        f(&mut CompositeContext {
            builder: self.builder,
            index,
        });
        self
    }

    /// Adds a nested fixpoint driver with its own round bound.
    pub fn fixpoint<F>(&mut self, name: &str, group: &str, max_restarts: usize, f: F) -> &mut Self
    where
        F: FnOnce(&mut CompositeContext<'_>),
    {
        let kind = UnitKind::Fixpoint {
            children: Vec::new(),
            max_restarts: Some(max_restarts),
        };
        let index = self.builder.push(name, group, kind, Some(self.index));
        f(&mut CompositeContext {
            builder: self.builder,
            index,
        });
        self
    }

    /// Adds a rule pool.
    pub fn pool<F>(&mut self, name: &str, group: &str, repeat: bool, f: F) -> &mut Self
    where
        F: FnOnce(&mut PoolContext<'_>),
    {
        let kind = UnitKind::Pool {
            rules: Vec::new(),
            repeat,
        };
        let index = self.builder.push(name, group, kind, Some(self.index));
        f(&mut PoolContext {
            builder: self.builder,
            index,
        });
        self
    }

    /// Adds an action under its own name and group.
    pub fn action(&mut self, action: Arc<dyn Action>) -> &mut Self {
        let (name, group) = (action.name(), action.group());
        self.builder
            .push(name, group, UnitKind::Action(action), Some(self.index));
        self
    }

    /// Adds an action under a different unit name, for actions that appear
    /// more than once in a catalog.
    pub fn action_as(&mut self, name: &str, action: Arc<dyn Action>) -> &mut Self {
        let group = action.group();
        self.builder
            .push(name, group, UnitKind::Action(action), Some(self.index));
        self
    }
}

/// Context for adding rules to a pool under construction.
pub struct PoolContext<'a> {
    builder: &'a mut CatalogBuilder,
    index: usize,
}

impl PoolContext<'_> {
    /// Registers a rule. Registration order is dispatch order.
    pub fn rule(&mut self, rule: Arc<dyn Rule>) -> &mut Self {
        let (name, group) = (rule.name(), rule.group());
        self.builder
            .push(name, group, UnitKind::Rule(rule), Some(self.index));
        self
    }
}
