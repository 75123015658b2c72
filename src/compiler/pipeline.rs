//! Derived pipelines and unit scheduling.
//!
//! A [`Pipeline`] is a read-only view of the universal [`Catalog`]: a bit set
//! of included nodes plus, for every included rule pool, an opcode-indexed
//! dispatch table. Deriving never copies units, so any number of pipelines
//! share one catalog and a pipeline can run on many functions at once.
//!
//! # Scheduling
//!
//! | Unit       | Behaviour                                                        |
//! |------------|------------------------------------------------------------------|
//! | Sequence   | each included child once, in order; `repeat` loops while changed |
//! | Rule pool  | one scan over live operations, first matching rule wins          |
//! | Fixpoint   | numbered rounds of its children while changed or restarting      |
//! | Action     | one call                                                         |
//!
//! Every repeating unit is bounded; exceeding the bound is
//! [`Error::IterationLimit`]. Cancellation is checked before each child.

use std::{collections::HashMap, fmt, sync::Arc};

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    analysis::{Function, OpCode, Space},
    compiler::{
        catalog::{Catalog, UnitKind},
        context::PassContext,
        events::EventKind,
        registry::GroupList,
    },
    utils::BitSet,
    Error, Result,
};

/// A named restriction of the universal catalog.
///
/// Pipelines compare equal when they view the same catalog through the same
/// set of included units, regardless of name. Identity (the same cached
/// derivation) is `Arc::ptr_eq` on the handles the registry returns.
pub struct Pipeline {
    name: String,
    catalog: Arc<Catalog>,
    included: BitSet,
    dispatch: HashMap<usize, Vec<Vec<usize>>>,
}

impl Pipeline {
    /// Derives the view of `catalog` selected by `tags`.
    ///
    /// Leaves survive if their tag is listed. Composites survive if at least
    /// one child survives and, when tagged, their own tag is listed. With a
    /// `base`, only units the base includes can survive.
    pub(crate) fn derive(
        name: &str,
        catalog: &Arc<Catalog>,
        tags: &GroupList,
        base: Option<&Pipeline>,
    ) -> Result<Self> {
        let mut included = BitSet::new(catalog.len());
        let allowed = |index: usize| base.map_or(true, |b| b.included.contains(index));
        if !select(catalog, catalog.root(), tags, &allowed, &mut included) {
            return Err(Error::EmptyPipeline(name.to_string()));
        }

        let mut dispatch = HashMap::new();
        for index in included.iter() {
            let Some(UnitKind::Pool { rules, .. }) = catalog.node(index).map(|n| n.kind()) else {
                continue;
            };
            let mut table = vec![Vec::new(); OpCode::COUNT];
            for &rule_index in rules.iter().filter(|&&r| included.contains(r)) {
                let Some(UnitKind::Rule(rule)) = catalog.node(rule_index).map(|n| n.kind()) else {
                    continue;
                };
                if rule.opcodes().is_empty() {
                    for slot in &mut table {
                        slot.push(rule_index);
                    }
                } else {
                    for opcode in rule.opcodes() {
                        table[opcode.index()].push(rule_index);
                    }
                }
            }
            dispatch.insert(index, table);
        }

        Ok(Self {
            name: name.to_string(),
            catalog: Arc::clone(catalog),
            included,
            dispatch,
        })
    }

    /// Returns the name the pipeline was derived under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the name of the root unit.
    #[must_use]
    pub fn root_name(&self) -> &str {
        self.catalog
            .node(self.catalog.root())
            .map_or("", |n| n.name())
    }

    /// Returns the catalog this pipeline views.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the set of included catalog nodes.
    #[must_use]
    pub const fn included(&self) -> &BitSet {
        &self.included
    }

    /// Returns `true` if the unit called `name` is part of this pipeline.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.catalog
            .find(name)
            .is_some_and(|index| self.included.contains(index))
    }

    /// Returns the names of all included units in catalog order.
    #[must_use]
    pub fn unit_names(&self) -> Vec<&str> {
        self.included
            .iter()
            .filter_map(|index| self.catalog.node(index))
            .map(|n| n.name())
            .collect()
    }

    /// Returns the names of all included rules in catalog order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        self.included
            .iter()
            .filter_map(|index| self.catalog.node(index))
            .filter(|n| matches!(n.kind(), UnitKind::Rule(_)))
            .map(|n| n.name())
            .collect()
    }

    /// Returns the rules offered an operation with `opcode` by the pool
    /// called `pool`, in dispatch order.
    #[must_use]
    pub fn dispatch_order(&self, pool: &str, opcode: OpCode) -> Vec<&str> {
        self.catalog
            .find(pool)
            .and_then(|index| self.dispatch.get(&index))
            .map(|table| {
                table[opcode.index()]
                    .iter()
                    .filter_map(|&r| self.catalog.node(r))
                    .map(|n| n.name())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Runs the pipeline on `func` until its root reports no further change.
    ///
    /// Returns the total number of changes made.
    ///
    /// # Errors
    ///
    /// Any failure is returned as [`Error::FunctionFailed`], naming the
    /// function and the innermost unit that was running.
    pub fn apply(&self, func: &mut Function, ctx: &mut PassContext) -> Result<usize> {
        ctx.set_function(func.entry());
        ctx.clear_units();
        match self.run_unit(self.catalog.root(), func, ctx) {
            Ok(changes) => Ok(changes),
            Err(e) => {
                let unit = ctx
                    .current_unit()
                    .unwrap_or_else(|| self.root_name())
                    .to_string();
                ctx.events
                    .record(EventKind::Error)
                    .function(func.entry())
                    .unit(unit.clone())
                    .message(e.to_string());
                ctx.clear_units();
                Err(Error::FunctionFailed {
                    function: func.name().to_string(),
                    unit,
                    source: Box::new(e),
                })
            }
        }
    }

    fn run_unit(&self, index: usize, func: &mut Function, ctx: &mut PassContext) -> Result<usize> {
        let Some(node) = self.catalog.node(index) else {
            return Err(graph_error!("catalog has no unit {}", index));
        };
        let name = node.name();
        ctx.enter(name);

        let changes = match node.kind() {
            UnitKind::Sequence { children, repeat } => {
                self.run_sequence(name, children, *repeat, func, ctx)?
            }
            UnitKind::Fixpoint {
                children,
                max_restarts,
            } => {
                let limit = max_restarts.unwrap_or(ctx.config().max_restarts);
                self.run_fixpoint(name, children, limit, func, ctx)?
            }
            UnitKind::Pool { repeat, .. } => self.run_pool(index, name, *repeat, func, ctx)?,
            UnitKind::Action(action) => {
                ctx.record_test(name);
                let changes = action.apply(func, ctx)?;
                ctx.record_changes(name, changes);
                if ctx.config().check_consistency {
                    func.check_consistency()?;
                }
                changes
            }
            // rules only run through their pool's dispatch table
            UnitKind::Rule(_) => 0,
        };

        ctx.leave();
        Ok(changes)
    }

    fn run_children(
        &self,
        children: &[usize],
        func: &mut Function,
        ctx: &mut PassContext,
    ) -> Result<usize> {
        let mut changes = 0;
        for &child in children.iter().filter(|&&c| self.included.contains(c)) {
            if let Some(node) = self.catalog.node(child) {
                ctx.check_cancelled(node.name())?;
            }
            changes += self.run_unit(child, func, ctx)?;
        }
        Ok(changes)
    }

    fn run_sequence(
        &self,
        name: &str,
        children: &[usize],
        repeat: bool,
        func: &mut Function,
        ctx: &mut PassContext,
    ) -> Result<usize> {
        let limit = ctx.config().max_iterations;
        ctx.events
            .record(EventKind::UnitStarted)
            .function(func.entry())
            .unit(name);

        let mut total = 0;
        let mut passes = 1;
        loop {
            let changes = self.run_children(children, func, ctx)?;
            total += changes;
            if !repeat || changes == 0 {
                break;
            }
            passes += 1;
            if passes > limit {
                return Err(Error::IterationLimit {
                    unit: name.to_string(),
                    limit,
                });
            }
        }

        ctx.events
            .record(EventKind::UnitCompleted)
            .function(func.entry())
            .unit(name)
            .message(format!("{total} changes in {passes} passes"));
        Ok(total)
    }

    fn run_fixpoint(
        &self,
        name: &str,
        children: &[usize],
        limit: usize,
        func: &mut Function,
        ctx: &mut PassContext,
    ) -> Result<usize> {
        ctx.set_pass_number(0);
        ctx.take_restart();
        ctx.events
            .record(EventKind::UnitStarted)
            .function(func.entry())
            .unit(name);

        let mut total = 0;
        let mut round: u32 = 0;
        loop {
            round += 1;
            if round as usize > limit {
                return Err(Error::IterationLimit {
                    unit: name.to_string(),
                    limit,
                });
            }
            if round > 1 {
                ctx.events
                    .record(EventKind::Restart)
                    .function(func.entry())
                    .unit(name)
                    .message(format!("round {round}"));
            }
            ctx.set_pass_number(round);
            func.activate_spaces(round);

            let changes = self.run_children(children, func, ctx)?;
            total += changes;

            let restart = ctx.take_restart();
            if changes == 0 && !restart && !spaces_pending(func, round) {
                break;
            }
        }

        ctx.events
            .record(EventKind::UnitCompleted)
            .function(func.entry())
            .unit(name)
            .message(format!("{total} changes in {round} rounds"));
        Ok(total)
    }

    fn run_pool(
        &self,
        index: usize,
        name: &str,
        repeat: bool,
        func: &mut Function,
        ctx: &mut PassContext,
    ) -> Result<usize> {
        let Some(table) = self.dispatch.get(&index) else {
            return Ok(0);
        };
        let limit = ctx.config().max_iterations;
        let record_rules = ctx.config().record_rule_events;

        let mut total = 0;
        let mut scans = 1;
        loop {
            let mut changes = 0;
            // re-read the bound so operations created by a rewrite are visited
            let mut slot = 0;
            while slot < func.op_slots() {
                if let Some(op) = func.op_at(slot) {
                    let opcode = func.require_op(op)?.opcode();
                    for &rule_index in &table[opcode.index()] {
                        let Some(rule_node) = self.catalog.node(rule_index) else {
                            continue;
                        };
                        let UnitKind::Rule(rule) = rule_node.kind() else {
                            continue;
                        };
                        let rule_name = rule_node.name();
                        ctx.enter(rule_name);
                        ctx.record_test(rule_name);
                        let fired = rule.apply_op(op, func, ctx)?;
                        ctx.record_changes(rule_name, fired);
                        ctx.leave();
                        if fired > 0 {
                            if record_rules {
                                ctx.events
                                    .record(EventKind::RuleApplied)
                                    .at(func.entry(), slot)
                                    .unit(rule_name);
                            }
                            changes += fired;
                            break;
                        }
                    }
                }
                slot += 1;
            }

            total += changes;
            if !repeat || changes == 0 {
                break;
            }
            scans += 1;
            if scans > limit {
                return Err(Error::IterationLimit {
                    unit: name.to_string(),
                    limit,
                });
            }
        }
        ctx.record_changes(name, total);
        Ok(total)
    }
}

/// Returns `true` if some space still waits for a later round to become
/// eligible for dead-code removal.
fn spaces_pending(func: &Function, round: u32) -> bool {
    Space::iter().any(|s| !func.is_dead_removal_allowed(s) && func.space_delay(s) > round)
}

fn select(
    catalog: &Catalog,
    index: usize,
    tags: &GroupList,
    allowed: &dyn Fn(usize) -> bool,
    included: &mut BitSet,
) -> bool {
    let Some(node) = catalog.node(index) else {
        return false;
    };
    if !allowed(index) {
        return false;
    }
    let survives = if node.kind().is_leaf() {
        tags.contains(node.group())
    } else if !node.group().is_empty() && !tags.contains(node.group()) {
        false
    } else {
        let mut any = false;
        for &child in node.kind().children() {
            any |= select(catalog, child, tags, allowed, included);
        }
        any
    };
    if survives {
        included.insert(index);
    }
    survives
}

impl PartialEq for Pipeline {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.catalog, &other.catalog) && self.included == other.included
    }
}

impl Eq for Pipeline {}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("units", &self.unit_names())
            .finish()
    }
}
