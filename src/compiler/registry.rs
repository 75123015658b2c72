//! The pass registry.
//!
//! The registry owns the universal [`Catalog`], a table of named
//! [`GroupList`]s and a cache of the pipelines derived from them. Every named
//! pipeline is a restriction of the one catalog, so new pipelines are made by
//! cloning and toggling group lists instead of re-authoring unit lists.
//!
//! # Cache invariant
//!
//! A cached pipeline always corresponds to the group list registered under
//! the same name. Every edit of a list drops its cached pipeline (and the
//! pipelines derived from it) before the next use.
//!
//! Once the active root is derived, its list and the lists of every base it
//! is restricted to can only change through the hot-swap operations
//! ([`PassRegistry::replace_group_list`] and [`PassRegistry::toggle_group`]),
//! which re-derive the active root or leave everything as it was.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pcodeflow::{PassRegistry, SchedulerConfig};
//!
//! let mut registry = PassRegistry::standard(SchedulerConfig::default())?;
//! registry.register_group_list("mini", ["base"])?;
//!
//! let mini = registry.derive("mini")?;
//! assert!(Arc::ptr_eq(&mini, &registry.derive("mini")?));
//!
//! let wider = registry.toggle_group("mini", "analysis", true)?;
//! assert!(wider.contains("identity"));
//! # Ok::<(), pcodeflow::Error>(())
//! ```

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    compiler::{
        catalog::Catalog, config::SchedulerConfig, pipeline::Pipeline, standard,
    },
    Error, Result,
};

/// An ordered set of group tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupList {
    tags: Vec<String>,
}

impl GroupList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list from `tags`, dropping repeats.
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for tag in tags {
            list.insert(tag);
        }
        list
    }

    /// Returns `true` if `tag` is listed.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Appends `tag`. Returns `false` if it was already listed.
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Removes `tag`. Returns `false` if it was not listed.
    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    /// Iterates over the tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Returns the number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if no tag is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Registry of named pipelines derived from one universal catalog.
///
/// Registry mutation is not synchronised; hosts running pipelines on several
/// threads derive the handles they need first and share the `Arc<Pipeline>`s.
#[derive(Debug)]
pub struct PassRegistry {
    catalog: Arc<Catalog>,
    config: SchedulerConfig,
    defaults: HashMap<String, GroupList>,
    lists: HashMap<String, GroupList>,
    bases: HashMap<String, String>,
    cache: HashMap<String, Arc<Pipeline>>,
    active: Option<String>,
}

impl PassRegistry {
    /// Creates a registry over `catalog` without any group list.
    #[must_use]
    pub fn new(catalog: Catalog, config: SchedulerConfig) -> Self {
        Self {
            catalog: Arc::new(catalog),
            config,
            defaults: HashMap::new(),
            lists: HashMap::new(),
            bases: HashMap::new(),
            cache: HashMap::new(),
            active: None,
        }
    }

    /// Creates a registry over the standard catalog with the six standard
    /// group lists: `decompile`, `jumptable`, `normalize`, `paramid`,
    /// `register` and `firstpass`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateUnit`] if the standard catalog is malformed.
    pub fn standard(config: SchedulerConfig) -> Result<Self> {
        let mut registry = Self::new(standard::standard_catalog()?, config);
        for (name, tags) in standard::STANDARD_GROUP_LISTS {
            registry
                .defaults
                .insert((*name).to_string(), GroupList::from_tags(tags.iter().copied()));
        }
        registry.lists = registry.defaults.clone();
        Ok(registry)
    }

    /// Returns the universal catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the configuration contexts for this registry's pipelines should use.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Registers `tags` under `name`, replacing any previous list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActivePipelineLocked`] if `name` is the active root
    /// and already derived; use [`PassRegistry::replace_group_list`] instead.
    pub fn register_group_list<I, S>(&mut self, name: &str, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check_unlocked(name)?;
        self.lists.insert(name.to_string(), GroupList::from_tags(tags));
        self.invalidate(name);
        Ok(())
    }

    /// Registers `tags` under `name` and re-derives it, hot-swapping the
    /// active root if `name` is the active root or one of its bases.
    ///
    /// On failure the previous list and derivations are restored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyPipeline`] if the new list, or the active root
    /// restricted by it, selects nothing.
    pub fn replace_group_list<I, S>(&mut self, name: &str, tags: I) -> Result<Arc<Pipeline>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = GroupList::from_tags(tags);
        self.swap_list(name, |list| {
            *list = tags;
            true
        })
    }

    /// Returns the pipeline named `name`, deriving and caching it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGroupList`] if no list is registered under
    /// `name`, or [`Error::EmptyPipeline`] if the list selects nothing.
    pub fn derive(&mut self, name: &str) -> Result<Arc<Pipeline>> {
        if let Some(pipeline) = self.cache.get(name) {
            return Ok(Arc::clone(pipeline));
        }
        let Some(tags) = self.lists.get(name).cloned() else {
            return Err(Error::UnknownGroupList(name.to_string()));
        };
        let base = match self.bases.get(name).cloned() {
            Some(base) => Some(self.derive(&base)?),
            None => None,
        };
        let pipeline = Arc::new(Pipeline::derive(
            name,
            &self.catalog,
            &tags,
            base.as_deref(),
        )?);
        self.cache.insert(name.to_string(), Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Derives `name` as a restriction of the pipeline `base`.
    ///
    /// Naming the catalog root as `base` is the same as [`PassRegistry::derive`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPipeline`] if `base` is neither the catalog
    /// root nor derivable, or [`Error::UnknownGroupList`] if `name` has no list.
    pub fn derive_from(&mut self, base: &str, name: &str) -> Result<Arc<Pipeline>> {
        let root = self
            .catalog
            .node(self.catalog.root())
            .map(|n| n.name().to_string())
            .unwrap_or_default();
        let new_base = if base == root {
            None
        } else if self.cache.contains_key(base) || self.lists.contains_key(base) {
            Some(base.to_string())
        } else {
            return Err(Error::UnknownPipeline(base.to_string()));
        };
        if let Some(b) = &new_base {
            if self.creates_cycle(b, name) {
                return Err(Error::UnknownPipeline(base.to_string()));
            }
        }
        if !self.lists.contains_key(name) {
            return Err(Error::UnknownGroupList(name.to_string()));
        }

        if self.bases.get(name) != new_base.as_ref() {
            self.check_unlocked(name)?;
            match new_base {
                Some(b) => self.bases.insert(name.to_string(), b),
                None => self.bases.remove(name),
            };
            self.invalidate(name);
        }
        self.derive(name)
    }

    /// Adds (`on`) or removes `tag` in the list `name` and re-derives it,
    /// hot-swapping the active root if `name` is the active root or one of
    /// its bases.
    ///
    /// On failure the previous list and derivations are restored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGroupList`] if `name` has no list, or
    /// [`Error::EmptyPipeline`] if the edited list selects nothing.
    pub fn toggle_group(&mut self, name: &str, tag: &str, on: bool) -> Result<Arc<Pipeline>> {
        if !self.lists.contains_key(name) {
            return Err(Error::UnknownGroupList(name.to_string()));
        }
        self.swap_list(name, |list| if on { list.insert(tag) } else { list.remove(tag) })
    }

    /// Derives `name` if necessary and makes it the active root.
    ///
    /// # Errors
    ///
    /// Same as [`PassRegistry::derive`].
    pub fn set_active(&mut self, name: &str) -> Result<Arc<Pipeline>> {
        let pipeline = self.derive(name)?;
        self.active = Some(name.to_string());
        Ok(pipeline)
    }

    /// Returns the active root pipeline.
    #[must_use]
    pub fn active(&self) -> Option<Arc<Pipeline>> {
        self.active
            .as_ref()
            .and_then(|name| self.cache.get(name))
            .cloned()
    }

    /// Returns the name of the active root pipeline.
    #[must_use]
    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Copies the list `old` to `new` for incremental specialisation.
    ///
    /// The pipeline cached under `old` is unaffected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGroupList`] if `old` has no list,
    /// [`Error::UnknownPipeline`] if `new` is one of the bases `old` is
    /// restricted to, or [`Error::ActivePipelineLocked`] if `new` is the
    /// derived active root or one of its bases.
    pub fn clone_group_list(&mut self, old: &str, new: &str) -> Result<()> {
        let Some(list) = self.lists.get(old).cloned() else {
            return Err(Error::UnknownGroupList(old.to_string()));
        };
        if let Some(base) = self.bases.get(old) {
            if self.creates_cycle(base, new) {
                return Err(Error::UnknownPipeline(base.clone()));
            }
        }
        self.check_unlocked(new)?;
        self.lists.insert(new.to_string(), list);
        if let Some(base) = self.bases.get(old).cloned() {
            self.bases.insert(new.to_string(), base);
        } else {
            self.bases.remove(new);
        }
        self.invalidate(new);
        Ok(())
    }

    /// Adds `tag` to the list `name` without re-deriving.
    ///
    /// Returns `false` if the tag was already listed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGroupList`] or [`Error::ActivePipelineLocked`].
    pub fn add_to_group(&mut self, name: &str, tag: &str) -> Result<bool> {
        self.edit_list(name, |list| list.insert(tag))
    }

    /// Removes `tag` from the list `name` without re-deriving.
    ///
    /// Returns `false` if the tag was not listed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGroupList`] or [`Error::ActivePipelineLocked`].
    pub fn remove_from_group(&mut self, name: &str, tag: &str) -> Result<bool> {
        self.edit_list(name, |list| list.remove(tag))
    }

    /// Returns the list registered under `name`.
    #[must_use]
    pub fn group_list(&self, name: &str) -> Option<&GroupList> {
        self.lists.get(name)
    }

    /// Returns every registered list name, sorted.
    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.lists.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns `true` if a derivation is cached under `name`.
    #[must_use]
    pub fn is_derived(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    /// Restores the standard group lists and drops every cached derivation.
    ///
    /// The active root is re-derived if its list is a standard one and
    /// deactivated otherwise.
    ///
    /// # Errors
    ///
    /// Same as [`PassRegistry::derive`].
    pub fn reset_defaults(&mut self) -> Result<()> {
        self.lists = self.defaults.clone();
        self.bases.clear();
        self.cache.clear();
        if let Some(active) = self.active.clone() {
            if self.lists.contains_key(&active) {
                self.derive(&active)?;
            } else {
                self.active = None;
            }
        }
        Ok(())
    }

    fn edit_list<F>(&mut self, name: &str, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut GroupList) -> bool,
    {
        self.check_unlocked(name)?;
        let Some(list) = self.lists.get_mut(name) else {
            return Err(Error::UnknownGroupList(name.to_string()));
        };
        let changed = edit(list);
        if changed {
            self.invalidate(name);
        }
        Ok(changed)
    }

    /// Edits the list `name` (creating it if needed), then re-derives it and
    /// the active root. Rolls the list and the cache back if either fails.
    fn swap_list<F>(&mut self, name: &str, edit: F) -> Result<Arc<Pipeline>>
    where
        F: FnOnce(&mut GroupList) -> bool,
    {
        let previous = self.lists.get(name).cloned();
        let mut list = previous.clone().unwrap_or_default();
        if !edit(&mut list) && previous.is_some() {
            return self.derive(name);
        }
        self.lists.insert(name.to_string(), list);
        let dropped = self.invalidate(name);

        let result = self.derive(name).and_then(|pipeline| {
            if let Some(active) = self.active.clone() {
                if !self.cache.contains_key(&active) {
                    self.derive(&active)?;
                }
            }
            Ok(pipeline)
        });
        if result.is_err() {
            match previous {
                Some(list) => self.lists.insert(name.to_string(), list),
                None => self.lists.remove(name),
            };
            for (dropped_name, pipeline) in dropped {
                match pipeline {
                    Some(pipeline) => self.cache.insert(dropped_name, pipeline),
                    None => self.cache.remove(&dropped_name),
                };
            }
        }
        result
    }

    /// Returns the bases `name` is restricted to, nearest first.
    fn ancestors(&self, name: &str) -> Vec<&str> {
        let mut chain: Vec<&str> = Vec::new();
        let mut cursor = self.bases.get(name);
        while let Some(base) = cursor {
            if base == name || chain.contains(&base.as_str()) {
                break;
            }
            chain.push(base);
            cursor = self.bases.get(base);
        }
        chain
    }

    /// Returns `true` if restricting `name` to `base` would make `name` its
    /// own ancestor.
    fn creates_cycle(&self, base: &str, name: &str) -> bool {
        base == name || self.ancestors(base).contains(&name)
    }

    fn check_unlocked(&self, name: &str) -> Result<()> {
        let Some(active) = self.active.as_deref() else {
            return Ok(());
        };
        if self.cache.contains_key(active)
            && (active == name || self.ancestors(active).contains(&name))
        {
            return Err(Error::ActivePipelineLocked(name.to_string()));
        }
        Ok(())
    }

    /// Drops the cached derivation of `name` and of everything derived from
    /// it, returning each visited name with the pipeline it had cached.
    fn invalidate(&mut self, name: &str) -> Vec<(String, Option<Arc<Pipeline>>)> {
        let mut dropped: Vec<(String, Option<Arc<Pipeline>>)> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut worklist = vec![name.to_string()];
        while let Some(current) = worklist.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            worklist.extend(
                self.bases
                    .iter()
                    .filter(|(_, base)| **base == current)
                    .map(|(derived, _)| derived.clone()),
            );
            let pipeline = self.cache.remove(&current);
            dropped.push((current, pipeline));
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PassRegistry {
        PassRegistry::standard(SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn test_group_list_is_ordered_set() {
        let mut list = GroupList::from_tags(["base", "analysis", "base"]);
        assert_eq!(list.len(), 2);
        assert!(!list.insert("analysis"));
        assert!(list.insert("cleanup"));
        assert!(list.remove("base"));
        assert!(!list.remove("base"));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["analysis", "cleanup"]);
    }

    #[test]
    fn test_standard_lists() {
        let registry = registry();
        assert_eq!(
            registry.group_names(),
            vec!["decompile", "firstpass", "jumptable", "normalize", "paramid", "register"]
        );
        assert!(registry.group_list("decompile").unwrap().contains("deadcode"));
        assert!(!registry.group_list("register").unwrap().contains("deadcode"));
    }

    #[test]
    fn test_unknown_names() {
        let mut registry = registry();
        assert!(matches!(
            registry.derive("missing"),
            Err(Error::UnknownGroupList(_))
        ));
        assert!(matches!(
            registry.derive_from("missing", "decompile"),
            Err(Error::UnknownPipeline(_))
        ));
        assert!(matches!(
            registry.clone_group_list("missing", "x"),
            Err(Error::UnknownGroupList(_))
        ));
        assert!(matches!(
            registry.toggle_group("missing", "base", true),
            Err(Error::UnknownGroupList(_))
        ));
    }

    #[test]
    fn test_active_list_is_locked() {
        let mut registry = registry();
        registry.set_active("decompile").unwrap();
        assert_eq!(registry.active_name(), Some("decompile"));
        assert!(matches!(
            registry.register_group_list("decompile", ["base"]),
            Err(Error::ActivePipelineLocked(_))
        ));
        assert!(matches!(
            registry.add_to_group("decompile", "extra"),
            Err(Error::ActivePipelineLocked(_))
        ));

        let swapped = registry.replace_group_list("decompile", ["base"]).unwrap();
        assert!(Arc::ptr_eq(&swapped, &registry.active().unwrap()));
        assert!(!swapped.contains("deadcode"));
    }

    #[test]
    fn test_toggle_hot_swaps_active() {
        let mut registry = registry();
        let before = registry.set_active("normalize").unwrap();
        assert!(before.contains("deadcode"));
        let after = registry.toggle_group("normalize", "deadcode", false).unwrap();
        assert!(!after.contains("deadcode"));
        assert!(Arc::ptr_eq(&after, &registry.active().unwrap()));
    }

    #[test]
    fn test_derive_from_base_restricts() {
        let mut registry = registry();
        registry.register_group_list("wide", ["base", "analysis", "deadcode", "cleanup"]).unwrap();
        let derived = registry.derive_from("firstpass", "wide").unwrap();
        let firstpass = registry.derive("firstpass").unwrap();
        assert_eq!(*derived, *firstpass);

        // editing the base invalidates the derived pipeline
        registry.toggle_group("firstpass", "analysis", true).unwrap();
        assert!(!registry.is_derived("wide"));
        assert!(registry.derive("wide").unwrap().contains("identity"));

        let unrestricted = registry.derive_from("universal", "wide").unwrap();
        assert!(unrestricted.contains("negatecompare"));
    }

    #[test]
    fn test_invalidate_visits_each_name_once() {
        let mut registry = registry();
        registry.derive("decompile").unwrap();
        registry.derive("register").unwrap();
        registry.bases.insert("decompile".into(), "register".into());
        registry.bases.insert("register".into(), "decompile".into());

        let dropped = registry.invalidate("decompile");
        let names: HashSet<&str> = dropped.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(dropped.len(), 2);
        assert_eq!(names, HashSet::from(["decompile", "register"]));
        assert!(!registry.is_derived("register"));
        assert_eq!(registry.ancestors("decompile"), vec!["register"]);
    }

    #[test]
    fn test_clone_then_edit_leaves_original() {
        let mut registry = registry();
        let original = registry.derive("decompile").unwrap();
        registry.clone_group_list("decompile", "custom").unwrap();
        assert!(registry.remove_from_group("custom", "deadcode").unwrap());
        assert!(Arc::ptr_eq(&original, &registry.derive("decompile").unwrap()));
        assert!(!registry.derive("custom").unwrap().contains("deadcode"));
    }

    #[test]
    fn test_reset_defaults() {
        let mut registry = registry();
        registry.set_active("decompile").unwrap();
        registry.toggle_group("decompile", "deadcode", false).unwrap();
        registry.register_group_list("mini", ["base"]).unwrap();

        registry.reset_defaults().unwrap();
        assert!(registry.group_list("mini").is_none());
        assert!(registry.active().unwrap().contains("deadcode"));
    }
}
