use std::fs;
use std::sync::Arc;
use std::path::{Path, PathBuf};

use derive_more::Debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Chainable, Result};
use crate::fstree::FsTree;
use crate::templating::{Segment, Template, CONTENT};
use crate::util::PathExt;

/// All templates of a build, indexed by name, with every inheritance chain
/// resolved up front.
///
/// A `Registry` is immutable once constructed, so a single instance is shared
/// by reference across all render workers.
#[derive(Debug, Default)]
pub struct Registry {
    root: Option<PathBuf>,
    #[debug(ignore)]
    templates: FxHashMap<Arc<str>, Arc<Template>>,
    #[debug(ignore)]
    chains: FxHashMap<Arc<str>, ResolvedChain>,
}

/// An inheritance chain, ordered from the root layout to the leaf template.
#[derive(Debug, Clone)]
pub struct ResolvedChain(Arc<[Arc<Template>]>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("template `{name}` not found")]
pub struct NotFound {
    pub name: String,
}

impl Registry {
    /// A registry with no templates; every lookup fails.
    pub fn empty() -> Self {
        Registry::default()
    }

    /// Reads every file under `root` as a template.
    ///
    /// A template's name is its path relative to `root`, with `/` separators
    /// and the final extension removed: `layouts/base.html` is
    /// `layouts/base`.
    pub fn load<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let tree = FsTree::build(root)
            .chain_with(|| error!("failed to open templates root", "templates root" => root.display()))?;

        let templates = tree.files()
            .map(|entry| {
                let relative = entry.relative_path();
                let name = relative.without_extension().to_slash();
                let body = fs::read_to_string(&entry.path).chain_with(|| error! {
                    "failed to read template",
                    "path" => entry.path.display(),
                })?;

                Template::parse(&name, Some(relative), &body)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut registry = Registry::assemble(templates)?;
        registry.root = Some(root.to_path_buf());
        tracing::debug!(root = %root.display(), templates = registry.len(), "loaded templates");
        Ok(registry)
    }

    /// Builds a registry from in-memory `(name, body)` pairs.
    ///
    /// ```rust
    /// use sitebuilder::templating::Registry;
    ///
    /// let registry = Registry::from_sources([
    ///     ("base", "<html>{{ content }}</html>"),
    ///     ("post", "{% extends \"base\" %}<article>{{ content }}</article>"),
    /// ]).unwrap();
    ///
    /// let chain = registry.resolve("post").unwrap();
    /// assert_eq!(chain.names().collect::<Vec<_>>(), ["base", "post"]);
    /// assert!(registry.resolve("missing").is_err());
    /// ```
    pub fn from_sources<I, N, B>(sources: I) -> Result<Self>
        where I: IntoIterator<Item = (N, B)>, N: AsRef<str>, B: AsRef<str>
    {
        let templates = sources.into_iter()
            .map(|(name, body)| Template::parse(name.as_ref(), None, body.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Registry::assemble(templates)
    }

    fn assemble(templates: Vec<Template>) -> Result<Self> {
        let mut raw: FxHashMap<Arc<str>, Template> = FxHashMap::default();
        for template in templates {
            if let Some(existing) = raw.get(&template.name) {
                let display = |t: &Template| t.source.as_deref()
                    .map_or_else(|| t.name.to_string(), |p| p.display().to_string());

                return err! {
                    "two templates share one name",
                    "name" => template.name,
                    "first" => display(existing),
                    "second" => display(&template),
                };
            }

            raw.insert(template.name.clone(), template);
        }

        let mut names: Vec<Arc<str>> = raw.keys().cloned().collect();
        names.sort();

        let mut expanded = FxHashMap::default();
        for name in &names {
            expand_includes(name, &raw, &mut expanded, &mut vec![])?;
        }

        for (name, segments) in expanded {
            if let Some(template) = raw.get_mut(&name) {
                template.set_expanded(segments);
            }
        }

        for name in &names {
            let template = &raw[name];
            let Some(parent) = &template.parent_name else { continue };
            let Some(parent_template) = raw.get(parent) else {
                return err! {
                    format!("template `{name}` extends unknown template `{parent}`"),
                    "template" => name,
                    "missing parent" => parent,
                };
            };

            if !parent_template.has_placeholder(CONTENT) {
                return err! {
                    format!("template `{parent}` is extended but has no `{{{{ {CONTENT} }}}}` placeholder"),
                    "extended by" => name,
                };
            }
        }

        let templates: FxHashMap<Arc<str>, Arc<Template>> = raw.into_iter()
            .map(|(name, template)| (name, Arc::new(template)))
            .collect();

        let mut chains = FxHashMap::default();
        for name in &names {
            let chain = resolve_chain(name, &templates)?;
            chains.insert(name.clone(), chain);
        }

        Ok(Registry { root: None, templates, chains })
    }

    /// The inheritance chain for `name`, root layout first.
    pub fn resolve(&self, name: &str) -> Result<ResolvedChain, NotFound> {
        self.chains.get(name)
            .cloned()
            .ok_or_else(|| NotFound { name: name.to_string() })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Template>> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// All template names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(|n| &**n).collect();
        names.sort_unstable();
        names
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Inlines every `{% include %}` of `name`, recursively, into `expanded`.
///
/// `stack` holds the includes currently being expanded; meeting one of them
/// again is a cycle.
fn expand_includes(
    name: &Arc<str>,
    raw: &FxHashMap<Arc<str>, Template>,
    expanded: &mut FxHashMap<Arc<str>, Vec<Segment>>,
    stack: &mut Vec<Arc<str>>,
) -> Result<()> {
    if expanded.contains_key(name) {
        return Ok(());
    }

    if let Some(i) = stack.iter().position(|n| n == name) {
        let cycle = stack[i..].iter().chain(Some(name))
            .map(|n| &**n)
            .collect::<Vec<_>>()
            .join(" -> ");

        return err!("template include cycle", "cycle" => cycle);
    }

    let template = &raw[name];
    if template.includes().next().is_none() {
        expanded.insert(name.clone(), template.segments.clone());
        return Ok(());
    }

    stack.push(name.clone());
    let mut segments: Vec<Segment> = Vec::with_capacity(template.segments.len());
    for segment in &template.segments {
        let Segment::Include(target) = segment else {
            push_segment(&mut segments, segment.clone());
            continue;
        };

        let Some(included) = raw.get(target) else {
            return err! {
                format!("template `{name}` includes unknown template `{target}`"),
                "template" => name,
                "missing include" => target,
            };
        };

        if let Some(parent) = &included.parent_name {
            return err! {
                format!("included template `{target}` cannot extend `{parent}`"),
                "included by" => name,
            };
        }

        expand_includes(target, raw, expanded, stack)?;
        for segment in &expanded[target] {
            push_segment(&mut segments, segment.clone());
        }
    }

    stack.pop();
    expanded.insert(name.clone(), segments);
    Ok(())
}

fn push_segment(segments: &mut Vec<Segment>, segment: Segment) {
    match (segments.last_mut(), segment) {
        (Some(Segment::Text(prev)), Segment::Text(text)) => *prev = format!("{prev}{text}").into(),
        (_, segment) => segments.push(segment),
    }
}

/// Walks parent links from `name` to its root layout, tracking every
/// template visited so that a cycle is reported instead of followed.
fn resolve_chain(
    name: &Arc<str>,
    templates: &FxHashMap<Arc<str>, Arc<Template>>,
) -> Result<ResolvedChain> {
    let mut visited: FxHashSet<&str> = FxHashSet::default();
    let mut chain: Vec<Arc<Template>> = vec![];
    let mut current = name;
    loop {
        if !visited.insert(&**current) {
            let start = chain.iter().position(|t| &t.name == current).unwrap_or(0);
            let cycle = chain[start..].iter()
                .map(|t| &*t.name)
                .chain(Some(&**current))
                .collect::<Vec<_>>()
                .join(" -> ");

            return err! {
                format!("template inheritance cycle: {cycle}"),
                "cycle" => cycle,
            };
        }

        let template = &templates[current];
        chain.push(template.clone());
        match &template.parent_name {
            Some(parent) => current = parent,
            None => break,
        }
    }

    chain.reverse();
    Ok(ResolvedChain(chain.into()))
}

impl ResolvedChain {
    /// Templates from the root layout to the leaf.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<Template>> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|t| &*t.name)
    }

    pub fn leaf(&self) -> &Arc<Template> {
        &self.0[self.0.len() - 1]
    }

    pub fn root(&self) -> &Arc<Template> {
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
