// ── Org unit hierarchy ──
//
// Builds a tree of org units from flat slash-delimited paths. Nodes live
// in an arena indexed by path; parent/child edges are arena indices, so
// the tree has no shared ownership and serializes directly.
//
// Building is pure: the input is collapsed into a sorted set of distinct
// paths before any node exists, so every enumeration order of the same
// paths yields the same arena and the same child order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::error::CoreError;
use crate::model::{CachedEntity, OrgUnit};

pub const ROOT_PATH: &str = "/";
pub const ROOT_NAME: &str = "Root";

const ROOT: usize = 0;

// ── Path helpers ────────────────────────────────────────────────────

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn join_segments(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

/// Lenient normalization for paths coming from the directory.
///
/// Empty segments are dropped (`/A//B/` becomes `/A/B`). Paths that do not
/// start with `/` are rejected.
pub fn normalize_org_path(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !raw.starts_with('/') {
        return None;
    }
    Some(join_segments(&segments(raw)))
}

/// Strict validation for operator input (e.g. a migration target).
pub fn parse_org_path(raw: &str) -> Result<String, CoreError> {
    let invalid = |reason: &str| CoreError::InvalidOrgPath {
        path: raw.to_owned(),
        reason: reason.to_owned(),
    };

    let path = raw.trim();
    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if !path.starts_with('/') {
        return Err(invalid("path must start with '/'"));
    }
    if path == ROOT_PATH {
        return Ok(path.to_owned());
    }
    if path.ends_with('/') {
        return Err(invalid("only the root path may end with '/'"));
    }
    if path.split('/').skip(1).any(|s| s.trim().is_empty()) {
        return Err(invalid("path contains an empty segment"));
    }
    Ok(path.to_owned())
}

/// `None` for the root, `/` for top-level units, otherwise the path minus
/// its last segment.
pub fn parent_path_of(path: &str) -> Option<String> {
    let segs = segments(path);
    match segs.len() {
        0 => None,
        n => Some(join_segments(&segs[..n - 1])),
    }
}

/// Last segment of the path, or `Root` for `/`.
pub fn name_of(path: &str) -> String {
    segments(path)
        .last()
        .map_or_else(|| ROOT_NAME.to_owned(), |s| (*s).to_owned())
}

/// `/`, `/A`, `/A/B`, ... up to and including `path`.
pub fn ancestor_chain(path: &str) -> Vec<String> {
    let segs = segments(path);
    (0..=segs.len()).map(|n| join_segments(&segs[..n])).collect()
}

/// Whether `path` is `ancestor` or lies anywhere beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    ancestor == ROOT_PATH
        || path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

// ── OrgUnitNode ─────────────────────────────────────────────────────

/// One org unit in the arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgUnitNode {
    /// Directory id, or the path itself for synthesized units.
    pub id: String,
    pub name: String,
    pub path: String,
    /// `None` only for the root.
    pub parent_path: Option<String>,
    pub block_inheritance: bool,
    /// Segment count; the root is depth 0.
    pub depth: usize,
    /// Arena indices, sorted by case-insensitive name.
    pub children: Vec<usize>,
}

/// Nested, owned rendering of the tree for output and comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgTreeView {
    pub id: String,
    pub name: String,
    pub path: String,
    pub parent_path: Option<String>,
    pub block_inheritance: bool,
    pub depth: usize,
    pub children: Vec<OrgTreeView>,
}

// ── OrgTree ─────────────────────────────────────────────────────────

/// Arena-backed org unit tree with exactly one root (`/`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgTree {
    nodes: Vec<OrgUnitNode>,
    index: HashMap<String, usize>,
}

/// Build the hierarchy for a set of paths, synthesizing every missing
/// ancestor and the root.
pub fn build_tree<I, S>(paths: I) -> OrgTree
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    OrgTree::build(paths)
}

impl OrgTree {
    pub fn build<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut distinct = BTreeSet::new();
        distinct.insert(ROOT_PATH.to_owned());
        for raw in paths {
            let Some(path) = normalize_org_path(raw.as_ref()) else {
                continue;
            };
            distinct.extend(ancestor_chain(&path));
        }
        Self::from_distinct(distinct)
    }

    /// Build from synced org units plus any paths only seen on devices or
    /// users. Known units contribute their id, display name, and
    /// block-inheritance flag.
    pub fn from_org_units<'a, U, I, S>(units: U, extra_paths: I) -> Self
    where
        U: IntoIterator<Item = &'a OrgUnit>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let units: Vec<&OrgUnit> = units.into_iter().collect();
        let mut tree = Self::build(
            units
                .iter()
                .map(|u| u.path.clone())
                .chain(extra_paths.into_iter().map(|p| p.as_ref().to_owned())),
        );

        for unit in units {
            if let Some(&idx) = tree.index.get(&unit.path) {
                let node = &mut tree.nodes[idx];
                node.id = unit.external_id.to_string();
                node.block_inheritance = unit.block_inheritance;
                if !unit.name.is_empty() {
                    node.name.clone_from(&unit.name);
                }
            }
        }
        tree.sort_children();
        tree
    }

    fn from_distinct(paths: BTreeSet<String>) -> Self {
        let mut nodes = Vec::with_capacity(paths.len());
        let mut index = HashMap::with_capacity(paths.len());

        // BTreeSet order puts every prefix before its extensions, so the
        // root lands at index 0 and parents precede children.
        for path in paths {
            index.insert(path.clone(), nodes.len());
            nodes.push(OrgUnitNode {
                id: path.clone(),
                name: name_of(&path),
                parent_path: parent_path_of(&path),
                depth: segments(&path).len(),
                block_inheritance: false,
                children: Vec::new(),
                path,
            });
        }

        for child in 1..nodes.len() {
            let parent = nodes[child]
                .parent_path
                .as_ref()
                .and_then(|p| index.get(p))
                .copied();
            if let Some(parent) = parent {
                nodes[parent].children.push(child);
            }
        }

        let mut tree = Self { nodes, index };
        tree.sort_children();
        tree
    }

    /// Case-insensitive name order; equal names keep path order.
    fn sort_children(&mut self) {
        let keys: Vec<String> = self.nodes.iter().map(|n| n.name.to_lowercase()).collect();
        for node in &mut self.nodes {
            node.children
                .sort_by(|a, b| keys[*a].cmp(&keys[*b]).then(a.cmp(b)));
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn root(&self) -> &OrgUnitNode {
        &self.nodes[ROOT]
    }

    /// The top-level node list. Always exactly the root.
    pub fn roots(&self) -> Vec<&OrgUnitNode> {
        vec![self.root()]
    }

    pub fn get(&self, path: &str) -> Option<&OrgUnitNode> {
        self.index.get(path).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn children<'a>(&'a self, node: &'a OrgUnitNode) -> impl Iterator<Item = &'a OrgUnitNode> {
        node.children.iter().map(|&i| &self.nodes[i])
    }

    pub fn parent(&self, node: &OrgUnitNode) -> Option<&OrgUnitNode> {
        node.parent_path.as_deref().and_then(|p| self.get(p))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth-first, pre-order walk in display order.
    pub fn walk(&self) -> Vec<&OrgUnitNode> {
        self.walk_from(ROOT)
    }

    fn walk_from(&self, start: usize) -> Vec<&OrgUnitNode> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// `path` and every path beneath it, in display order. Empty when the
    /// path is not in the tree.
    pub fn subtree_paths(&self, path: &str) -> Vec<String> {
        self.walk_subtree(path)
            .into_iter()
            .map(|n| n.path.clone())
            .collect()
    }

    /// Sum exact-path counts over `path` and its descendants.
    pub fn subtree_total(&self, counts: &BTreeMap<String, usize>, path: &str) -> usize {
        self.subtree_paths(path)
            .iter()
            .filter_map(|p| counts.get(p))
            .sum()
    }

    pub fn to_view(&self) -> OrgTreeView {
        self.view(ROOT)
    }

    /// Nested rendering of the subtree rooted at `path`.
    pub fn view_of(&self, path: &str) -> Option<OrgTreeView> {
        self.index.get(path).map(|&idx| self.view(idx))
    }

    /// Pre-order walk of the subtree rooted at `path`.
    pub fn walk_subtree(&self, path: &str) -> Vec<&OrgUnitNode> {
        self.index
            .get(path)
            .map_or_else(Vec::new, |&start| self.walk_from(start))
    }

    fn view(&self, idx: usize) -> OrgTreeView {
        let node = &self.nodes[idx];
        OrgTreeView {
            id: node.id.clone(),
            name: node.name.clone(),
            path: node.path.clone(),
            parent_path: node.parent_path.clone(),
            block_inheritance: node.block_inheritance,
            depth: node.depth,
            children: node.children.iter().map(|&c| self.view(c)).collect(),
        }
    }
}

// ── Counting ────────────────────────────────────────────────────────

/// Count entities per org unit path. Counts are exact-path only; a parent
/// never includes its descendants' entities.
pub fn count_by_exact_path<'a, T, I>(entities: I) -> BTreeMap<String, usize>
where
    T: CachedEntity + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut counts = BTreeMap::new();
    for entity in entities {
        *counts.entry(entity.org_unit_path().to_owned()).or_insert(0) += 1;
    }
    counts
}
