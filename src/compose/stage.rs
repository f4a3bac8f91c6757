//! Composed view over a root document and everything it references
//!
//! Composition is eager at the layer level: every transitively referenced
//! document is loaded up front. Node composition is lazy: a node's opinion
//! sources are expanded when it is queried. Sources are ordered strongest
//! first:
//! - the direct spec
//! - the spec's selected variants
//! - referenced targets, recursively

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::document::{
    Attribute, Document, DocumentStore, LayerKey, NodePath, NodeSpec, Opinions, Reference,
    Specifier, TimeCode, Value,
};

/// Identifies which loaded document a site lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerId {
    Root,
    Loaded(usize),
}

/// Maps relationship targets from a referenced document's namespace into
/// the composed namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathMapping {
    source: NodePath,
    target: NodePath,
}

impl PathMapping {
    pub fn identity() -> Self {
        Self {
            source: NodePath::root(),
            target: NodePath::root(),
        }
    }

    /// Map `path`; targets outside the mapped subtree pass through unchanged.
    pub fn map(&self, path: &NodePath) -> NodePath {
        path.replace_prefix(&self.source, &self.target)
            .unwrap_or_else(|| path.clone())
    }
}

/// A spec location contributing to a composed node.
#[derive(Clone, Debug)]
pub struct Site {
    pub layer: LayerId,
    pub path: NodePath,
    pub mapping: PathMapping,
}

/// One set of opinions contributing to a composed node.
#[derive(Clone, Debug)]
pub struct Source<'s> {
    pub layer: LayerId,
    pub opinions: &'s Opinions,
    pub mapping: PathMapping,
    /// `(set, variant)` when the opinions come from a variant.
    pub variant: Option<(String, String)>,
}

struct LoadedLayer {
    key: LayerKey,
    doc: Document,
}

/// A composed node: every contributing spec and opinion source.
pub struct ComposedNode<'s> {
    pub path: NodePath,
    specs: Vec<(&'s NodeSpec, Site)>,
    sources: Vec<Source<'s>>,
    selections: BTreeMap<String, String>,
}

/// Summary of one variant set as seen through composition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComposedVariantSet {
    pub name: String,
    pub variants: Vec<String>,
    pub selection: Option<String>,
}

impl<'s> ComposedNode<'s> {
    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// Strongest authored type name.
    pub fn type_name(&self) -> Option<&'s str> {
        self.specs.iter().find_map(|(spec, _)| spec.type_name.as_deref())
    }

    /// True if any contributing spec is a `def`.
    pub fn is_defined(&self) -> bool {
        self.specs.iter().any(|(spec, _)| spec.specifier == Specifier::Def)
    }

    pub fn sources(&self) -> &[Source<'s>] {
        &self.sources
    }

    /// Strongest attribute opinion with a value, else the strongest declaration.
    pub fn attribute(&self, name: &str) -> Option<&'s Attribute> {
        let mut declared = None;
        for source in &self.sources {
            if let Some(attr) = source.opinions.attribute(name) {
                if attr.has_value() {
                    return Some(attr);
                }
                declared.get_or_insert(attr);
            }
        }
        declared
    }

    /// Resolved value of `name` at `time`.
    pub fn value(&self, name: &str, time: TimeCode) -> Option<&'s Value> {
        self.sources
            .iter()
            .find_map(|s| s.opinions.attribute(name).and_then(|a| a.get(time)))
    }

    /// Every attribute name visible through composition, sorted.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sources
            .iter()
            .flat_map(|s| s.opinions.attributes.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn xform_op_order(&self) -> Option<&'s [String]> {
        self.sources
            .iter()
            .find_map(|s| s.opinions.xform_op_order.as_deref())
    }

    /// Strongest material binding, mapped into the composed namespace.
    pub fn material_binding(&self) -> Option<NodePath> {
        self.sources.iter().find_map(|s| {
            s.opinions
                .material_binding
                .as_ref()
                .map(|target| s.mapping.map(target))
        })
    }

    /// True if any source carries reference opinions.
    pub fn has_authored_references(&self) -> bool {
        self.sources.iter().any(|s| !s.opinions.references.is_empty())
    }

    /// References authored on the root document's direct spec.
    pub fn direct_references(&self) -> Vec<Reference> {
        self.sources
            .iter()
            .find(|s| s.layer == LayerId::Root && s.variant.is_none())
            .map(|s| s.opinions.references.clone())
            .unwrap_or_default()
    }

    /// Child names, the ordered union across contributing specs.
    pub fn children(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (spec, _) in &self.specs {
            for child in &spec.children {
                if !names.contains(&child.name) {
                    names.push(child.name.clone());
                }
            }
        }
        names
    }

    /// Variant sets across contributing specs with their resolved selection.
    pub fn variant_sets(&self) -> Vec<ComposedVariantSet> {
        let mut out: Vec<ComposedVariantSet> = Vec::new();
        for (spec, _) in &self.specs {
            for set in &spec.variant_sets {
                let entry = match out.iter().position(|s| s.name == set.name) {
                    Some(i) => &mut out[i],
                    None => {
                        out.push(ComposedVariantSet {
                            name: set.name.clone(),
                            variants: Vec::new(),
                            selection: self.selections.get(&set.name).cloned(),
                        });
                        let last = out.len() - 1;
                        &mut out[last]
                    }
                };
                for variant in &set.variants {
                    if !entry.variants.contains(&variant.name) {
                        entry.variants.push(variant.name.clone());
                    }
                }
            }
        }
        out
    }
}

/// A root document composed with its referenced documents.
pub struct Stage<'d> {
    root: &'d Document,
    layers: Vec<LoadedLayer>,
    index: HashMap<LayerKey, usize>,
    resolved: HashMap<(LayerId, String), usize>,
    errors: Vec<String>,
}

impl<'d> Stage<'d> {
    /// Compose `root`, loading referenced documents through `store`.
    /// Load failures and reference cycles are recorded, not raised.
    pub fn compose(root: &'d Document, store: &dyn DocumentStore) -> Self {
        let mut stage = Self {
            root,
            layers: Vec::new(),
            index: HashMap::new(),
            resolved: HashMap::new(),
            errors: Vec::new(),
        };
        let mut chain: Vec<LayerKey> = root.origin().map(LayerKey::for_origin).into_iter().collect();
        stage.load_references(LayerId::Root, store, &mut chain);
        if !stage.errors.is_empty() {
            log::debug!("Composed with {} error(s)", stage.errors.len());
        }
        stage
    }

    fn load_references(&mut self, id: LayerId, store: &dyn DocumentStore, chain: &mut Vec<LayerKey>) {
        let (assets, origin) = {
            let doc = self.doc(id);
            (asset_paths(doc), doc.origin().cloned())
        };
        for asset in assets {
            let key = store.resolve_asset(origin.as_ref(), &asset);
            if chain.contains(&key) {
                let mut names: Vec<String> = chain.iter().map(LayerKey::display).collect();
                names.push(key.display());
                self.errors
                    .push(format!("Reference cycle: {}", names.join(" -> ")));
                continue;
            }
            let index = match self.index.get(&key) {
                Some(&index) => index,
                None => match store.load_layer(&key) {
                    Ok(doc) => {
                        let index = self.layers.len();
                        self.layers.push(LoadedLayer {
                            key: key.clone(),
                            doc,
                        });
                        self.index.insert(key.clone(), index);
                        chain.push(key.clone());
                        self.load_references(LayerId::Loaded(index), store, chain);
                        chain.pop();
                        index
                    }
                    Err(e) => {
                        self.errors.push(format!("{}: {}", key.display(), e));
                        continue;
                    }
                },
            };
            self.resolved.insert((id, asset), index);
        }
    }

    pub fn root(&self) -> &'d Document {
        self.root
    }

    /// Document behind a layer id.
    pub fn doc(&self, id: LayerId) -> &Document {
        match id {
            LayerId::Root => self.root,
            LayerId::Loaded(i) => &self.layers[i].doc,
        }
    }

    /// Keys of every loaded referenced document, in load order.
    pub fn layer_keys(&self) -> Vec<&LayerKey> {
        self.layers.iter().map(|l| &l.key).collect()
    }

    /// Load failures and cycles recorded during composition.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// The document a reference authored in `layer` resolves to.
    pub fn resolve_reference(&self, layer: LayerId, asset: &str) -> Option<LayerId> {
        self.resolved
            .get(&(layer, asset.to_string()))
            .map(|&i| LayerId::Loaded(i))
    }

    pub fn exists(&self, path: &NodePath) -> bool {
        self.node(path).is_some()
    }

    /// Compose the node at `path`, or `None` if nothing contributes a spec.
    pub fn node(&self, path: &NodePath) -> Option<ComposedNode<'_>> {
        if path.is_root() {
            return None;
        }
        let mut current: Option<ComposedNode<'_>> = None;
        for prefix in path.prefixes() {
            let seeds: Vec<Site> = match &current {
                None => vec![Site {
                    layer: LayerId::Root,
                    path: prefix.clone(),
                    mapping: PathMapping::identity(),
                }],
                Some(parent) => parent
                    .specs
                    .iter()
                    .filter_map(|(spec, site)| {
                        spec.child(prefix.name())?;
                        Some(Site {
                            layer: site.layer,
                            path: site.path.child(prefix.name()).ok()?,
                            mapping: site.mapping.clone(),
                        })
                    })
                    .collect(),
            };
            let node = self.expand(seeds, &prefix);
            if node.specs.is_empty() {
                return None;
            }
            current = Some(node);
        }
        current
    }

    /// Root-level node names of the composed scene.
    pub fn root_children(&self) -> Vec<String> {
        self.root.root_names()
    }

    /// Depth-first listing of composed paths under `root` (exclusive),
    /// `max_depth` levels deep (`None` for unlimited).
    pub fn descendants(&self, root: &NodePath, max_depth: Option<usize>) -> Vec<NodePath> {
        let mut out = Vec::new();
        let names = if root.is_root() {
            self.root_children()
        } else {
            match self.node(root) {
                Some(node) => node.children(),
                None => return out,
            }
        };
        for name in names {
            if let Ok(child) = root.child(&name) {
                self.walk(child, 1, max_depth, &mut out);
            }
        }
        out
    }

    fn walk(&self, path: NodePath, depth: usize, max_depth: Option<usize>, out: &mut Vec<NodePath>) {
        let Some(node) = self.node(&path) else {
            return;
        };
        let children = node.children();
        out.push(path.clone());
        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        for name in children {
            if let Ok(child) = path.child(&name) {
                self.walk(child, depth + 1, max_depth, out);
            }
        }
    }

    fn expand(&self, seeds: Vec<Site>, composed: &NodePath) -> ComposedNode<'_> {
        let mut node = ComposedNode {
            path: composed.clone(),
            specs: Vec::new(),
            sources: Vec::new(),
            selections: BTreeMap::new(),
        };
        let mut chain = Vec::new();
        for seed in seeds {
            self.expand_site(seed, composed, &mut node, &mut chain);
        }
        node
    }

    fn expand_site<'s>(
        &'s self,
        site: Site,
        composed: &NodePath,
        node: &mut ComposedNode<'s>,
        chain: &mut Vec<(LayerId, NodePath)>,
    ) {
        let doc = self.doc(site.layer);
        let Some(spec) = doc.node(&site.path) else {
            return;
        };
        let id = (site.layer, site.path.clone());
        if chain.contains(&id) {
            return;
        }
        chain.push(id);

        for set in &spec.variant_sets {
            if let Some(selection) = &set.selection {
                node.selections
                    .entry(set.name.clone())
                    .or_insert_with(|| selection.clone());
            }
        }

        node.sources.push(Source {
            layer: site.layer,
            opinions: &spec.opinions,
            mapping: site.mapping.clone(),
            variant: None,
        });
        let mut references: Vec<&Reference> = spec.opinions.references.iter().collect();

        for set in &spec.variant_sets {
            let chosen = node
                .selections
                .get(&set.name)
                .and_then(|name| set.variant(name));
            if let Some(variant) = chosen {
                node.sources.push(Source {
                    layer: site.layer,
                    opinions: &variant.opinions,
                    mapping: site.mapping.clone(),
                    variant: Some((set.name.clone(), variant.name.clone())),
                });
                references.extend(variant.opinions.references.iter());
            }
        }

        let layer = site.layer;
        node.specs.push((spec, site));

        for reference in references {
            let Some(target_layer) = self.resolve_reference(layer, &reference.asset_path) else {
                continue;
            };
            let target_doc = self.doc(target_layer);
            let target_path = match &reference.internal_path {
                Some(path) => path.clone(),
                None => match target_doc.default_node_path() {
                    Some(path) => path.clone(),
                    None => continue,
                },
            };
            let target = Site {
                layer: target_layer,
                path: target_path.clone(),
                mapping: PathMapping {
                    source: target_path,
                    target: composed.clone(),
                },
            };
            self.expand_site(target, composed, node, chain);
        }

        chain.pop();
    }
}

fn asset_paths(doc: &Document) -> Vec<String> {
    fn visit(spec: &NodeSpec, out: &mut Vec<String>) {
        let variant_refs = spec
            .variant_sets
            .iter()
            .flat_map(|s| s.variants.iter())
            .flat_map(|v| v.opinions.references.iter());
        for reference in spec.opinions.references.iter().chain(variant_refs) {
            if !out.contains(&reference.asset_path) {
                out.push(reference.asset_path.clone());
            }
        }
        for child in &spec.children {
            visit(child, out);
        }
    }

    let mut out = Vec::new();
    for spec in &doc.nodes {
        visit(spec, &mut out);
    }
    out
}
