//! Inline SVG resolution.
//!
//! SVG files in the content tree are inlined into pages rather than linked,
//! so the site can style and animate them. [`InlineSvgPlugin`] loads each
//! `.svg` file node, optimizes the markup and attaches the result as an
//! `InlineSvg` child node.
//!
//! Both steps sit behind traits ([`ContentLoader`], [`SvgOptimizer`]) so the
//! pass can be exercised without touching the filesystem.
//!
//! ## Optimization
//!
//! [`XmlSvgOptimizer`] is a streaming rewrite over `quick-xml` events. With
//! the default [`OptimizeOptions`] it:
//!
//! - strips `xmlns` / `xmlns:*` declarations (the document is inlined into
//!   HTML, which supplies the namespace)
//! - inlines `<style>` rules into every matching element; `simplecss`
//!   parses the stylesheet and matches selectors (compounds, attribute
//!   selectors, descendant/child/sibling combinators, `:first-child`)
//!   against the elements seen so far
//! - converts style declarations that name SVG presentation attributes into
//!   those attributes
//! - strips `id` attributes, which would otherwise collide between several
//!   copies of the same icon on one page
//!
//! When any part of the stylesheet cannot be inlined (runtime pseudo-classes,
//! at-rules, `!important`, selectors `simplecss` does not understand) the
//! original text stays behind in a single `<style>` element. XML
//! declarations, doctypes, processing instructions and comments are dropped.

use crate::graph::{Actions, ContentNode, INLINE_SVG_TYPE, NodeId};
use crate::pipeline::{NodeContext, Plugin, text_digest};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};
use simplecss::{AttributeOperator, DeclarationTokenizer, Element, PseudoClass};
use std::borrow::Cow;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Node {0} has no relative path")]
    NoPath(NodeId),
}

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("Failed to write SVG: {0}")]
    Write(String),
    #[error("Optimized SVG is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Document has no <svg> root element")]
    NotSvg,
}

/// Loads the raw bytes behind a file node.
pub trait ContentLoader: Send + Sync {
    fn load(&self, node: &ContentNode) -> Result<Vec<u8>, LoadError>;
}

/// Reads `<root>/<relativePath>`.
#[derive(Debug, Clone)]
pub struct FsContentLoader {
    root: PathBuf,
}

impl FsContentLoader {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl ContentLoader for FsContentLoader {
    fn load(&self, node: &ContentNode) -> Result<Vec<u8>, LoadError> {
        let relative = node
            .get_str("relativePath")
            .ok_or_else(|| LoadError::NoPath(node.id.clone()))?;
        let path = self.root.join(relative);
        std::fs::read(&path).map_err(|source| LoadError::Io { path, source })
    }
}

/// Turns raw SVG markup into inline-ready markup.
pub trait SvgOptimizer: Send + Sync {
    fn optimize(&self, svg: &str) -> Result<String, OptimizeError>;
}

/// Which rewrites [`XmlSvgOptimizer`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeOptions {
    pub strip_namespaces: bool,
    pub inline_styles: bool,
    pub style_to_attributes: bool,
    pub strip_ids: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            strip_namespaces: true,
            inline_styles: true,
            style_to_attributes: true,
            strip_ids: true,
        }
    }
}

/// SVG presentation attributes a style declaration may be turned into.
const PRESENTATION_ATTRIBUTES: &[&str] = &[
    "clip-path",
    "clip-rule",
    "color",
    "display",
    "dominant-baseline",
    "fill",
    "fill-opacity",
    "fill-rule",
    "filter",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "mask",
    "opacity",
    "stop-color",
    "stop-opacity",
    "stroke",
    "stroke-dasharray",
    "stroke-dashoffset",
    "stroke-linecap",
    "stroke-linejoin",
    "stroke-miterlimit",
    "stroke-opacity",
    "stroke-width",
    "text-anchor",
    "visibility",
];

#[derive(Debug, Clone, Default)]
pub struct XmlSvgOptimizer {
    options: OptimizeOptions,
}

impl XmlSvgOptimizer {
    pub fn new(options: OptimizeOptions) -> Self {
        Self { options }
    }
}

impl SvgOptimizer for XmlSvgOptimizer {
    fn optimize(&self, svg: &str) -> Result<String, OptimizeError> {
        let css = collect_style_text(svg)?;
        let sheet = if self.options.inline_styles {
            Stylesheet::parse(&css)
        } else {
            Stylesheet::verbatim(&css)
        };
        rewrite(svg, &sheet, &self.options)
    }
}

/// First pass: concatenated text of every `<style>` element.
fn collect_style_text(svg: &str) -> Result<String, OptimizeError> {
    let mut reader = Reader::from_str(svg);
    let mut css = String::new();
    let mut in_style = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if is_style(&e) => in_style = true,
            Event::End(e) if e.local_name().as_ref() == b"style" => {
                in_style = false;
                css.push('\n');
            }
            Event::Text(e) if in_style => css.push_str(&String::from_utf8_lossy(&e)),
            Event::CData(e) if in_style => css.push_str(&String::from_utf8_lossy(&e)),
            Event::GeneralRef(e) if in_style => {
                css.push_str(decode_entity(&String::from_utf8_lossy(&e)));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(css)
}

fn decode_entity(name: &str) -> &str {
    match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "quot" => "\"",
        "apos" => "'",
        _ => "",
    }
}

/// Second pass: rewrite elements, replacing `<style>` with what could not be
/// inlined.
fn rewrite(
    svg: &str,
    sheet: &Stylesheet<'_>,
    options: &OptimizeOptions,
) -> Result<String, OptimizeError> {
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Vec::with_capacity(svg.len()));
    let mut tree = Tree::new();
    let mut style_depth = 0usize;
    let mut residual_written = false;
    let mut saw_svg = false;

    loop {
        let event = reader.read_event()?;
        if style_depth > 0 {
            match event {
                Event::Start(_) => style_depth += 1,
                Event::End(_) => style_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }
        match event {
            Event::Start(e) if is_style(&e) => {
                style_depth = 1;
                write_residual(&mut writer, sheet, &mut residual_written)?;
            }
            Event::Empty(e) if is_style(&e) => {
                write_residual(&mut writer, sheet, &mut residual_written)?;
            }
            Event::Start(e) => {
                saw_svg |= e.local_name().as_ref() == b"svg";
                let (index, rewritten) = rewrite_element(&e, &mut tree, sheet, options)?;
                tree.open(index);
                write(&mut writer, Event::Start(rewritten))?;
            }
            Event::Empty(e) => {
                saw_svg |= e.local_name().as_ref() == b"svg";
                let (_, rewritten) = rewrite_element(&e, &mut tree, sheet, options)?;
                write(&mut writer, Event::Empty(rewritten))?;
            }
            Event::End(e) => {
                tree.close();
                write(&mut writer, Event::End(e))?;
            }
            Event::Decl(_) | Event::DocType(_) | Event::PI(_) | Event::Comment(_) => {}
            Event::Eof => break,
            other => write(&mut writer, other)?,
        }
    }

    if !saw_svg {
        return Err(OptimizeError::NotSvg);
    }
    let out = String::from_utf8(writer.into_inner())?;
    Ok(out.trim().to_string())
}

fn is_style(e: &BytesStart<'_>) -> bool {
    e.local_name().as_ref() == b"style"
}

/// Emit the rules that could not be inlined, once, where the first
/// `<style>` element was.
fn write_residual(
    writer: &mut Writer<Vec<u8>>,
    sheet: &Stylesheet<'_>,
    written: &mut bool,
) -> Result<(), OptimizeError> {
    if *written {
        return Ok(());
    }
    *written = true;
    if sheet.residual.is_empty() {
        return Ok(());
    }
    write(writer, Event::Start(BytesStart::new("style")))?;
    write(writer, Event::Text(BytesText::new(&sheet.residual)))?;
    write(writer, Event::End(BytesEnd::new("style")))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), OptimizeError> {
    writer
        .write_event(event)
        .map_err(|e| OptimizeError::Write(e.to_string()))
}

/// An element's attributes after stripping and style inlining.
fn rewrite_element(
    e: &BytesStart<'_>,
    tree: &mut Tree,
    sheet: &Stylesheet<'_>,
    options: &OptimizeOptions,
) -> Result<(usize, BytesStart<'static>), OptimizeError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

    let mut attrs: Vec<(String, String)> = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned(), Cow::into_owned);
        attrs.push((key, value));
    }

    let index = tree.push(local, attrs.clone());
    let mut declarations: Vec<Declaration> = sheet
        .matching(TreeElement { tree: &*tree, index })
        .into_iter()
        .flat_map(|rule| rule.declarations.iter().map(Declaration::from))
        .collect();
    if let Some(pos) = attrs.iter().position(|(k, _)| k == "style") {
        let (_, inline) = attrs.remove(pos);
        declarations.extend(
            DeclarationTokenizer::from(inline.as_str()).map(|decl| Declaration::from(&decl)),
        );
    }

    attrs.retain(|(key, _)| {
        let namespace = key == "xmlns" || key.starts_with("xmlns:");
        !(options.strip_namespaces && namespace || options.strip_ids && key == "id")
    });

    let mut remaining_style: Vec<Declaration> = Vec::new();
    for decl in declarations {
        let presentational = PRESENTATION_ATTRIBUTES.contains(&decl.property.as_str());
        if options.style_to_attributes && presentational && !decl.important {
            match attrs.iter_mut().find(|(k, _)| *k == decl.property) {
                Some((_, value)) => *value = decl.value,
                None => attrs.push((decl.property, decl.value)),
            }
        } else {
            remaining_style.retain(|d| d.property != decl.property);
            remaining_style.push(decl);
        }
    }
    if !remaining_style.is_empty() {
        let style = remaining_style
            .iter()
            .map(Declaration::to_css)
            .collect::<Vec<_>>()
            .join(";");
        attrs.push(("style".to_string(), style));
    }

    let mut out = BytesStart::new(name);
    for (key, value) in &attrs {
        out.push_attribute((key.as_str(), value.as_str()));
    }
    Ok((index, out))
}

// =============================================================================
// Stylesheet
// =============================================================================

/// An owned declaration, from a stylesheet rule or a `style` attribute.
#[derive(Debug, Clone, PartialEq)]
struct Declaration {
    property: String,
    value: String,
    important: bool,
}

impl Declaration {
    fn to_css(&self) -> String {
        if self.important {
            format!("{}:{}!important", self.property, self.value)
        } else {
            format!("{}:{}", self.property, self.value)
        }
    }
}

impl From<&simplecss::Declaration<'_>> for Declaration {
    fn from(decl: &simplecss::Declaration<'_>) -> Self {
        Self {
            property: decl.name.to_ascii_lowercase(),
            value: decl.value.to_string(),
            important: decl.important,
        }
    }
}

/// The `<style>` text split into rules that can be inlined and the text that
/// has to stay behind.
struct Stylesheet<'css> {
    rules: Vec<simplecss::Rule<'css>>,
    residual: String,
}

impl<'css> Stylesheet<'css> {
    /// Keep every rule verbatim in `<style>`, inline nothing.
    fn verbatim(css: &str) -> Self {
        Self {
            rules: Vec::new(),
            residual: css.trim().to_string(),
        }
    }

    /// Rules are inlined when their selector can be decided without a
    /// browser and none of their declarations is `!important`. The
    /// `<style>` element only goes away when that holds for the whole text:
    /// any at-rule, runtime pseudo-class, `!important` or rule the parser
    /// skipped keeps the original text in place.
    fn parse(css: &'css str) -> Self {
        let sheet = simplecss::StyleSheet::parse(css);
        let blocks = css.matches('{').count();
        let parsed = sheet.rules.len();

        let (rules, deferred): (Vec<_>, Vec<_>) = sheet.rules.into_iter().partition(|rule| {
            is_static(&rule.selector) && !rule.declarations.iter().any(|d| d.important)
        });

        let unrecognized = parsed == 0 && !css.trim().is_empty();
        if unrecognized {
            tracing::warn!("No CSS rules recognized in <style>, keeping it as-is");
        }
        let complete =
            !unrecognized && deferred.is_empty() && !css.contains('@') && parsed >= blocks;
        let residual = if complete {
            String::new()
        } else {
            css.trim().to_string()
        };
        Self { rules, residual }
    }

    /// Rules matching `element`, weakest first.
    fn matching(&self, element: TreeElement<'_>) -> Vec<&simplecss::Rule<'css>> {
        let mut matched: Vec<(usize, &simplecss::Rule<'css>)> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.selector.matches(&element))
            .collect();
        matched.sort_by_key(|(order, rule)| (rule.selector.specificity(), *order));
        matched.into_iter().map(|(_, rule)| rule).collect()
    }
}

/// Whether matching `selector` needs no runtime state (`:hover`, `:focus`,
/// `:lang()` and friends).
fn is_static(selector: &simplecss::Selector<'_>) -> bool {
    let runtime = Cell::new(false);
    selector.matches(&AnyElement { runtime: &runtime });
    !runtime.get()
}

/// Matches every compound, so matching visits each pseudo-class of a
/// selector and flags the ones only a browser can answer.
#[derive(Clone, Copy)]
struct AnyElement<'f> {
    runtime: &'f Cell<bool>,
}

impl Element for AnyElement<'_> {
    fn parent_element(&self) -> Option<Self> {
        Some(*self)
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        Some(*self)
    }

    fn has_local_name(&self, _name: &str) -> bool {
        true
    }

    fn attribute_matches(&self, _local_name: &str, _operator: AttributeOperator<'_>) -> bool {
        true
    }

    fn pseudo_class_matches(&self, class: PseudoClass<'_>) -> bool {
        if !matches!(class, PseudoClass::FirstChild) {
            self.runtime.set(true);
        }
        true
    }
}

// =============================================================================
// Document tree
// =============================================================================

/// Every element seen so far, linked to its parent and previous sibling, so
/// descendant, child and sibling selectors can walk back up the document.
struct Tree {
    nodes: Vec<TreeNode>,
    open: Vec<usize>,
    /// Last child seen per open element, plus one slot for the document.
    last_child: Vec<Option<usize>>,
}

struct TreeNode {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<usize>,
    prev_sibling: Option<usize>,
}

impl Tree {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            open: Vec::new(),
            last_child: vec![None],
        }
    }

    fn push(&mut self, tag: String, attrs: Vec<(String, String)>) -> usize {
        let index = self.nodes.len();
        let prev_sibling = self.last_child.last_mut().and_then(|slot| slot.replace(index));
        self.nodes.push(TreeNode {
            tag,
            attrs,
            parent: self.open.last().copied(),
            prev_sibling,
        });
        index
    }

    fn open(&mut self, index: usize) {
        self.open.push(index);
        self.last_child.push(None);
    }

    fn close(&mut self) {
        if self.open.pop().is_some() {
            self.last_child.pop();
        }
    }
}

#[derive(Clone, Copy)]
struct TreeElement<'t> {
    tree: &'t Tree,
    index: usize,
}

impl<'t> TreeElement<'t> {
    fn node(&self) -> &'t TreeNode {
        &self.tree.nodes[self.index]
    }

    fn at(&self, index: Option<usize>) -> Option<Self> {
        index.map(|index| TreeElement {
            tree: self.tree,
            index,
        })
    }
}

impl Element for TreeElement<'_> {
    fn parent_element(&self) -> Option<Self> {
        self.at(self.node().parent)
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.at(self.node().prev_sibling)
    }

    fn has_local_name(&self, name: &str) -> bool {
        self.node().tag == name
    }

    fn attribute_matches(&self, local_name: &str, operator: AttributeOperator<'_>) -> bool {
        self.node()
            .attrs
            .iter()
            .find(|(key, _)| key == local_name)
            .is_some_and(|(_, value)| operator.matches(value))
    }

    fn pseudo_class_matches(&self, class: PseudoClass<'_>) -> bool {
        matches!(class, PseudoClass::FirstChild) && self.node().prev_sibling.is_none()
    }
}

// =============================================================================
// Plugin
// =============================================================================

/// Creates an `InlineSvg` child for every `.svg` file node.
pub struct InlineSvgPlugin {
    loader: Arc<dyn ContentLoader>,
    optimizer: Arc<dyn SvgOptimizer>,
}

impl InlineSvgPlugin {
    pub fn new(loader: Arc<dyn ContentLoader>, optimizer: Arc<dyn SvgOptimizer>) -> Self {
        Self { loader, optimizer }
    }

    fn resolve(&self, node: &ContentNode) -> Option<ContentNode> {
        let bytes = match self.loader.load(node) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(node = %node.id, error = %e, "Failed to load SVG");
                return None;
            }
        };
        let Ok(markup) = String::from_utf8(bytes) else {
            tracing::warn!(node = %node.id, "SVG is not valid UTF-8, skipping");
            return None;
        };
        if markup.trim().is_empty() {
            tracing::warn!(node = %node.id, "SVG is empty, skipping");
            return None;
        }
        let _span = tracing::warn_span!("inline_svg", node = %node.id).entered();
        let optimized = match self.optimizer.optimize(&markup) {
            Ok(svg) => svg,
            Err(e) => {
                tracing::error!(node = %node.id, error = %e, "Failed to optimize SVG");
                return None;
            }
        };

        let digest = text_digest(&optimized);
        let mut payload = Map::new();
        payload.insert("svg".into(), Value::String(optimized));
        Some(
            ContentNode::new(
                NodeId::derived(&node.id, "svg", "inline"),
                INLINE_SVG_TYPE,
                payload,
                digest,
            )
            .with_parent(node.id.clone())
            .with_media_type("image/svg+xml"),
        )
    }
}

impl Plugin for InlineSvgPlugin {
    fn name(&self) -> &'static str {
        "inline-svg"
    }

    fn on_create_node(&self, node: &ContentNode, _ctx: &NodeContext<'_>, actions: &mut Actions) {
        if !node.is_file() || node.get_str("extension") != Some("svg") {
            return;
        }
        if let Some(inline) = self.resolve(node) {
            actions.create_node(inline);
        }
    }
}
