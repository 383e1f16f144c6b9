mod images;
mod linearize;
mod rewrite;

use std::ops::Range;

pub(crate) use images::inject;
pub(crate) use rewrite::rewrite_package;

pub(super) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(super) const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(super) const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
pub(super) const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

pub(crate) const DOCUMENT_PART: &str = "word/document.xml";
pub(crate) const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

pub(super) fn is_wml(node: roxmltree::Node, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(WML_NS)
}

pub(super) fn wml<'a>(node: roxmltree::Node<'a, 'a>, name: &str) -> Option<roxmltree::Node<'a, 'a>> {
    node.children().find(|n| is_wml(*n, name))
}

pub(super) fn wml_children<'a>(
    node: roxmltree::Node<'a, 'a>,
    name: &'a str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'a>> + 'a {
    node.children().filter(move |n| is_wml(*n, name))
}

/// Depth-first search for every element matching `pred`, in document order.
/// Matching nodes are still descended into, so nested matches are returned too.
pub(super) fn find_all<'a>(
    root: roxmltree::Node<'a, 'a>,
    pred: impl Fn(roxmltree::Node<'a, 'a>) -> bool,
) -> Vec<roxmltree::Node<'a, 'a>> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_element() && pred(node) {
            found.push(node);
        }
        let children: Vec<_> = node.children().filter(|c| c.is_element()).collect();
        stack.extend(children.into_iter().rev());
    }
    found
}

/// Prefix (with trailing colon) bound to `ns` in scope at `node`; empty for a
/// default namespace or when `ns` is not declared.
pub(super) fn prefix_for(node: roxmltree::Node, ns: &str) -> String {
    match node.lookup_prefix(ns) {
        Some(p) if !p.is_empty() => format!("{p}:"),
        _ => String::new(),
    }
}

/// How generated WordprocessingML markup names its elements inside a part.
pub(super) struct WmlNames {
    /// `"w:"` or whatever prefix the part binds.
    pub p: String,
    /// Declaration put on each generated run when the part binds WML as the
    /// default namespace (attributes cannot use a default namespace).
    pub decl: String,
}

impl WmlNames {
    pub fn for_part(root: roxmltree::Node) -> Self {
        let p = prefix_for(root, WML_NS);
        if p.is_empty() {
            Self {
                p: "w:".to_string(),
                decl: format!(r#" xmlns:w="{WML_NS}""#),
            }
        } else {
            Self {
                p,
                decl: String::new(),
            }
        }
    }
}

pub(super) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub(super) fn escape_xml(s: &str) -> String {
    escape_text(s).replace('"', "&quot;").replace('\'', "&apos;")
}

pub(super) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

pub(super) fn parse_relationships(xml: &roxmltree::Document) -> Vec<Relationship> {
    xml.root_element()
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .filter_map(|n| {
            Some(Relationship {
                id: n.attribute("Id")?.to_string(),
                rel_type: n.attribute("Type").unwrap_or("").to_string(),
                target: n.attribute("Target")?.to_string(),
                external: n.attribute("TargetMode") == Some("External"),
            })
        })
        .collect()
}

/// Resolve a relationship target against the directory of its source part,
/// e.g. ("word", "header1.xml") -> "word/header1.xml".
pub(super) fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(seg),
        }
    }
    segments.join("/")
}

/// A byte-range replacement against the source text a part was parsed from.
#[derive(Clone, Debug, PartialEq)]
pub(super) struct Edit {
    pub range: Range<usize>,
    pub text: String,
}

impl Edit {
    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at..at, text)
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self::replace(range, String::new())
    }
}

/// Apply edits to `src`. Insertions at the same offset keep their given order.
/// An edit overlapping an earlier one (e.g. a text-box paragraph inside a run
/// that is already being replaced) is dropped.
pub(super) fn apply_edits(src: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.range.start, e.range.end));
    let mut out = String::with_capacity(src.len() + edits.iter().map(|e| e.text.len()).sum::<usize>());
    let mut pos = 0;
    for edit in edits {
        if edit.range.start < pos {
            log::warn!(
                "Skipping overlapping edit at {}..{}",
                edit.range.start,
                edit.range.end
            );
            continue;
        }
        out.push_str(&src[pos..edit.range.start]);
        out.push_str(&edit.text);
        pos = edit.range.end;
    }
    out.push_str(&src[pos..]);
    out
}

/// Edit that appends `children` as the last content of `element`, expanding a
/// self-closing tag when needed.
pub(super) fn append_children(src: &str, element: roxmltree::Node, children: &str) -> Edit {
    let range = element.range();
    let source = &src[range.clone()];
    if !element.has_children() && source.ends_with("/>") {
        let name_end = source
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .unwrap_or(source.len());
        let name = &source[1..name_end];
        let open = source[..source.len() - 2].trim_end();
        return Edit::replace(range, format!("{open}>{children}</{name}>"));
    }
    let close = source.rfind("</").map_or(range.end, |i| range.start + i);
    Edit::insert(close, children)
}
