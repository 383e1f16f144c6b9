use super::{WML_NS, is_wml};
use crate::model::{BreakKind, ContentEvent};

/// Subtrees inside a run that never contribute paragraph text.
const OPAQUE: [&str; 7] = [
    "rPr",
    "drawing",
    "pict",
    "object",
    "delText",
    "instrText",
    "footnoteReference",
];

/// Flatten the direct `w:r` children of a paragraph into text and break
/// events, in document order. Adjacent text is merged.
pub fn linearize(paragraph: roxmltree::Node) -> Vec<ContentEvent> {
    let mut events = Vec::new();
    for run in paragraph.children().filter(|n| is_wml(*n, "r")) {
        walk(run, &mut events);
    }
    events
}

fn walk(node: roxmltree::Node, events: &mut Vec<ContentEvent>) {
    for child in node.children().filter(|n| n.is_element()) {
        // mc:AlternateContent and other foreign wrappers hold drawings, not text
        if child.tag_name().namespace() != Some(WML_NS) {
            continue;
        }
        match child.tag_name().name() {
            "t" => push_text(events, child.text().unwrap_or("")),
            "tab" => push_text(events, "\t"),
            "br" => events.push(ContentEvent::Break(
                match child.attribute((WML_NS, "type")) {
                    Some("page") => BreakKind::Page,
                    Some("column") => BreakKind::Column,
                    _ => BreakKind::Line,
                },
            )),
            "cr" => events.push(ContentEvent::Break(BreakKind::Line)),
            name if OPAQUE.contains(&name) => {}
            _ => walk(child, events),
        }
    }
}

fn push_text(events: &mut Vec<ContentEvent>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(ContentEvent::Text(last)) = events.last_mut() {
        last.push_str(text);
    } else {
        events.push(ContentEvent::Text(text.to_string()));
    }
}

/// Concatenated text of a paragraph's runs, breaks rendered as `\n`.
pub(super) fn plain_text(events: &[ContentEvent]) -> String {
    events
        .iter()
        .map(|e| match e {
            ContentEvent::Text(t) => t.as_str(),
            ContentEvent::Break(_) => "\n",
        })
        .collect()
}
