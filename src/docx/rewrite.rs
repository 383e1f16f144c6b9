use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use super::linearize::{linearize, plain_text};
use super::{
    DOCUMENT_PART, DOCUMENT_RELS_PART, Edit, REL_NS, WmlNames, apply_edits, escape_text,
    escape_xml, find_all, is_wml, parse_relationships, resolve_target, wml, wml_children,
};
use crate::error::Error;
use crate::markers::MarkerLexer;
use crate::model::{BreakKind, Format, FormatSet, Formatted, Options, Segment, SegmentKind};
use crate::package;
use crate::rebuild::rebuild;

/// Apply text markers in the main document part and in every header and
/// footer part it references.
pub(crate) fn rewrite_package(
    input: &[u8],
    options: &Options,
    lexer: &MarkerLexer,
) -> Result<Formatted, Error> {
    let mut archive = package::open(input)?;

    let document_xml = package::read_text(&mut archive, DOCUMENT_PART)?.ok_or_else(|| {
        Error::InvalidDocx("missing word/document.xml (is this a DOCX file?)".into())
    })?;
    let document = roxmltree::Document::parse(&document_xml)?;

    let rels_xml = package::read_text(&mut archive, DOCUMENT_RELS_PART)?.unwrap_or_default();
    let header_footer = if rels_xml.is_empty() {
        Vec::new()
    } else {
        header_footer_parts(&document, &roxmltree::Document::parse(&rels_xml)?)
    };

    let mut replaced: HashMap<String, Vec<u8>> = HashMap::new();
    let mut modified = 0;

    if let Some((xml, count)) = rewrite_part(&document_xml, &document, options, lexer) {
        log::debug!("{DOCUMENT_PART}: {count} paragraph(s) rewritten");
        modified += count;
        replaced.insert(DOCUMENT_PART.to_string(), xml.into_bytes());
    }

    for name in header_footer {
        let Some(part_xml) = package::read_text(&mut archive, &name)? else {
            log::warn!("Header/footer part {name} is referenced but missing");
            continue;
        };
        let part = roxmltree::Document::parse(&part_xml)?;
        if let Some((xml, count)) = rewrite_part(&part_xml, &part, options, lexer) {
            log::debug!("{name}: {count} paragraph(s) rewritten");
            modified += count;
            replaced.insert(name, xml.into_bytes());
        }
    }

    if replaced.is_empty() {
        return Ok(Formatted {
            bytes: input.to_vec(),
            containers_modified: 0,
        });
    }
    let bytes = package::repack(&mut archive, &replaced, &[])?;
    Ok(Formatted {
        bytes,
        containers_modified: modified,
    })
}

/// Header and footer parts referenced from any section, in first-seen order.
pub(super) fn header_footer_parts(
    document: &roxmltree::Document,
    rels: &roxmltree::Document,
) -> Vec<String> {
    let rels = parse_relationships(rels);
    let mut parts = Vec::new();
    for sect in find_all(document.root_element(), |n| is_wml(n, "sectPr")) {
        let references = sect
            .children()
            .filter(|n| is_wml(*n, "headerReference") || is_wml(*n, "footerReference"));
        for reference in references {
            let Some(id) = reference.attribute((REL_NS, "id")) else {
                continue;
            };
            let Some(rel) = rels.iter().find(|r| r.id == id && !r.external) else {
                continue;
            };
            if !(rel.rel_type.ends_with("/header") || rel.rel_type.ends_with("/footer")) {
                continue;
            }
            let part = resolve_target("word", &rel.target);
            if !parts.contains(&part) {
                parts.push(part);
            }
        }
    }
    parts
}

/// Paragraphs to scan, each once: block-level paragraphs, table-cell
/// paragraphs (nested tables included), then every paragraph inside a content
/// control anywhere in the part.
fn containers<'a>(root: roxmltree::Node<'a, 'a>) -> Vec<roxmltree::Node<'a, 'a>> {
    let block_parent = wml(root, "body").unwrap_or(root);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |p: roxmltree::Node<'a, 'a>| {
        if seen.insert(p.id()) {
            out.push(p);
        }
    };

    for child in block_parent.children() {
        if is_wml(child, "p") {
            push(child);
        } else if is_wml(child, "tbl") {
            table_paragraphs(child).into_iter().for_each(&mut push);
        }
    }

    // Content controls are not reached by the block walk above.
    for sdt in find_all(root, |n| is_wml(n, "sdt")) {
        if let Some(content) = wml(sdt, "sdtContent") {
            find_all(content, |n| is_wml(n, "p"))
                .into_iter()
                .for_each(&mut push);
        }
    }
    out
}

fn table_paragraphs<'a>(table: roxmltree::Node<'a, 'a>) -> Vec<roxmltree::Node<'a, 'a>> {
    let mut paragraphs = Vec::new();
    for row in wml_children(table, "tr") {
        for cell in wml_children(row, "tc") {
            for child in cell.children() {
                if is_wml(child, "p") {
                    paragraphs.push(child);
                } else if is_wml(child, "tbl") {
                    paragraphs.extend(table_paragraphs(child));
                }
            }
        }
    }
    paragraphs
}

/// Rewrite every marker-bearing paragraph of one part. `None` when nothing
/// in the part carries a marker.
///
/// A paragraph nested inside a run that an enclosing paragraph already
/// replaces (e.g. a text box) is skipped and not counted.
fn rewrite_part(
    src: &str,
    doc: &roxmltree::Document,
    options: &Options,
    lexer: &MarkerLexer,
) -> Option<(String, usize)> {
    let root = doc.root_element();
    let names = WmlNames::for_part(root);
    let mut rewritten: Vec<Vec<Edit>> = containers(root)
        .into_iter()
        .filter_map(|paragraph| rewrite_paragraph(paragraph, &names, options, lexer))
        .collect();
    rewritten.sort_by_key(|paragraph_edits| paragraph_edits[0].range.start);

    let mut edits: Vec<Edit> = Vec::new();
    let mut count = 0;
    for paragraph_edits in rewritten {
        let overlaps = paragraph_edits.iter().any(|e| {
            edits
                .iter()
                .any(|a| e.range.start < a.range.end && a.range.start < e.range.end)
        });
        if overlaps {
            log::debug!(
                "Skipping paragraph at {} inside a rewritten run",
                paragraph_edits[0].range.start
            );
            continue;
        }
        edits.extend(paragraph_edits);
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some((apply_edits(src, edits), count))
}

/// Replace the paragraph's runs with freshly formatted ones. The new runs take
/// the place of the first old run; other paragraph children keep their spot.
fn rewrite_paragraph(
    paragraph: roxmltree::Node,
    names: &WmlNames,
    options: &Options,
    lexer: &MarkerLexer,
) -> Option<Vec<Edit>> {
    let events = linearize(paragraph);
    if !lexer.contains_marker(&plain_text(&events)) {
        return None;
    }
    let runs: Vec<_> = wml_children(paragraph, "r").collect();
    let (first, rest) = runs.split_first()?;

    let mut xml = String::new();
    for segment in rebuild(&events, lexer) {
        write_run(&mut xml, &segment, names, options);
    }

    let mut edits = vec![Edit::replace(first.range(), xml)];
    edits.extend(rest.iter().map(|r| Edit::delete(r.range())));
    Some(edits)
}

fn write_run(out: &mut String, segment: &Segment, names: &WmlNames, options: &Options) {
    let w = &names.p;
    let _ = write!(out, "<{w}r{}>", names.decl);
    write_run_properties(out, segment.formats, w, options);
    match &segment.kind {
        SegmentKind::Text(text) => {
            for (i, piece) in text.split('\t').enumerate() {
                if i > 0 {
                    let _ = write!(out, "<{w}tab/>");
                }
                if piece.is_empty() {
                    continue;
                }
                let space = if piece.starts_with(char::is_whitespace)
                    || piece.ends_with(char::is_whitespace)
                {
                    r#" xml:space="preserve""#
                } else {
                    ""
                };
                let _ = write!(out, "<{w}t{space}>{}</{w}t>", escape_text(piece));
            }
        }
        SegmentKind::Break(BreakKind::Line) => {
            let _ = write!(out, "<{w}br/>");
        }
        SegmentKind::Break(BreakKind::Page) => {
            let _ = write!(out, r#"<{w}br {w}type="page"/>"#);
        }
        SegmentKind::Break(BreakKind::Column) => {
            let _ = write!(out, r#"<{w}br {w}type="column"/>"#);
        }
    }
    let _ = write!(out, "</{w}r>");
}

/// `w:rPr` for the active formats, children in schema order (b before highlight).
fn write_run_properties(out: &mut String, formats: FormatSet, w: &str, options: &Options) {
    if formats.is_empty() {
        return;
    }
    let _ = write!(out, "<{w}rPr>");
    if formats.contains(Format::Bold) {
        let _ = write!(out, "<{w}b/>");
    }
    if formats.contains(Format::Highlight) {
        let _ = write!(
            out,
            r#"<{w}highlight {w}val="{}"/>"#,
            escape_xml(&options.highlight_color)
        );
    }
    let _ = write!(out, "</{w}rPr>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::lexer;

    const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

    fn rewrite(body: &str) -> Option<(String, usize)> {
        let src = format!("<w:document {W}><w:body>{body}</w:body></w:document>");
        let doc = roxmltree::Document::parse(&src).unwrap();
        rewrite_part(&src, &doc, &Options::default(), lexer())
            .map(|(xml, n)| (xml[src.find("<w:body>").unwrap()..].to_string(), n))
    }

    #[test]
    fn replaces_runs_and_keeps_paragraph_properties() {
        let (xml, n) = rewrite(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>a {{BOLD_START}}b</w:t></w:r><w:r><w:t>{{BOLD_END}}</w:t></w:r></w:p>"#,
        )
        .unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            xml,
            r#"<w:body><w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t xml:space="preserve">a </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>b</w:t></w:r></w:p></w:body></w:document>"#
        );
    }

    #[test]
    fn untouched_without_markers() {
        assert!(rewrite("<w:p><w:r><w:t>{{IMAGE:x}} plain</w:t></w:r></w:p>").is_none());
    }

    #[test]
    fn breaks_and_tabs_are_rebuilt() {
        let (xml, _) = rewrite(
            r#"<w:p><w:r><w:t>{{HIGHLIGHT_START}}a</w:t><w:tab/><w:t>b</w:t><w:br w:type="page"/><w:t>c{{HIGHLIGHT_END}}</w:t></w:r></w:p>"#,
        )
        .unwrap();
        let hl = r#"<w:rPr><w:highlight w:val="yellow"/></w:rPr>"#;
        assert_eq!(
            xml,
            format!(
                r#"<w:body><w:p><w:r>{hl}<w:t>a</w:t><w:tab/><w:t>b</w:t></w:r><w:r>{hl}<w:br w:type="page"/></w:r><w:r>{hl}<w:t>c</w:t></w:r></w:p></w:body></w:document>"#
            )
        );
    }

    #[test]
    fn nested_table_and_content_control_paragraphs_counted_once() {
        let (xml, n) = rewrite(
            "<w:tbl><w:tr><w:tc><w:tbl><w:tr><w:tc>\
             <w:p><w:r><w:t>{{BOLD_START}}t{{BOLD_END}}</w:t></w:r></w:p>\
             </w:tc></w:tr></w:tbl></w:tc></w:tr></w:tbl>\
             <w:sdt><w:sdtContent><w:tbl><w:tr><w:tc>\
             <w:p><w:r><w:t>{{BOLD_START}}s{{BOLD_END}}</w:t></w:r></w:p>\
             </w:tc></w:tr></w:tbl></w:sdtContent></w:sdt>",
        )
        .unwrap();
        assert_eq!(n, 2);
        assert!(!xml.contains("{{"));
    }

    #[test]
    fn text_box_paragraph_inside_rewritten_run_is_not_counted() {
        let (xml, n) = rewrite(
            "<w:p><w:r><w:t>{{BOLD_START}}outer{{BOLD_END}}</w:t></w:r>\
             <w:r><w:pict><w:txbxContent><w:sdt><w:sdtContent>\
             <w:p><w:r><w:t>{{BOLD_START}}inner{{BOLD_END}}</w:t></w:r></w:p>\
             </w:sdtContent></w:sdt></w:txbxContent></w:pict></w:r></w:p>",
        )
        .unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            xml,
            r#"<w:body><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>outer</w:t></w:r></w:p></w:body></w:document>"#
        );
    }

    #[test]
    fn text_box_paragraph_is_rewritten_when_its_host_is_not() {
        let (xml, n) = rewrite(
            "<w:p><w:r><w:t>plain</w:t></w:r>\
             <w:r><w:pict><w:txbxContent><w:sdt><w:sdtContent>\
             <w:p><w:r><w:t>{{BOLD_START}}inner{{BOLD_END}}</w:t></w:r></w:p>\
             </w:sdtContent></w:sdt></w:txbxContent></w:pict></w:r></w:p>",
        )
        .unwrap();
        assert_eq!(n, 1);
        assert!(xml.contains("<w:r><w:rPr><w:b/></w:rPr><w:t>inner</w:t></w:r>"));
        assert!(xml.contains("<w:t>plain</w:t>"));
    }

    #[test]
    fn default_namespace_parts_get_prefixed_runs() {
        let src = r#"<document xmlns="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><body><p><r><t>{{BOLD_START}}x{{BOLD_END}}</t></r></p></body></document>"#;
        let doc = roxmltree::Document::parse(src).unwrap();
        let (xml, _) = rewrite_part(src, &doc, &Options::default(), lexer()).unwrap();
        assert!(xml.contains(r#"<w:r xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:rPr><w:b/></w:rPr><w:t>x</w:t></w:r>"#));
        roxmltree::Document::parse(&xml).unwrap();
    }
}
