#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// Builder for small DOCX packages written entirely in memory.
pub struct DocxBuilder {
    body: String,
    rels: Vec<(String, String, String)>,
    parts: Vec<(String, Vec<u8>)>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self {
            body: String::new(),
            rels: vec![(
                "rId1".into(),
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles".into(),
                "styles.xml".into(),
            )],
            parts: vec![(
                "word/styles.xml".into(),
                format!(r#"<w:styles xmlns:w="{W_NS}"/>"#).into_bytes(),
            )],
        }
    }

    /// Append raw body XML (paragraphs, tables, content controls, sectPr).
    pub fn body(mut self, xml: &str) -> Self {
        self.body.push_str(xml);
        self
    }

    pub fn paragraph(self, text: &str) -> Self {
        let xml = format!(
            r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            escape(text)
        );
        self.body(&xml)
    }

    pub fn relationship(mut self, id: &str, rel_type: &str, target: &str) -> Self {
        self.rels.push((id.into(), rel_type.into(), target.into()));
        self
    }

    pub fn part(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.parts.push((name.into(), data.into()));
        self
    }

    /// Header part `word/<file>` wired to the body's sectPr via `id`.
    pub fn header(self, id: &str, file: &str, paragraphs_xml: &str) -> Self {
        let xml = format!(r#"<w:hdr xmlns:w="{W_NS}" xmlns:r="{R_NS}">{paragraphs_xml}</w:hdr>"#);
        self.relationship(
            id,
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header",
            file,
        )
        .part(&format!("word/{file}"), xml)
    }

    pub fn footer(self, id: &str, file: &str, paragraphs_xml: &str) -> Self {
        let xml = format!(r#"<w:ftr xmlns:w="{W_NS}" xmlns:r="{R_NS}">{paragraphs_xml}</w:ftr>"#);
        self.relationship(
            id,
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer",
            file,
        )
        .part(&format!("word/{file}"), xml)
    }

    pub fn document_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"><w:body>{}</w:body></w:document>"#,
            self.body
        )
    }

    pub fn build(self) -> Vec<u8> {
        let rels: String = self
            .rels
            .iter()
            .map(|(id, t, target)| format!(r#"<Relationship Id="{id}" Type="{t}" Target="{target}"/>"#))
            .collect();
        let document_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        );

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let mut write = |name: &str, data: &[u8]| {
            writer.start_file(name, options).unwrap();
            writer.write_all(data).unwrap();
        };
        write("[Content_Types].xml", CONTENT_TYPES.as_bytes());
        write("_rels/.rels", PACKAGE_RELS.as_bytes());
        write("word/document.xml", self.document_xml().as_bytes());
        write("word/_rels/document.xml.rels", document_rels.as_bytes());
        for (name, data) in &self.parts {
            write(name, data);
        }
        writer.finish().unwrap().into_inner()
    }
}

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn read_part(docx: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(docx)).unwrap();
    let mut file = archive.by_name(name).ok()?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).unwrap();
    Some(data)
}

pub fn read_text(docx: &[u8], name: &str) -> String {
    String::from_utf8(read_part(docx, name).unwrap_or_else(|| panic!("missing part {name}")))
        .unwrap()
}

pub fn entry_names(docx: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(docx)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Text and formatting of one rebuilt `w:r`.
#[derive(Debug, PartialEq)]
pub struct RunInfo {
    pub text: String,
    pub bold: bool,
    pub highlight: Option<String>,
    pub is_break: bool,
}

fn is_w(node: roxmltree::Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(W_NS)
}

fn run_info(run: roxmltree::Node) -> RunInfo {
    let rpr = run.children().find(|n| is_w(*n, "rPr"));
    let bold = rpr.is_some_and(|p| p.children().any(|n| is_w(n, "b")));
    let highlight = rpr
        .and_then(|p| p.children().find(|n| is_w(*n, "highlight")))
        .and_then(|h| h.attribute((W_NS, "val")))
        .map(str::to_string);
    let mut text = String::new();
    let mut is_break = false;
    for child in run.children() {
        if is_w(child, "t") {
            text.push_str(child.text().unwrap_or(""));
        } else if is_w(child, "tab") {
            text.push('\t');
        } else if is_w(child, "br") {
            is_break = true;
        }
    }
    RunInfo {
        text,
        bold,
        highlight,
        is_break,
    }
}

/// Runs of every paragraph in `part_xml`, in document order.
pub fn paragraph_runs(part_xml: &str) -> Vec<Vec<RunInfo>> {
    let doc = roxmltree::Document::parse(part_xml).unwrap();
    doc.descendants()
        .filter(|n| is_w(*n, "p"))
        .map(|p| p.children().filter(|n| is_w(*n, "r")).map(run_info).collect())
        .collect()
}

/// Visible text of every paragraph (direct runs only), in document order.
pub fn paragraph_texts(part_xml: &str) -> Vec<String> {
    paragraph_runs(part_xml)
        .iter()
        .map(|runs| runs.iter().map(|r| r.text.as_str()).collect())
        .collect()
}

pub fn png_1x1() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(1, 1, image::Rgb([255, 0, 0]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
