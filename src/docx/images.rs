use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use base64::Engine;

use super::rewrite::header_footer_parts;
use super::{
    CONTENT_TYPES_PART, DOCUMENT_PART, DOCUMENT_RELS_PART, Edit, PKG_REL_NS, REL_NS, WPD_NS,
    WmlNames, append_children, apply_edits, escape_text, escape_xml, find_all, is_wml,
    parse_relationships, prefix_for,
};
use crate::error::Error;
use crate::model::{ImageData, ImageSpec, ImageWarning, Injected};
use crate::package::{self, Scratch};

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const CT_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

const MEDIA_DIR: &str = "word/media";

/// 1 px at 96 dpi.
const EMU_PER_PIXEL: u64 = 9525;

fn content_type(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        "emf" => Some("image/x-emf"),
        "wmf" => Some("image/x-wmf"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

struct DecodedImage {
    data: Vec<u8>,
    extension: String,
}

fn decode(spec: &ImageSpec) -> Result<DecodedImage, Error> {
    let invalid = |reason: String| Error::InvalidImage {
        marker: spec.marker.clone(),
        reason,
    };

    let data = match &spec.data {
        ImageData::Bytes(bytes) => bytes.clone(),
        ImageData::Base64(encoded) => {
            let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| invalid(format!("bad base64 payload: {e}")))?
        }
    };
    if data.is_empty() {
        return Err(invalid("empty payload".into()));
    }

    let extension = spec.format.trim().trim_start_matches('.').to_ascii_lowercase();
    if content_type(&extension).is_none() {
        return Err(invalid(format!("unsupported image format {:?}", spec.format)));
    }

    if let Ok(sniffed) = image::guess_format(&data)
        && !sniffed.extensions_str().contains(&extension.as_str())
    {
        log::warn!(
            "Image for marker {} is declared as {extension} but looks like {sniffed:?}",
            spec.marker
        );
    }

    Ok(DecodedImage { data, extension })
}

/// Next free numbers for one injection pass. Each starts above the highest
/// value already present in the package; a counter that reaches its maximum
/// wraps to 1 and skips values already taken.
struct Counters {
    rel_id: u64,
    image: u64,
    drawing_id: u32,
    taken_rel_ids: HashSet<String>,
    taken_media: HashSet<String>,
    taken_drawing_ids: HashSet<u32>,
}

impl Counters {
    /// `parts` are the main document and every header/footer part; drawing
    /// ids must be unique across all of them.
    fn scan(rels: &roxmltree::Document, media: &[String], parts: &[roxmltree::Document]) -> Self {
        let taken_rel_ids: HashSet<String> =
            parse_relationships(rels).into_iter().map(|r| r.id).collect();
        let max_rel = taken_rel_ids
            .iter()
            .filter_map(|id| id.strip_prefix("rId")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let max_image = media.iter().filter_map(|name| media_number(name)).max().unwrap_or(0);
        let taken_drawing_ids: HashSet<u32> = parts
            .iter()
            .flat_map(|part| {
                find_all(part.root_element(), |n| {
                    n.tag_name().name() == "docPr" && n.tag_name().namespace() == Some(WPD_NS)
                })
            })
            .filter_map(|n| n.attribute("id")?.parse::<u32>().ok())
            .collect();
        let max_drawing = taken_drawing_ids.iter().copied().max().unwrap_or(0);
        Self {
            rel_id: max_rel.checked_add(1).unwrap_or(1),
            image: max_image.checked_add(1).unwrap_or(1),
            drawing_id: max_drawing.checked_add(1).unwrap_or(1),
            taken_rel_ids,
            taken_media: media.iter().cloned().collect(),
            taken_drawing_ids,
        }
    }

    fn next_rel_id(&mut self) -> String {
        loop {
            let id = format!("rId{}", self.rel_id);
            self.rel_id = self.rel_id.checked_add(1).unwrap_or(1);
            if self.taken_rel_ids.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Next unused media file name with the given extension.
    fn next_media_name(&mut self, extension: &str) -> String {
        loop {
            let name = format!("image{}.{extension}", self.image);
            self.image = self.image.checked_add(1).unwrap_or(1);
            if self.taken_media.insert(name.clone()) {
                return name;
            }
        }
    }

    fn next_drawing_id(&mut self) -> u32 {
        loop {
            let id = self.drawing_id;
            self.drawing_id = self.drawing_id.checked_add(1).unwrap_or(1);
            if self.taken_drawing_ids.insert(id) {
                return id;
            }
        }
    }
}

/// `image12.png` -> 12
fn media_number(file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix("image")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Embed each image at its `{{IMAGE:<marker>}}` placeholder.
///
/// Every descriptor is decoded before the archive is touched; one bad payload
/// fails the whole batch. A placeholder that does not occur in the document is
/// reported as a warning while its media file and relationship are still added.
pub(crate) fn inject(input: &[u8], images: &[ImageSpec]) -> Result<Injected, Error> {
    if images.is_empty() {
        return Ok(Injected {
            bytes: input.to_vec(),
            warnings: Vec::new(),
        });
    }
    let decoded = images.iter().map(decode).collect::<Result<Vec<_>, _>>()?;

    let mut archive = package::open(input)?;
    let scratch = Scratch::new()?;
    scratch.unpack(&mut archive)?;

    let missing = |name: &str| Error::InvalidDocx(format!("missing {name}"));
    let rels_xml = scratch
        .read_text(DOCUMENT_RELS_PART)?
        .ok_or_else(|| missing(DOCUMENT_RELS_PART))?;
    let mut document_xml = scratch
        .read_text(DOCUMENT_PART)?
        .ok_or_else(|| missing(DOCUMENT_PART))?;
    let content_types_xml = scratch
        .read_text(CONTENT_TYPES_PART)?
        .ok_or_else(|| missing(CONTENT_TYPES_PART))?;

    let rels = roxmltree::Document::parse(&rels_xml)?;
    let (mut counters, names) = {
        let document = roxmltree::Document::parse(&document_xml)?;
        let names = WmlNames::for_part(document.root_element());
        let mut part_texts = Vec::new();
        for name in header_footer_parts(&document, &rels) {
            if let Some(text) = scratch.read_text(&name)? {
                part_texts.push(text);
            }
        }
        let mut parts = vec![document];
        for text in &part_texts {
            parts.push(roxmltree::Document::parse(text)?);
        }
        let media = scratch.list(MEDIA_DIR)?;
        (Counters::scan(&rels, &media, &parts), names)
    };
    let rel_prefix = prefix_for(rels.root_element(), PKG_REL_NS);

    let mut new_rels = String::new();
    let mut added = Vec::new();
    let mut extensions: Vec<&str> = Vec::new();
    let mut warnings = Vec::new();

    for (spec, image) in images.iter().zip(&decoded) {
        let rel_id = counters.next_rel_id();
        let file_name = counters.next_media_name(&image.extension);
        let media_part = format!("{MEDIA_DIR}/{file_name}");
        scratch.write(&media_part, &image.data)?;
        added.push(media_part);
        if !extensions.contains(&image.extension.as_str()) {
            extensions.push(&image.extension);
        }

        let _ = write!(
            new_rels,
            r#"<{rel_prefix}Relationship Id="{rel_id}" Type="{IMAGE_REL_TYPE}" Target="media/{file_name}"/>"#
        );

        let run = image_run(&names, &rel_id, counters.next_drawing_id(), spec);
        let placeholder = spec.placeholder();
        match insert_after_placeholder(&document_xml, &placeholder, &run)? {
            Some(updated) => {
                log::debug!("Placed {file_name} ({rel_id}) at {placeholder}");
                document_xml = updated;
            }
            None => {
                log::warn!("Image marker {placeholder} not found; {file_name} is unreferenced");
                warnings.push(ImageWarning::MarkerNotFound {
                    marker: spec.marker.clone(),
                    rel_id,
                });
            }
        }
    }

    let rels_xml = apply_edits(
        &rels_xml,
        vec![append_children(&rels_xml, rels.root_element(), &new_rels)],
    );
    scratch.write(DOCUMENT_RELS_PART, rels_xml.as_bytes())?;
    scratch.write(DOCUMENT_PART, document_xml.as_bytes())?;

    let mut replaced_parts = vec![DOCUMENT_RELS_PART, DOCUMENT_PART];
    if let Some(content_types) = register_extensions(&content_types_xml, &extensions)? {
        scratch.write(CONTENT_TYPES_PART, content_types.as_bytes())?;
        replaced_parts.push(CONTENT_TYPES_PART);
    }

    let mut replaced = HashMap::new();
    for name in replaced_parts {
        replaced.insert(name.to_string(), scratch.read(name)?);
    }
    let added = added
        .into_iter()
        .map(|name| {
            let data = scratch.read(&name)?;
            Ok((name, data))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let bytes = package::repack(&mut archive, &replaced, &added)?;
    Ok(Injected { bytes, warnings })
}

/// Splice `run` in after the run holding the first `w:t` that contains
/// `placeholder`, and strip the placeholder from that text.
fn insert_after_placeholder(
    document_xml: &str,
    placeholder: &str,
    run: &str,
) -> Result<Option<String>, Error> {
    let doc = roxmltree::Document::parse(document_xml)?;
    for t in doc.descendants().filter(|n| is_wml(*n, "t")) {
        let Some(text_node) = t.first_child().filter(|c| c.is_text()) else {
            continue;
        };
        let text = text_node.text().unwrap_or("");
        if !text.contains(placeholder) {
            continue;
        }
        let Some(owner_run) = t.ancestors().skip(1).find(|n| is_wml(*n, "r")) else {
            continue;
        };
        if !owner_run.ancestors().skip(1).any(|n| is_wml(n, "p")) {
            continue;
        }

        let remaining = text.replace(placeholder, "");
        let mut edits = vec![
            Edit::replace(text_node.range(), escape_text(&remaining)),
            Edit::insert(owner_run.range().end, run),
        ];
        let needs_preserve = remaining.starts_with(char::is_whitespace)
            || remaining.ends_with(char::is_whitespace);
        if needs_preserve && t.attribute((roxmltree::NS_XML_URI, "space")).is_none() {
            let tag = &document_xml[t.range()];
            let name_len = tag[1..]
                .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                .unwrap_or(0);
            edits.push(Edit::insert(
                t.range().start + 1 + name_len,
                r#" xml:space="preserve""#,
            ));
        }
        return Ok(Some(apply_edits(document_xml, edits)));
    }
    Ok(None)
}

fn image_run(names: &WmlNames, rel_id: &str, drawing_id: u32, spec: &ImageSpec) -> String {
    let w = &names.p;
    let cx = u64::from(spec.width) * EMU_PER_PIXEL;
    let cy = u64::from(spec.height) * EMU_PER_PIXEL;
    let desc = escape_xml(&spec.description);
    format!(
        concat!(
            r#"<{w}r{decl}><{w}drawing>"#,
            r#"<wp:inline xmlns:wp="{wpd}" distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
            r#"<wp:docPr id="{id}" name="{desc}" descr="{desc}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="{dml}" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="{dml}"><a:graphicData uri="{pic}">"#,
            r#"<pic:pic xmlns:pic="{pic}">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="0" name="{desc}" descr="{desc}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip xmlns:r="{rel}" r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline>"#,
            r#"</{w}drawing></{w}r>"#,
        ),
        w = w,
        decl = names.decl,
        wpd = WPD_NS,
        dml = DML_NS,
        pic = PIC_NS,
        rel = REL_NS,
        cx = cx,
        cy = cy,
        id = drawing_id,
        desc = desc,
        rel_id = rel_id,
    )
}

/// Add `Default` content types for extensions the package does not declare yet.
fn register_extensions(xml: &str, extensions: &[&str]) -> Result<Option<String>, Error> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    let declared: Vec<String> = root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Default")
        .filter_map(|n| n.attribute("Extension"))
        .map(str::to_ascii_lowercase)
        .collect();
    let prefix = prefix_for(root, CT_NS);
    let mut defaults = String::new();
    for ext in extensions {
        if declared.iter().any(|d| d == ext) {
            continue;
        }
        if let Some(ct) = content_type(ext) {
            let _ = write!(defaults, r#"<{prefix}Default Extension="{ext}" ContentType="{ct}"/>"#);
        }
    }
    if defaults.is_empty() {
        return Ok(None);
    }
    Ok(Some(apply_edits(xml, vec![append_children(xml, root, &defaults)])))
}
