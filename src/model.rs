/// A character format that can be toggled by a pair of text markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Highlight,
    Bold,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Highlight, Format::Bold];

    pub fn name(self) -> &'static str {
        match self {
            Format::Highlight => "HIGHLIGHT",
            Format::Bold => "BOLD",
        }
    }

    pub fn start_token(self) -> String {
        format!("{{{{{}_START}}}}", self.name())
    }

    pub fn end_token(self) -> String {
        format!("{{{{{}_END}}}}", self.name())
    }

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Snapshot of which formats are active. One flag per format; a second START
/// for an already active format does not nest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormatSet(u8);

impl FormatSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, format: Format) -> Self {
        self.set(format, true);
        self
    }

    pub fn contains(self, format: Format) -> bool {
        self.0 & format.bit() != 0
    }

    pub fn set(&mut self, format: Format, active: bool) {
        if active {
            self.0 |= format.bit();
        } else {
            self.0 &= !format.bit();
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BreakKind {
    #[default]
    Line,
    Page,
    Column,
}

/// Atomic piece of a paragraph's content, in document order.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentEvent {
    Text(String),
    Break(BreakKind),
}

#[derive(Clone, Debug, PartialEq)]
pub enum SegmentKind {
    Text(String),
    Break(BreakKind),
}

/// One run to be written back into a paragraph.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub formats: FormatSet,
}

/// Image payload as supplied by the caller.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ImageData {
    Bytes(Vec<u8>),
    Base64(String),
}

/// An image to embed at a `{{IMAGE:<marker>}}` placeholder.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct ImageSpec {
    /// Marker id, with or without the surrounding `{{IMAGE:...}}`.
    pub marker: String,
    pub data: ImageData,
    #[cfg_attr(feature = "serde", serde(default = "default_format"))]
    pub format: String,
    /// Width in pixels.
    #[cfg_attr(feature = "serde", serde(default = "default_width"))]
    pub width: u32,
    /// Height in pixels.
    #[cfg_attr(feature = "serde", serde(default = "default_height"))]
    pub height: u32,
    #[cfg_attr(feature = "serde", serde(default = "default_description"))]
    pub description: String,
}

fn default_format() -> String {
    "png".to_string()
}

fn default_width() -> u32 {
    400
}

fn default_height() -> u32 {
    300
}

fn default_description() -> String {
    "Image".to_string()
}

impl ImageSpec {
    pub fn new(marker: impl Into<String>, data: ImageData) -> Self {
        Self {
            marker: marker.into(),
            data,
            format: default_format(),
            width: default_width(),
            height: default_height(),
            description: default_description(),
        }
    }

    /// The literal placeholder text searched for in the document.
    pub fn placeholder(&self) -> String {
        if self.marker.starts_with("{{IMAGE:") {
            self.marker.clone()
        } else {
            format!("{{{{IMAGE:{}}}}}", self.marker)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageWarning {
    /// No text node contained the placeholder; the media file and relationship
    /// were still added to the package.
    MarkerNotFound { marker: String, rel_id: String },
}

/// Colour names accepted by `w:highlight/@w:val`.
pub const HIGHLIGHT_COLORS: [&str; 16] = [
    "yellow",
    "green",
    "cyan",
    "magenta",
    "red",
    "blue",
    "darkYellow",
    "darkGreen",
    "darkCyan",
    "darkMagenta",
    "darkRed",
    "darkBlue",
    "lightGray",
    "darkGray",
    "black",
    "white",
];

#[derive(Clone, Debug)]
pub struct Options {
    pub highlight_color: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            highlight_color: "yellow".to_string(),
        }
    }
}

pub struct Formatted {
    pub bytes: Vec<u8>,
    pub containers_modified: usize,
}

pub struct Injected {
    pub bytes: Vec<u8>,
    pub warnings: Vec<ImageWarning>,
}

pub struct Processed {
    pub bytes: Vec<u8>,
    pub containers_modified: usize,
    pub warnings: Vec<ImageWarning>,
}
