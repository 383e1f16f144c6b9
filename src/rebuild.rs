use crate::markers::{Marker, MarkerLexer};
use crate::model::{ContentEvent, FormatSet, Segment, SegmentKind};

/// Turn one paragraph's content events into formatted segments, consuming the
/// marker tokens. Format state starts empty and carries across breaks.
pub fn rebuild(events: &[ContentEvent], lexer: &MarkerLexer) -> Vec<Segment> {
    let mut state = FormatSet::empty();
    let mut buffer = String::new();
    let mut segments = Vec::new();

    for event in events {
        match event {
            ContentEvent::Text(text) => buffer.push_str(text),
            ContentEvent::Break(kind) => {
                flush(&mut buffer, &mut state, lexer, &mut segments);
                segments.push(Segment {
                    kind: SegmentKind::Break(*kind),
                    formats: state,
                });
            }
        }
    }
    flush(&mut buffer, &mut state, lexer, &mut segments);
    segments
}

fn flush(
    buffer: &mut String,
    state: &mut FormatSet,
    lexer: &MarkerLexer,
    out: &mut Vec<Segment>,
) {
    if buffer.is_empty() {
        return;
    }
    for piece in lexer.split(buffer) {
        if piece.is_empty() {
            continue;
        }
        match lexer.classify(piece) {
            Some(Marker::Start(format)) => state.set(format, true),
            Some(Marker::End(format)) => state.set(format, false),
            None => out.push(Segment {
                kind: SegmentKind::Text(piece.to_string()),
                formats: *state,
            }),
        }
    }
    buffer.clear();
}
