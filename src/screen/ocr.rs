use anyhow::Result;
use std::collections::BTreeMap;

use crate::settings::Rect;

/// One recognized word with its layout position, in frame-local
/// coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    /// Engine confidence, 0..=100.
    pub confidence: f32,
    pub page: u32,
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
    pub bbox: Rect,
}

/// Text recognition boundary. The concrete engine (a Tesseract-style
/// backend) lives outside this crate.
pub trait OcrProvider: Send {
    fn recognize(&mut self, png: &[u8]) -> Result<Vec<OcrToken>>;
}

/// One reassembled text line in screen coordinates, ready for in-place
/// overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedLine {
    pub text: String,
    pub rect: Rect,
}

/// Group tokens back into visual lines: same (page, block, paragraph,
/// line) tuple, words joined with spaces, bounding boxes unioned and
/// shifted into screen space by the capture origin. Tokens at or below
/// the confidence floor and lines that come out blank are dropped.
pub fn assemble_lines(
    tokens: &[OcrToken],
    confidence_floor: f32,
    capture_rect: &Rect,
) -> Vec<RecognizedLine> {
    let mut lines: BTreeMap<(u32, u32, u32, u32), (Vec<&str>, Option<Rect>)> = BTreeMap::new();

    for token in tokens {
        if token.confidence <= confidence_floor {
            continue;
        }
        let key = (token.page, token.block, token.paragraph, token.line);
        let entry = lines.entry(key).or_insert((Vec::new(), None));
        entry.0.push(token.text.as_str());
        entry.1 = Some(match entry.1 {
            Some(rect) => rect.union(&token.bbox),
            None => token.bbox,
        });
    }

    lines
        .into_values()
        .filter_map(|(words, bbox)| {
            let text = words.join(" ").trim().to_string();
            if text.is_empty() {
                return None;
            }
            let bbox = bbox?;
            Some(RecognizedLine {
                text,
                rect: Rect::new(
                    capture_rect.x + bbox.x,
                    capture_rect.y + bbox.y,
                    bbox.width,
                    bbox.height,
                ),
            })
        })
        .collect()
}

/// Flatten surviving tokens into one space-joined caption.
pub fn aggregate_text(tokens: &[OcrToken], confidence_floor: f32) -> String {
    tokens
        .iter()
        .filter(|t| t.confidence > confidence_floor)
        .map(|t| t.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, confidence: f32, line: u32, bbox: Rect) -> OcrToken {
        OcrToken {
            text: text.to_string(),
            confidence,
            page: 1,
            block: 1,
            paragraph: 1,
            line,
            bbox,
        }
    }

    #[test]
    fn low_confidence_tokens_are_dropped() {
        let tokens = vec![
            token("keep", 90.0, 1, Rect::new(0, 0, 40, 10)),
            token("drop", 50.0, 1, Rect::new(45, 0, 40, 10)),
            token("drop", 12.0, 1, Rect::new(90, 0, 40, 10)),
        ];
        assert_eq!(aggregate_text(&tokens, 50.0), "keep");
    }

    #[test]
    fn lines_are_reassembled_with_unioned_boxes() {
        let tokens = vec![
            token("hello", 90.0, 1, Rect::new(10, 5, 40, 12)),
            token("world", 88.0, 1, Rect::new(55, 5, 42, 12)),
            token("below", 91.0, 2, Rect::new(10, 25, 45, 12)),
        ];

        let lines = assemble_lines(&tokens, 50.0, &Rect::new(100, 200, 640, 480));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "hello world");
        // Union of both word boxes, offset by the capture origin.
        assert_eq!(lines[0].rect, Rect::new(110, 205, 87, 12));
        assert_eq!(lines[1].text, "below");
        assert_eq!(lines[1].rect, Rect::new(110, 225, 45, 12));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let tokens = vec![
            token("  ", 90.0, 1, Rect::new(0, 0, 5, 5)),
            token("text", 90.0, 2, Rect::new(0, 20, 30, 10)),
        ];
        let lines = assemble_lines(&tokens, 50.0, &Rect::default());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "text");
    }

    #[test]
    fn aggregate_spans_lines_with_spaces() {
        let tokens = vec![
            token("first", 90.0, 1, Rect::new(0, 0, 30, 10)),
            token("second", 90.0, 2, Rect::new(0, 20, 30, 10)),
        ];
        assert_eq!(aggregate_text(&tokens, 50.0), "first second");
    }
}
