//! Reads the vision model's free-text answer into a [`LocalizationResult`].
//!
//! The expected shape is the one the prompt asks for:
//!
//! ```text
//! Classification: yes, Bounding Box: [120, 80, 760, 910], Message: ..., Object Type: cow, rope.
//! ```
//!
//! Parsing is best effort. Anything that does not follow the shape (a missing
//! label or a missing delimiter) yields `LocalizationResult::default()`, which
//! downstream treats as "no muzzle". A box that is not four numbers only
//! clears the box and the classification; message and objects are kept.

use tracing::debug;

use crate::models::{LocalizationResult, NormalizedBox};

const CLASSIFICATION_LABEL: &str = "Classification:";
const BOUNDING_BOX_DELIMITER: &str = ", Bounding Box:";
const MESSAGE_DELIMITER: &str = ", Message:";
const OBJECT_TYPE_DELIMITER: &str = ", Object Type:";

/// Parse a model answer. Never fails.
pub fn parse_localization(text: &str) -> LocalizationResult {
    match read_localization(text) {
        Some(result) => result,
        None => {
            debug!("model answer did not match the expected format");
            LocalizationResult::default()
        }
    }
}

fn read_localization(text: &str) -> Option<LocalizationResult> {
    let mut reader = SegmentReader::new(text);
    reader.skip_past(CLASSIFICATION_LABEL)?;

    let classification = read_classification(reader.take_until(BOUNDING_BOX_DELIMITER)?);
    let bounding_box = read_bounding_box(reader.take_until(MESSAGE_DELIMITER)?);
    let message = read_message(reader.take_until(OBJECT_TYPE_DELIMITER)?);
    let object_types = read_object_types(reader.take_rest());

    // A positive answer is only usable with a box to crop.
    if classification && bounding_box.is_none() {
        debug!("model answered yes without a readable bounding box");
    }

    Some(LocalizationResult {
        classification: classification && bounding_box.is_some(),
        bounding_box,
        message,
        object_types,
    })
}

/// Forward-only cursor over the answer text.
struct SegmentReader<'a> {
    rest: &'a str,
}

impl<'a> SegmentReader<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn skip_past(&mut self, label: &str) -> Option<()> {
        let at = self.rest.find(label)?;
        self.rest = &self.rest[at + label.len()..];
        Some(())
    }

    /// Returns the text before `delimiter` and moves past it.
    fn take_until(&mut self, delimiter: &str) -> Option<&'a str> {
        let at = self.rest.find(delimiter)?;
        let segment = &self.rest[..at];
        self.rest = &self.rest[at + delimiter.len()..];
        Some(segment)
    }

    fn take_rest(&mut self) -> &'a str {
        std::mem::take(&mut self.rest)
    }
}

pub(crate) fn read_classification(segment: &str) -> bool {
    segment.trim().eq_ignore_ascii_case("yes")
}

pub(crate) fn read_message(segment: &str) -> String {
    segment.trim().to_string()
}

/// Splits the trailing object list, dropping the period that closes the answer.
pub(crate) fn read_object_types(segment: &str) -> Vec<String> {
    let segment = segment.trim();
    let segment = segment.strip_suffix('.').unwrap_or(segment);
    segment
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strict `[ymin, xmin, ymax, xmax]` scanner. Parentheses are accepted in
/// place of brackets, fractional parts are truncated toward zero.
pub(crate) fn read_bounding_box(segment: &str) -> Option<NormalizedBox> {
    let segment = segment.trim();
    let inner = segment
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| segment.strip_prefix('(').and_then(|s| s.strip_suffix(')')))?;

    let mut values = [0i64; 4];
    let mut count = 0;
    for item in inner.split(',') {
        if count == values.len() {
            return None;
        }
        values[count] = read_coordinate(item)?;
        count += 1;
    }
    if count != values.len() {
        return None;
    }

    let [ymin, xmin, ymax, xmax] = values;
    Some(NormalizedBox::new(ymin, xmin, ymax, xmax))
}

fn read_coordinate(item: &str) -> Option<i64> {
    let item = item.trim();
    let (negative, digits) = match item.as_bytes().first()? {
        b'-' => (true, &item[1..]),
        b'+' => (false, &item[1..]),
        _ => (false, item),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }

    let value: i64 = whole.parse().ok()?;
    Some(if negative { -value } else { value })
}
