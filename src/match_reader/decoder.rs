//! 识别文本后处理：标签与倒计时
//!
//! Raw recognizer output is noisy. These decoders snap it onto the closed
//! template set and validate numbers, reporting an unreadable value as
//! [`Decoded::Undecodable`] instead of an error.

use super::similarity::closest_match;
use super::template::{MatchDescriptor, MatchTemplate, SLOT};
use crate::config::LabelConfig;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

/// Letter/digit sequences the recognizer is known to emit for specific
/// digits. Multi-character keys first.
const NUMBER_CORRECTIONS: &[(&str, &str)] = &[("1a", "78"), ("s", "5"), ("S", "5")];

/// Longest number a label slot can hold.
const MAX_SLOT_DIGITS: usize = 3;

/// A countdown read as four characters ending in this digit carries a
/// stray trailing glyph.
const SPURIOUS_TRAILING_DIGIT: char = '1';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    Value(T),
    Undecodable,
}

impl<T> Decoded<T> {
    pub fn is_undecodable(&self) -> bool {
        matches!(self, Decoded::Undecodable)
    }

    pub fn value(self) -> Option<T> {
        match self {
            Decoded::Value(v) => Some(v),
            Decoded::Undecodable => None,
        }
    }
}

/// Validate one slot token, applying known recognizer confusions first.
///
/// Rejects empty or non-digit text, more than three digits, and a leading
/// zero on anything other than `"0"` itself.
pub fn parse_slot_number(token: &str) -> Option<u32> {
    let corrected = NUMBER_CORRECTIONS
        .iter()
        .fold(token.to_string(), |acc, (from, to)| acc.replace(from, to));

    if corrected.is_empty() || !corrected.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if corrected.len() > MAX_SLOT_DIGITS {
        return None;
    }
    if corrected.len() > 1 && corrected.starts_with('0') {
        return None;
    }
    corrected.parse().ok()
}

pub struct LabelDecoder {
    cutoff: f64,
}

impl LabelDecoder {
    pub fn new(config: &LabelConfig) -> Self {
        Self {
            cutoff: config.similarity_cutoff,
        }
    }

    /// Decode raw label text.
    ///
    /// Text too far from every template is "no event" (the empty
    /// descriptor). A matched template whose `number` slot cannot be
    /// recovered is undecodable; an unrecoverable `total` is left absent.
    pub fn decode(&self, raw: &str) -> Decoded<MatchDescriptor> {
        let text = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
        let shape = DIGIT_RUN.replace_all(&text, SLOT.to_string().as_str());

        let shapes = MatchTemplate::ALL.iter().map(|t| t.shape());
        let template = match closest_match(&shape, shapes, self.cutoff) {
            Some((idx, _)) => MatchTemplate::ALL[idx],
            None => return Decoded::Value(MatchDescriptor::empty()),
        };
        if template == MatchTemplate::None {
            return Decoded::Value(MatchDescriptor::empty());
        }

        let runs: Vec<&str> = DIGIT_RUN.find_iter(&text).map(|m| m.as_str()).collect();
        if runs.len() == template.slots() {
            return fill_slots(template, &runs);
        }

        // Digit runs disagree with the template; line the words up instead.
        let raw_words: Vec<&str> = text.split(' ').collect();
        let known_words: Vec<&str> = template.shape().split(' ').collect();
        if raw_words.len() != known_words.len() {
            return Decoded::Undecodable;
        }
        let tokens: Vec<&str> = known_words
            .iter()
            .zip(&raw_words)
            .filter(|(known, _)| known.starts_with(SLOT))
            .map(|(_, raw)| *raw)
            .collect();
        fill_slots(template, &tokens)
    }
}

fn fill_slots(template: MatchTemplate, tokens: &[&str]) -> Decoded<MatchDescriptor> {
    let mut values = tokens.iter().map(|t| parse_slot_number(t));

    let number = match template.slots() {
        0 => None,
        _ => match values.next().flatten() {
            Some(n) => Some(n),
            None => return Decoded::Undecodable,
        },
    };
    let total = values.next().flatten();

    match MatchDescriptor::new(template, number, total) {
        Some(descriptor) => Decoded::Value(descriptor),
        None => Decoded::Undecodable,
    }
}

/// Reconcile the two countdown readings.
///
/// `direct` comes from the plain enlarged crop, `isolated` from the
/// contour-isolated raster. `Value(None)` means nothing was on screen;
/// a reading that is not a number below `limit_secs` is undecodable.
pub fn decode_countdown(direct: &str, isolated: &str, limit_secs: u32) -> Decoded<Option<u32>> {
    let direct = direct.trim();
    let isolated = isolated.trim();

    if isolated.is_empty() && direct.chars().count() <= 2 {
        return Decoded::Value(None);
    }

    // a lone "0" tends to be misread as another digit on the direct crop
    let picked = if direct.is_empty() || (isolated == "0" && direct.chars().count() == 1) {
        isolated
    } else {
        direct
    };

    let mut text = picked.to_string();
    if text.len() == 4 && text.ends_with(SPURIOUS_TRAILING_DIGIT) {
        text.truncate(3);
    }
    while text.len() > 1 && text.starts_with('0') {
        text.remove(0);
    }

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Decoded::Undecodable;
    }
    match text.parse::<u32>() {
        Ok(secs) if secs < limit_secs => Decoded::Value(Some(secs)),
        _ => Decoded::Undecodable,
    }
}
