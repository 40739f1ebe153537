//! Maps raw interface events onto PIN-entry signals.
//!
//! Classification is a pure function of the event and the tracker's current
//! entered length. It never fails: anything it cannot interpret is `NoSignal`.

use chrono::{DateTime, Utc};

const DELETE_KEYWORDS: [&str; 3] = ["delete", "backspace", "erase"];

/// Zero code points of the decimal digit runs localized keypads draw from.
/// Each run is ten consecutive code points, zero through nine.
const DECIMAL_DIGIT_ZEROS: [u32; 14] = [
    0x0660, // Arabic-Indic
    0x06F0, // Extended Arabic-Indic (Persian, Urdu)
    0x0966, // Devanagari
    0x09E6, // Bengali
    0x0A66, // Gurmukhi
    0x0AE6, // Gujarati
    0x0B66, // Oriya
    0x0BE6, // Tamil
    0x0C66, // Telugu
    0x0CE6, // Kannada
    0x0D66, // Malayalam
    0x0E50, // Thai
    0x1040, // Myanmar
    0xFF10, // Fullwidth
];

/// A raw interaction event as delivered by the acquisition layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    ClickedElement {
        description: Option<String>,
        text: Option<String>,
        at: DateTime<Utc>,
    },
    TextChanged {
        new_length: usize,
        at: DateTime<Utc>,
    },
    ContentChanged {
        at: DateTime<Utc>,
    },
}

impl UiEvent {
    pub fn clicked(label: &str, at: DateTime<Utc>) -> Self {
        UiEvent::ClickedElement {
            description: Some(label.to_string()),
            text: None,
            at,
        }
    }

    /// Builds a text-changed event from every text item the platform reported.
    pub fn text_changed<S: AsRef<str>>(texts: &[S], at: DateTime<Utc>) -> Self {
        UiEvent::TextChanged {
            new_length: texts.iter().map(|text| text.as_ref().chars().count()).sum(),
            at,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            UiEvent::ClickedElement { at, .. }
            | UiEvent::TextChanged { at, .. }
            | UiEvent::ContentChanged { at } => *at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    DigitEntered,
    Deleted,
    Submitted,
    FieldCleared,
    NoSignal,
}

pub fn classify(event: &UiEvent, entered_length: u32) -> Signal {
    match event {
        UiEvent::ClickedElement {
            description, text, ..
        } => classify_click(&click_label(description.as_deref(), text.as_deref()), entered_length),
        UiEvent::TextChanged { new_length, .. } => {
            // Non-zero lengths are left to the click path.
            if *new_length == 0 && entered_length > 0 {
                Signal::FieldCleared
            } else {
                Signal::NoSignal
            }
        }
        // Content changes go through the tracker's probe path.
        UiEvent::ContentChanged { .. } => Signal::NoSignal,
    }
}

/// Description wins when present; otherwise the visible text.
fn click_label(description: Option<&str>, text: Option<&str>) -> String {
    let description = description.map(str::trim).unwrap_or_default();
    if !description.is_empty() {
        return description.to_string();
    }
    text.map(str::trim).unwrap_or_default().to_string()
}

fn classify_click(label: &str, entered_length: u32) -> Signal {
    if label.chars().next().map(is_decimal_digit).unwrap_or(false) {
        return Signal::DigitEntered;
    }

    let lowered = label.to_lowercase();
    if DELETE_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
    {
        return Signal::Deleted;
    }

    // Any other key pressed while digits are pending is the OK/enter key.
    if entered_length > 0 {
        Signal::Submitted
    } else {
        Signal::NoSignal
    }
}

/// Decimal digits only: fractions, superscripts and numeral letters are not keys.
fn is_decimal_digit(c: char) -> bool {
    if c.is_ascii_digit() {
        return true;
    }
    let code = u32::from(c);
    DECIMAL_DIGIT_ZEROS
        .iter()
        .any(|zero| (*zero..=*zero + 9).contains(&code))
}
