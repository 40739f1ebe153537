//! Field-length probes: "how many characters are in the PIN display right now?"

use lockwatch_protocol::UiNode;

pub trait FieldLengthProbe {
    /// Number of entered characters, or `None` when no PIN display can be found.
    fn probe(&self) -> Option<u32>;
}

impl<F> FieldLengthProbe for F
where
    F: Fn() -> Option<u32>,
{
    fn probe(&self) -> Option<u32> {
        self()
    }
}

/// Probe that never finds a field. Used when no window snapshot was captured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFieldProbe;

impl FieldLengthProbe for NoFieldProbe {
    fn probe(&self) -> Option<u32> {
        None
    }
}

/// Searches captured window trees for the PIN dot display.
///
/// The display is the first node, depth-first, that is a password field but
/// not editable. That matches the stock keyguard and OEM variants without
/// relying on class names, and skips real text inputs.
#[derive(Debug, Clone, Copy)]
pub struct WindowTreeProbe<'a> {
    roots: &'a [UiNode],
}

impl<'a> WindowTreeProbe<'a> {
    /// `roots` should list the active window first.
    pub fn new(roots: &'a [UiNode]) -> Self {
        Self { roots }
    }
}

impl FieldLengthProbe for WindowTreeProbe<'_> {
    fn probe(&self) -> Option<u32> {
        self.roots.iter().find_map(pin_length_in_subtree)
    }
}

fn pin_length_in_subtree(node: &UiNode) -> Option<u32> {
    if node.is_password && !node.is_editable {
        let length = node
            .text
            .as_deref()
            .map(|text| text.chars().count())
            .unwrap_or(0);
        return Some(u32::try_from(length).unwrap_or(u32::MAX));
    }
    node.children.iter().find_map(pin_length_in_subtree)
}
