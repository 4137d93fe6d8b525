//! Validated tile model and the platform's size limits.

use serde::{Deserialize, Serialize};

/// Rich-message limits imposed by the chat platform. Counted in characters.
pub mod limits {
    /// Leading cells every row must carry.
    pub const REQUIRED_CELLS: usize = 7;
    pub const TITLE: usize = 256;
    pub const DESCRIPTION: usize = 4096;
    pub const AUTHOR: usize = 256;
    pub const FOOTER: usize = 2048;
    pub const FIELD_NAME: usize = 256;
    pub const FIELD_VALUE: usize = 1024;
    pub const MAX_FIELDS: usize = 25;
    /// Combined title, description, author, footer and field text.
    pub const TOTAL: usize = 6000;
    pub const MAX_COLOR: u32 = 0x00FF_FFFF;
}

/// Zero-width space the platform needs in place of empty names and values.
pub const PLACEHOLDER: &str = "\u{200b}";

/// One name/value entry in a tile's field grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileField {
    pub name: String,
    pub value: String,
    /// Spans the whole content width instead of sharing a row.
    pub full_width: bool,
}

impl TileField {
    /// Characters this field contributes to the total budget.
    #[must_use]
    pub fn budget_len(&self) -> usize {
        display_len(&self.name) + display_len(&self.value)
    }
}

/// The validated, renderable unit built from one source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSpecification {
    pub title: String,
    pub title_link: Option<String>,
    pub description: String,
    pub accent_color: u32,
    pub author_name: Option<String>,
    pub author_link: Option<String>,
    pub footer_text: Option<String>,
    pub fields: Vec<TileField>,
}

/// What [`TileSpecification::fit_to_budget`] had to remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetReport {
    pub fields_dropped: usize,
    pub footer_chars_trimmed: usize,
    pub description_chars_trimmed: usize,
}

impl BudgetReport {
    /// True when the tile was already within budget.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.fields_dropped == 0
            && self.footer_chars_trimmed == 0
            && self.description_chars_trimmed == 0
    }
}

impl TileSpecification {
    /// Serialized size as the platform counts it.
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        // A link-only author still renders a one-character placeholder name.
        let author = match (&self.author_name, &self.author_link) {
            (Some(name), _) => char_len(name),
            (None, Some(_)) => 1,
            (None, None) => 0,
        };
        let fixed = char_len(&self.title)
            + char_len(&self.description)
            + author
            + self.footer_text.as_deref().map_or(0, char_len);
        fixed + self.fields.iter().map(TileField::budget_len).sum::<usize>()
    }

    /// Bring the tile under [`limits::TOTAL`].
    ///
    /// Trailing fields go first. Only when no fields remain are the footer and
    /// then the description shortened from the end. Idempotent.
    pub fn fit_to_budget(&mut self) -> BudgetReport {
        let mut report = BudgetReport::default();

        while self.serialized_len() > limits::TOTAL && self.fields.pop().is_some() {
            report.fields_dropped += 1;
        }

        let mut excess = self.serialized_len().saturating_sub(limits::TOTAL);
        if excess > 0
            && let Some(footer) = self.footer_text.as_mut()
        {
            let trimmed = trim_tail(footer, excess);
            report.footer_chars_trimmed = trimmed;
            excess -= trimmed;
            if footer.is_empty() {
                self.footer_text = None;
            }
        }
        if excess > 0 {
            report.description_chars_trimmed = trim_tail(&mut self.description, excess);
        }

        report
    }
}

/// Truncate `text` to at most `max` characters.
///
/// Returns the original character count when truncation happened.
pub fn truncate_chars(text: &mut String, max: usize) -> Option<usize> {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => {
            let original = char_len(text);
            text.truncate(byte_idx);
            Some(original)
        }
        None => None,
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn display_len(text: &str) -> usize {
    char_len(text).max(1)
}

/// Remove up to `count` characters from the end; returns how many went.
fn trim_tail(text: &mut String, count: usize) -> usize {
    let len = char_len(text);
    let keep = len.saturating_sub(count);
    truncate_chars(text, keep);
    len - keep
}
