//! Tile renderer: [`TileSpecification`] → platform rich message + controls.
//!
//! Rendering never fails. Validation already happened; the renderer only
//! maps fields across and fills the placeholders the platform insists on.

#![allow(missing_docs)]

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::tiles::decode::DecodeError;
use crate::tiles::spec::{PLACEHOLDER, TileSpecification, char_len, limits, truncate_chars};

/// Inline fields the platform lays out side by side.
pub const FIELDS_PER_ROW: usize = 3;

/// Appended to the footer of a view that timed out.
pub const EXPIRED_FOOTER: &str = "⏱️ View expired due to inactivity. Please refresh to continue.";

/// Accent colors for host-level status messages.
pub mod colors {
    pub const NO_DATA: u32 = 0x00E6_7E22;
    pub const ERROR: u32 = 0x00E7_4C3C;
}

// ──────────────────── platform message ────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// The platform's native rich-message shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<MessageAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<MessageFooter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<MessageField>,
}

impl PlatformMessage {
    /// A plain status message with no fields.
    #[must_use]
    pub fn status(title: &str, description: &str, color: u32) -> Self {
        Self {
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            url: None,
            color,
            author: None,
            footer: None,
            fields: Vec::new(),
        }
    }

    /// Shown when a payload produced no tiles.
    #[must_use]
    pub fn no_data() -> Self {
        Self::status("No Data", "Nothing to display", colors::NO_DATA)
    }

    /// Shown when the initial payload could not be read.
    #[must_use]
    pub fn decode_failure(error: &DecodeError) -> Self {
        let description = match error {
            DecodeError::Empty => "No data provided",
            DecodeError::Malformed { .. } => "Failed to parse JSON data",
        };
        Self::status("Error", description, colors::ERROR)
    }

    /// Characters the platform counts toward [`limits::TOTAL`].
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        let text = |t: &Option<String>| t.as_deref().map_or(0, char_len);
        text(&self.title)
            + text(&self.description)
            + self.author.as_ref().map_or(0, |a| char_len(&a.name))
            + self.footer.as_ref().map_or(0, |f| char_len(&f.text))
            + self
                .fields
                .iter()
                .map(|f| char_len(&f.name) + char_len(&f.value))
                .sum::<usize>()
    }

    /// Same message with the inactivity notice appended to the footer.
    ///
    /// The notice is never cut. Room for it comes from the end of the old
    /// footer, then the description, then trailing fields, so the result
    /// stays within [`limits::FOOTER`] and [`limits::TOTAL`].
    #[must_use]
    pub fn expired(mut self) -> Self {
        const SEPARATOR: &str = "\n\n";
        let notice = char_len(EXPIRED_FOOTER);
        let mut kept = self.footer.take().map(|f| f.text).unwrap_or_default();

        let footer_room = limits::FOOTER.saturating_sub(notice + char_len(SEPARATOR));
        truncate_chars(&mut kept, footer_room);

        let rest = self.serialized_len();
        let with_kept = |kept: &str| {
            if kept.is_empty() {
                notice
            } else {
                char_len(kept) + char_len(SEPARATOR) + notice
            }
        };
        let excess = (rest + with_kept(&kept)).saturating_sub(limits::TOTAL);
        if excess > 0 {
            let keep = char_len(&kept).saturating_sub(excess);
            truncate_chars(&mut kept, keep);
        }

        let mut excess = (rest + with_kept(&kept)).saturating_sub(limits::TOTAL);
        if excess > 0
            && let Some(description) = self.description.as_mut()
        {
            let len = char_len(description);
            let keep = len.saturating_sub(excess);
            truncate_chars(description, keep);
            excess -= len - keep;
            if description.is_empty() {
                self.description = None;
            }
        }
        while excess > 0 {
            let Some(field) = self.fields.pop() else { break };
            excess = excess.saturating_sub(char_len(&field.name) + char_len(&field.value));
        }

        let text = if kept.is_empty() {
            EXPIRED_FOOTER.to_string()
        } else {
            format!("{kept}{SEPARATOR}{EXPIRED_FOOTER}")
        };
        self.footer = Some(MessageFooter { text });
        self
    }

    /// Fields grouped into display rows: runs of up to three inline fields,
    /// each full-width field alone on its own row.
    #[must_use]
    pub fn field_rows(&self) -> Vec<Vec<&MessageField>> {
        let mut rows: Vec<Vec<&MessageField>> = Vec::new();
        let mut run: Vec<&MessageField> = Vec::new();

        for field in &self.fields {
            if field.inline {
                run.push(field);
                if run.len() == FIELDS_PER_ROW {
                    rows.push(std::mem::take(&mut run));
                }
            } else {
                if !run.is_empty() {
                    rows.push(std::mem::take(&mut run));
                }
                rows.push(vec![field]);
            }
        }
        if !run.is_empty() {
            rows.push(run);
        }
        rows
    }

    /// Plain-text rendering for terminals.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if let Some(author) = &self.author {
            let _ = writeln!(out, "{}", visible(&author.name));
        }
        if let Some(title) = &self.title {
            let _ = writeln!(out, "{title}");
        }
        if let Some(url) = &self.url {
            let _ = writeln!(out, "<{url}>");
        }
        if let Some(description) = &self.description {
            let _ = writeln!(out, "\n{description}");
        }
        for row in self.field_rows() {
            out.push('\n');
            let names: Vec<&str> = row.iter().map(|f| visible(&f.name)).collect();
            let values: Vec<&str> = row.iter().map(|f| visible(&f.value)).collect();
            let _ = writeln!(out, "{}", names.join(" | "));
            let _ = writeln!(out, "{}", values.join(" | "));
        }
        if let Some(footer) = &self.footer {
            let _ = writeln!(out, "\n-- {}", footer.text);
        }
        out
    }
}

fn visible(text: &str) -> &str {
    if text == PLACEHOLDER { "" } else { text }
}

fn or_placeholder(text: &str) -> String {
    if text.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        text.to_string()
    }
}

/// Map one tile onto the platform message. Pure and infallible.
#[must_use]
pub fn render(tile: &TileSpecification) -> PlatformMessage {
    let author = match (&tile.author_name, &tile.author_link) {
        (Some(name), url) => Some(MessageAuthor {
            name: name.clone(),
            url: url.clone(),
        }),
        (None, Some(url)) => Some(MessageAuthor {
            name: PLACEHOLDER.to_string(),
            url: Some(url.clone()),
        }),
        (None, None) => None,
    };

    PlatformMessage {
        title: Some(tile.title.clone()).filter(|t| !t.is_empty()),
        description: Some(tile.description.clone()).filter(|d| !d.is_empty()),
        url: tile.title_link.clone(),
        color: tile.accent_color,
        author,
        footer: tile.footer_text.as_ref().map(|text| MessageFooter { text: text.clone() }),
        fields: tile
            .fields
            .iter()
            .map(|f| MessageField {
                name: or_placeholder(&f.name),
                value: or_placeholder(&f.value),
                inline: !f.full_width,
            })
            .collect(),
    }
}

// ──────────────────── controls ────────────────────

/// Transition affordances offered next to a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    First,
    Previous,
    PageIndicator,
    Next,
    Last,
    Refresh,
}

impl Affordance {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::First => "<<",
            Self::Previous => "<",
            Self::PageIndicator => "",
            Self::Next => ">",
            Self::Last => ">>",
            Self::Refresh => "🔄",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub affordance: Affordance,
    pub label: String,
    pub enabled: bool,
}

/// The control row attached to a rendered tile. Empty once expired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSet {
    pub controls: Vec<Control>,
}

impl ControlSet {
    /// No controls at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            controls: Vec::new(),
        }
    }

    /// Controls for a tile at `cursor` of `total`.
    #[must_use]
    pub fn for_page(cursor: usize, total: usize, refreshable: bool) -> Self {
        let at_start = cursor == 0;
        let at_end = cursor + 1 >= total;
        let control = |affordance: Affordance, enabled: bool| Control {
            affordance,
            label: affordance.label().to_string(),
            enabled,
        };

        let mut controls = vec![
            control(Affordance::First, !at_start),
            control(Affordance::Previous, !at_start),
            Control {
                affordance: Affordance::PageIndicator,
                label: format!("{}/{total}", cursor + 1),
                enabled: false,
            },
            control(Affordance::Next, !at_end),
            control(Affordance::Last, !at_end),
        ];
        if refreshable {
            controls.push(control(Affordance::Refresh, true));
        }
        Self { controls }
    }

    /// Only a refresh control, for a session whose refresh came back empty.
    #[must_use]
    pub fn refresh_only() -> Self {
        Self {
            controls: vec![Control {
                affordance: Affordance::Refresh,
                label: Affordance::Refresh.label().to_string(),
                enabled: true,
            }],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// True if the affordance is present and clickable.
    #[must_use]
    pub fn is_enabled(&self, affordance: Affordance) -> bool {
        self.controls
            .iter()
            .any(|c| c.affordance == affordance && c.enabled)
    }

    #[must_use]
    pub fn contains(&self, affordance: Affordance) -> bool {
        self.controls.iter().any(|c| c.affordance == affordance)
    }
}

impl fmt::Display for ControlSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self
            .controls
            .iter()
            .map(|c| {
                if c.enabled || c.affordance == Affordance::PageIndicator {
                    format!("[{}]", c.label)
                } else {
                    format!("({})", c.label)
                }
            })
            .collect();
        f.write_str(&labels.join(" "))
    }
}
