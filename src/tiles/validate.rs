//! Row validator & truncator: decoded rows → tile specifications.
//!
//! Column layout (no header row):
//!
//! | idx | column      | rule                                     |
//! |-----|-------------|------------------------------------------|
//! | 0   | title       | truncated to 256                         |
//! | 1   | description | truncated to 4096                        |
//! | 2   | title link  | accepted scheme or dropped               |
//! | 3   | color       | integer in `0..=0xFFFFFF` or the default |
//! | 4   | author      | truncated to 256                         |
//! | 5   | author link | accepted scheme or dropped               |
//! | 6   | footer      | truncated to 2048                        |
//! | 7.. | field pairs | name ≤ 256, value ≤ 1024, at most 25     |
//!
//! Nothing here fails: unusable rows are skipped, oversize text is cut, bad
//! links and colors degrade, and each such decision is reported to the sink.

use std::sync::Arc;

use crate::core::config::TilesConfig;
use crate::logger::diagnostics::{Diagnostic, DiagnosticSink, DropReason, LinkColumn, TextColumn};
use crate::tiles::decode::Cell;
use crate::tiles::spec::{TileField, TileSpecification, limits, truncate_chars};

/// Policy knobs for validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRules {
    pub accepted_schemes: Vec<String>,
    pub full_width_marker: String,
    pub default_color: u32,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from(&TilesConfig::default())
    }
}

impl From<&TilesConfig> for ValidationRules {
    fn from(cfg: &TilesConfig) -> Self {
        Self {
            accepted_schemes: cfg
                .accepted_url_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            full_width_marker: cfg.full_width_marker.clone(),
            default_color: cfg.default_color,
        }
    }
}

/// Builds tiles from rows, reporting every degradation to its sink.
#[derive(Clone)]
pub struct RowValidator {
    rules: ValidationRules,
    sink: Arc<dyn DiagnosticSink>,
}

impl RowValidator {
    pub fn new(rules: ValidationRules, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { rules, sink }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// One tile per usable row, in input order. An empty result is valid.
    pub fn build_tiles(&self, rows: &[Vec<Cell>]) -> Vec<TileSpecification> {
        rows.iter()
            .enumerate()
            .filter_map(|(row_idx, row)| self.build_tile(row_idx, row))
            .collect()
    }

    fn build_tile(&self, row: usize, cells: &[Cell]) -> Option<TileSpecification> {
        if cells.len() < limits::REQUIRED_CELLS {
            self.sink.record(Diagnostic::RowSkipped {
                row,
                cells: cells.len(),
            });
            return None;
        }

        let mut tile = TileSpecification {
            title: self.text(row, &cells[0], TextColumn::Title, limits::TITLE),
            description: self.text(row, &cells[1], TextColumn::Description, limits::DESCRIPTION),
            title_link: self.link(row, &cells[2], LinkColumn::Title),
            accent_color: self.color(row, &cells[3]),
            author_name: non_empty(self.text(row, &cells[4], TextColumn::Author, limits::AUTHOR)),
            author_link: self.link(row, &cells[5], LinkColumn::Author),
            footer_text: non_empty(self.text(row, &cells[6], TextColumn::Footer, limits::FOOTER)),
            fields: self.fields(row, &cells[limits::REQUIRED_CELLS..]),
        };

        self.fit(row, &mut tile);
        Some(tile)
    }

    fn text(&self, row: usize, cell: &Cell, column: TextColumn, max: usize) -> String {
        let mut text = cell.text().into_owned();
        if let Some(original) = truncate_chars(&mut text, max) {
            self.sink.record(Diagnostic::TextTruncated {
                row,
                column,
                original,
                max,
            });
        }
        text
    }

    fn link(&self, row: usize, cell: &Cell, column: LinkColumn) -> Option<String> {
        let raw = cell.text();
        let candidate = raw.trim();
        if candidate.is_empty() {
            return None;
        }
        if self.is_accepted_link(candidate) {
            return Some(candidate.to_string());
        }
        self.sink.record(Diagnostic::UrlRejected {
            row,
            column,
            value: candidate.to_string(),
        });
        None
    }

    fn is_accepted_link(&self, candidate: &str) -> bool {
        let lower = candidate.to_ascii_lowercase();
        self.rules
            .accepted_schemes
            .iter()
            .any(|scheme| lower.len() > scheme.len() && lower.starts_with(scheme.as_str()))
    }

    fn color(&self, row: usize, cell: &Cell) -> u32 {
        if cell.text().trim().is_empty() {
            return self.rules.default_color;
        }
        match coerce_color(cell) {
            Some(color) => color,
            None => {
                let fallback = self.rules.default_color;
                self.sink.record(Diagnostic::ColorCoerced {
                    row,
                    raw: cell.text().into_owned(),
                    fallback,
                });
                fallback
            }
        }
    }

    fn fields(&self, row: usize, cells: &[Cell]) -> Vec<TileField> {
        let mut fields = Vec::new();
        let mut over_cap = 0;

        for (idx, pair) in cells.chunks(2).enumerate() {
            let name = &pair[0];
            let value = pair.get(1);
            if name.is_blank() && value.is_none_or(Cell::is_blank) {
                break;
            }
            if fields.len() == limits::MAX_FIELDS {
                over_cap += 1;
                continue;
            }
            fields.push(self.field(row, idx, name, value));
        }

        if over_cap > 0 {
            self.sink.record(Diagnostic::FieldsDropped {
                row,
                dropped: over_cap,
                reason: DropReason::FieldLimit,
            });
        }
        fields
    }

    fn field(&self, row: usize, idx: usize, name: &Cell, value: Option<&Cell>) -> TileField {
        let raw_name = name.text();
        let marker = self.rules.full_width_marker.as_str();
        let (name_cell, full_width) = match raw_name.strip_prefix(marker) {
            Some(rest) => (Cell::Text(rest.to_string()), true),
            None => (Cell::Text(raw_name.into_owned()), false),
        };

        TileField {
            name: self.text(row, &name_cell, TextColumn::FieldName(idx), limits::FIELD_NAME),
            value: value.map_or_else(String::new, |v| {
                self.text(row, v, TextColumn::FieldValue(idx), limits::FIELD_VALUE)
            }),
            full_width,
        }
    }

    fn fit(&self, row: usize, tile: &mut TileSpecification) {
        let report = tile.fit_to_budget();
        if report.fields_dropped > 0 {
            self.sink.record(Diagnostic::FieldsDropped {
                row,
                dropped: report.fields_dropped,
                reason: DropReason::SizeBudget,
            });
        }
        if report.footer_chars_trimmed > 0 {
            self.sink.record(Diagnostic::BudgetTrimmed {
                row,
                column: TextColumn::Footer,
                removed: report.footer_chars_trimmed,
            });
        }
        if report.description_chars_trimmed > 0 {
            self.sink.record(Diagnostic::BudgetTrimmed {
                row,
                column: TextColumn::Description,
                removed: report.description_chars_trimmed,
            });
        }
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

/// Non-negative integer within the 24-bit color range, if the cell holds one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn coerce_color(cell: &Cell) -> Option<u32> {
    let integral = |f: f64| (f.fract() == 0.0 && (0.0..=f64::from(limits::MAX_COLOR)).contains(&f)).then_some(f as u64);

    let value = match cell {
        Cell::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral)),
        Cell::Text(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        Cell::Empty | Cell::Bool(_) => None,
    }?;

    u32::try_from(value).ok().filter(|c| *c <= limits::MAX_COLOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::diagnostics::MemorySink;
    use crate::tiles::decode::decode;
    use proptest::prelude::*;

    fn validator() -> (RowValidator, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (RowValidator::new(ValidationRules::default(), sink.clone()), sink)
    }

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|c| Cell::from(*c)).collect()
    }

    fn base_row() -> Vec<Cell> {
        row(&["T", "D", "", "65280", "", "", "F"])
    }

    #[test]
    fn basic_row_becomes_one_tile() {
        let (v, sink) = validator();
        let rows = decode(r#"[["T","D","","65280","","","F","Driver","Jim"]]"#).unwrap();
        let tiles = v.build_tiles(&rows);

        assert_eq!(tiles.len(), 1);
        let t = &tiles[0];
        assert_eq!(t.title, "T");
        assert_eq!(t.description, "D");
        assert_eq!(t.accent_color, 65280);
        assert_eq!(t.title_link, None);
        assert_eq!(t.author_name, None);
        assert_eq!(t.footer_text.as_deref(), Some("F"));
        assert_eq!(
            t.fields,
            vec![TileField {
                name: "Driver".into(),
                value: "Jim".into(),
                full_width: false,
            }]
        );
        assert!(sink.is_empty(), "{:?}", sink.snapshot());
    }

    #[test]
    fn short_rows_are_skipped_and_others_survive() {
        let (v, sink) = validator();
        let rows = vec![row(&["only", "three", "cells"]), base_row()];
        let tiles = v.build_tiles(&rows);

        assert_eq!(tiles.len(), 1);
        assert_eq!(
            sink.snapshot(),
            vec![Diagnostic::RowSkipped { row: 0, cells: 3 }]
        );
    }

    #[test]
    fn invalid_title_link_is_dropped_without_touching_the_rest() {
        let (v, sink) = validator();
        let rows = vec![row(&["T", "D", "notaurl", "65280", "", "", "", "A", "B"])];
        let tile = &v.build_tiles(&rows)[0];

        assert_eq!(tile.title_link, None);
        assert_eq!(tile.title, "T");
        assert_eq!(tile.accent_color, 65280);
        assert_eq!(tile.fields.len(), 1);
        assert_eq!(
            sink.snapshot(),
            vec![Diagnostic::UrlRejected {
                row: 0,
                column: LinkColumn::Title,
                value: "notaurl".into(),
            }]
        );
    }

    #[test]
    fn accepted_links_are_trimmed_and_kept() {
        let (v, _) = validator();
        let rows = vec![row(&[
            "T",
            "D",
            "  https://example.com/a ",
            "1",
            "Ann",
            "HTTP://example.com/ann",
            "",
        ])];
        let tile = &v.build_tiles(&rows)[0];
        assert_eq!(tile.title_link.as_deref(), Some("https://example.com/a"));
        assert_eq!(tile.author_link.as_deref(), Some("HTTP://example.com/ann"));
        assert_eq!(tile.author_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn bare_scheme_is_not_a_link() {
        let (v, sink) = validator();
        let rows = vec![row(&["T", "D", "https://", "1", "", "", ""])];
        assert_eq!(v.build_tiles(&rows)[0].title_link, None);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn tilde_field_is_full_width_with_marker_stripped() {
        let (v, _) = validator();
        let mut cells = base_row();
        cells.extend([Cell::from("~Details"), Cell::from("**x**")]);
        let tile = &v.build_tiles(&[cells])[0];
        assert_eq!(
            tile.fields,
            vec![TileField {
                name: "Details".into(),
                value: "**x**".into(),
                full_width: true,
            }]
        );
    }

    #[test]
    fn custom_marker_is_honoured() {
        let sink = Arc::new(MemorySink::new());
        let rules = ValidationRules {
            full_width_marker: "!!".into(),
            ..ValidationRules::default()
        };
        let v = RowValidator::new(rules, sink);
        let mut cells = base_row();
        cells.extend([Cell::from("!!Wide"), Cell::from("v"), Cell::from("~Narrow"), Cell::from("w")]);
        let tile = &v.build_tiles(&[cells])[0];
        assert!(tile.fields[0].full_width);
        assert_eq!(tile.fields[0].name, "Wide");
        assert!(!tile.fields[1].full_width);
        assert_eq!(tile.fields[1].name, "~Narrow");
    }

    #[test]
    fn twenty_six_pairs_keep_twenty_five() {
        let (v, sink) = validator();
        let mut cells = base_row();
        for i in 0..26 {
            cells.push(Cell::from(format!("n{i}")));
            cells.push(Cell::from(format!("v{i}")));
        }
        let tile = &v.build_tiles(&[cells])[0];

        assert_eq!(tile.fields.len(), 25);
        assert_eq!(tile.fields[24].name, "n24");
        assert_eq!(
            sink.snapshot(),
            vec![Diagnostic::FieldsDropped {
                row: 0,
                dropped: 1,
                reason: DropReason::FieldLimit,
            }]
        );
    }

    #[test]
    fn field_scan_stops_at_first_blank_pair() {
        let (v, _) = validator();
        let mut cells = base_row();
        cells.extend(row(&["a", "1", "", "", "b", "2"]));
        let tile = &v.build_tiles(&[cells])[0];
        assert_eq!(tile.fields.len(), 1);
        assert_eq!(tile.fields[0].name, "a");
    }

    #[test]
    fn half_empty_pairs_are_kept() {
        let (v, _) = validator();
        let mut cells = base_row();
        cells.extend(row(&["", "value only", "name only"]));
        let tile = &v.build_tiles(&[cells])[0];
        assert_eq!(tile.fields.len(), 2);
        assert_eq!(tile.fields[0].name, "");
        assert_eq!(tile.fields[0].value, "value only");
        assert_eq!(tile.fields[1].name, "name only");
        assert_eq!(tile.fields[1].value, "");
    }

    #[test]
    fn long_text_is_truncated_with_diagnostics() {
        let (v, sink) = validator();
        let long_title = "t".repeat(300);
        let long_value = "v".repeat(1500);
        let mut cells = row(&[long_title.as_str(), "D", "", "0", "", "", ""]);
        cells.extend([Cell::from("n"), Cell::from(long_value)]);
        let tile = &v.build_tiles(&[cells])[0];

        assert_eq!(tile.title.chars().count(), limits::TITLE);
        assert_eq!(tile.fields[0].value.chars().count(), limits::FIELD_VALUE);
        let recorded = sink.snapshot();
        assert!(recorded.contains(&Diagnostic::TextTruncated {
            row: 0,
            column: TextColumn::Title,
            original: 300,
            max: limits::TITLE,
        }));
        assert!(recorded.contains(&Diagnostic::TextTruncated {
            row: 0,
            column: TextColumn::FieldValue(0),
            original: 1500,
            max: limits::FIELD_VALUE,
        }));
    }

    #[test]
    fn color_coercion() {
        let (v, sink) = validator();
        let rows = decode(
            r#"[
                ["a","","",65280,"","",""],
                ["b","","","65280.0","","",""],
                ["c","","","green","","",""],
                ["d","","",-5,"","",""],
                ["e","","",16777216,"","",""],
                ["f","","",null,"","",""],
                ["g","",""," 42 ","","",""]
            ]"#,
        )
        .unwrap();
        let colors: Vec<u32> = v.build_tiles(&rows).iter().map(|t| t.accent_color).collect();
        assert_eq!(colors, vec![65280, 65280, 0, 0, 0, 0, 42]);

        let coerced: Vec<usize> = sink
            .snapshot()
            .iter()
            .filter(|d| matches!(d, Diagnostic::ColorCoerced { .. }))
            .filter_map(Diagnostic::row)
            .collect();
        assert_eq!(coerced, vec![2, 3, 4]);
    }

    #[test]
    fn oversized_fields_are_dropped_from_the_end() {
        let (v, sink) = validator();
        let mut cells = base_row();
        for i in 0..10 {
            cells.push(Cell::from(format!("n{i}")));
            cells.push(Cell::from("x".repeat(1000)));
        }
        let tile = &v.build_tiles(&[cells])[0];

        assert!(tile.serialized_len() <= limits::TOTAL);
        assert_eq!(tile.fields.len(), 5);
        assert!(sink.snapshot().contains(&Diagnostic::FieldsDropped {
            row: 0,
            dropped: 5,
            reason: DropReason::SizeBudget,
        }));
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let (v, sink) = validator();
        assert!(v.build_tiles(&[]).is_empty());
        assert!(sink.is_empty());
    }

    fn arb_cell() -> impl Strategy<Value = Cell> {
        prop_oneof![
            Just(Cell::Empty),
            "[a-z~ ]{0,40}".prop_map(Cell::Text),
            (0usize..3000).prop_map(|n| Cell::Text("é".repeat(n))),
            any::<u32>().prop_map(Cell::from),
        ]
    }

    proptest! {
        #[test]
        fn tiles_respect_every_limit(rows in prop::collection::vec(prop::collection::vec(arb_cell(), 0..70), 0..6)) {
            let (v, _) = validator();
            let tiles = v.build_tiles(&rows);
            let usable = rows.iter().filter(|r| r.len() >= limits::REQUIRED_CELLS).count();
            prop_assert_eq!(tiles.len(), usable);

            for tile in &tiles {
                prop_assert!(tile.title.chars().count() <= limits::TITLE);
                prop_assert!(tile.description.chars().count() <= limits::DESCRIPTION);
                prop_assert!(tile.author_name.as_ref().is_none_or(|a| a.chars().count() <= limits::AUTHOR));
                prop_assert!(tile.footer_text.as_ref().is_none_or(|f| f.chars().count() <= limits::FOOTER));
                prop_assert!(tile.fields.len() <= limits::MAX_FIELDS);
                for field in &tile.fields {
                    prop_assert!(field.name.chars().count() <= limits::FIELD_NAME);
                    prop_assert!(field.value.chars().count() <= limits::FIELD_VALUE);
                }
                prop_assert!(tile.serialized_len() <= limits::TOTAL);
                prop_assert!(tile.accent_color <= limits::MAX_COLOR);

                let mut again = tile.clone();
                prop_assert!(again.fit_to_budget().is_noop());
                prop_assert_eq!(&again, tile);
            }
        }
    }
}
