//! Payload → tiles pipeline: decode, validate, render.

pub mod decode;
pub mod render;
pub mod spec;
pub mod validate;

use crate::tiles::decode::{DecodeError, decode};
use crate::tiles::spec::TileSpecification;
use crate::tiles::validate::RowValidator;

/// Decode `raw` and build its tiles. An empty vector is a valid outcome.
pub fn build_from_payload(
    raw: &str,
    validator: &RowValidator,
) -> Result<Vec<TileSpecification>, DecodeError> {
    let rows = decode(raw)?;
    Ok(validator.build_tiles(&rows))
}
