/*!
Form-style escaping of string metadata values.

Space becomes `+` and every byte outside `A-Z a-z 0-9 - _ . ~` becomes `%XX`,
so escaped values are safe to carry inside a single header slot.
*/

use crate::{Result, StoreError};

/// Escape a string value for the modern header slot.
pub fn escape(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

/// Reverse [`escape`].
///
/// Unknown `%` sequences are kept literally; decoded bytes that are not valid
/// UTF-8 are reported as a malformed payload.
pub fn unescape(value: &str) -> Result<String> {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| StoreError::malformed("modern", format!("escaped value is not UTF-8: {e}")))
}
