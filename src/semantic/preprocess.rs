//! Text and id preparation for the vector index.

use crate::contacts::Sheet;

/// Build the text that gets embedded for a contact.
///
/// Returns `None` if both name and number are empty after trimming.
pub fn contact_document(name: &str, number: &str) -> Option<String> {
    let name = name.trim();
    let number = number.trim();

    match (name.is_empty(), number.is_empty()) {
        (true, true) => None,
        (false, true) => Some(name.to_string()),
        (true, false) => Some(number.to_string()),
        (false, false) => Some(format!("{name} {number}")),
    }
}

/// Vector ids are scoped by sheet since both tables count ids from 0.
pub fn vector_id(sheet: Sheet, id: u64) -> String {
    format!("{}-{id}", sheet.as_str())
}

pub fn parse_vector_id(vector_id: &str) -> Option<(Sheet, u64)> {
    let (sheet, id) = vector_id.rsplit_once('-')?;
    Some((sheet.parse().ok()?, id.parse().ok()?))
}
