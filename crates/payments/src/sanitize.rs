//! Text cleanup DOKU requires for customer and line-item fields. Anything the
//! gateway does not accept makes it reject the whole checkout request.

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_LINE_ITEM_ID_LENGTH: usize = 64;

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            ' ' | '.' | ',' | '-' | '/' | '+' | '=' | '_' | ':' | '\'' | '@' | '%'
        )
}

/// Replaces `&` with `dan` and drops every character outside
/// `[A-Za-z0-9 .,\-/+=_:'@%]`.
pub fn sanitize_text(input: &str) -> String {
    input.replace('&', "dan").chars().filter(|c| is_allowed(*c)).collect()
}

pub fn truncate_chars(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

pub fn sanitize_name(input: &str) -> String {
    truncate_chars(&sanitize_text(input), MAX_NAME_LENGTH)
}

pub fn sanitize_line_item_id(input: &str) -> String {
    truncate_chars(&sanitize_text(input), MAX_LINE_ITEM_ID_LENGTH)
}
