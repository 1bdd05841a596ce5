//! Identifier generation for items, images and sessions.

use uuid::Uuid;

fn short_hex() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// `ITEM-` followed by 8 upper-case hex digits.
pub fn item_id() -> String {
    format!("ITEM-{}", short_hex().to_uppercase())
}

/// `IMG-` followed by 8 upper-case hex digits.
pub fn image_id() -> String {
    format!("IMG-{}", short_hex().to_uppercase())
}

/// 8 lower-case hex digits.
pub fn session_id() -> String {
    short_hex()
}
