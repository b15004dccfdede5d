//! Utility functions for the room relay

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Number of symbols in an invite code
pub const INVITE_CODE_LENGTH: usize = 8;

/// Alphabet invite codes are drawn from
pub const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a new unique room ID
pub fn generate_room_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique connection ID
pub fn generate_connection_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Draw an invite code uniformly from `[A-Z0-9]`
pub fn generate_invite_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..INVITE_CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..INVITE_CODE_ALPHABET.len());
            INVITE_CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Build the shareable link for an invite code
pub fn invite_link(public_base_url: &str, invite_code: &str) -> String {
    format!(
        "{}/invite/{}",
        public_base_url.trim_end_matches('/'),
        invite_code
    )
}
