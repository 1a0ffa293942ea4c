use rand::Rng;

const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the public transaction reference used in URLs and emails.
pub const TRANSACTION_REFERENCE_LEN: usize = 10;

/// Generates an opaque uppercase-alphanumeric code. Uniqueness is enforced
/// by the ledger store, not here.
pub fn reference_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}
