use rand::Rng;

pub const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length used for uploaded file names.
pub const UPLOAD_ID_LENGTH: usize = 21;
/// Length used for the suffix of saved downloads.
pub const DOWNLOAD_ID_LENGTH: usize = 8;

/// Random alphanumeric id of exactly `length` characters.
/// No uniqueness guarantee beyond the odds of a 62^length space.
pub fn generate(length: usize) -> String {
    generate_with(&mut rand::thread_rng(), length)
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
