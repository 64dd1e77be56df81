use rand::Rng;

const TOKEN_LEN: usize = 12;
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Opaque 12-character identifier used for users and library entries.
pub fn new_id() -> String {
	let mut rng = rand::thread_rng();
	(0..TOKEN_LEN).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}
