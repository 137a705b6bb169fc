use rand::Rng;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const LENGTH: usize = 8;

/// A random 8-character alphanumeric short code for a new link.
pub fn generate_short_code() -> String {
    let mut rng = rand::thread_rng();
    (0..LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_correct_length_and_alphabet() {
        for _ in 0..100 {
            let code = generate_short_code();
            assert_eq!(code.len(), LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
