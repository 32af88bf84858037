use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

/// Produces single-use anti-replay nonces from a cryptographic RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonceService;

impl NonceService {
    /// Reads `n` bytes from the OS RNG and returns them URL-safe base64
    /// encoded with no padding.
    #[must_use]
    pub fn random_nonce(&self, n: usize) -> String {
        let mut bytes = vec![0u8; n];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::NonceService;

    #[test]
    fn random_nonce_has_no_padding_and_is_url_safe() {
        let service = NonceService;
        let nonce = service.random_nonce(32);
        assert!(!nonce.contains('='));
        assert!(!nonce.contains('+'));
        assert!(!nonce.contains('/'));
    }

    #[test]
    fn random_nonce_is_not_repeated() {
        let service = NonceService;
        let a = service.random_nonce(32);
        let b = service.random_nonce(32);
        assert_ne!(a, b);
    }
}
