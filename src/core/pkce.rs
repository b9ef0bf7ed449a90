//! PKCE and State Generation
//!
//! RFC 7636 Proof Key for Code Exchange and the `state` values that bind a
//! redirect to the request that produced it.

use base64::Engine;
use parking_lot::Mutex;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::types::{PkceMethod, PkceParams};

const MIN_VERIFIER_LENGTH: usize = 43;
const MAX_VERIFIER_LENGTH: usize = 128;

/// PKCE generator interface (for dependency injection).
pub trait PkceGenerator: Send + Sync {
    /// Generate PKCE parameters.
    fn generate(&self, method: PkceMethod) -> PkceParams;

    /// Generate an opaque `state` value.
    fn generate_state(&self) -> String;
}

/// Default PKCE generator implementation.
pub struct DefaultPkceGenerator {
    verifier_length: usize,
}

impl DefaultPkceGenerator {
    /// Create new PKCE generator with default verifier length (64).
    pub fn new() -> Self {
        Self::with_length(64)
    }

    /// Create PKCE generator with custom verifier length, clamped to 43..=128.
    pub fn with_length(length: usize) -> Self {
        Self {
            verifier_length: length.clamp(MIN_VERIFIER_LENGTH, MAX_VERIFIER_LENGTH),
        }
    }

    fn generate_verifier(&self) -> String {
        let mut rng = rand::thread_rng();
        let bytes_needed = (self.verifier_length * 3 + 3) / 4;
        let random_bytes: Vec<u8> = (0..bytes_needed).map(|_| rng.gen()).collect();

        let mut encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&random_bytes);
        encoded.truncate(self.verifier_length);
        encoded
    }
}

impl Default for DefaultPkceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceGenerator for DefaultPkceGenerator {
    fn generate(&self, method: PkceMethod) -> PkceParams {
        let code_verifier = self.generate_verifier();
        let code_challenge = compute_challenge(&code_verifier, method);

        PkceParams {
            code_verifier,
            code_challenge,
            code_challenge_method: method,
        }
    }

    fn generate_state(&self) -> String {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Compute the code challenge for a verifier.
pub fn compute_challenge(verifier: &str, method: PkceMethod) -> String {
    match method {
        PkceMethod::Plain => verifier.to_string(),
        PkceMethod::S256 => {
            let hash = Sha256::digest(verifier.as_bytes());
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
        }
    }
}

/// Validate PKCE verifier format (RFC 7636 section 4.1).
pub fn is_valid_verifier(verifier: &str) -> bool {
    (MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&verifier.len())
        && verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

/// Mock PKCE generator for testing.
///
/// Hands out queued states first, then `state-1`, `state-2`, ...
#[derive(Default)]
pub struct MockPkceGenerator {
    next_verifier: Mutex<Option<String>>,
    next_states: Mutex<Vec<String>>,
    state_counter: Mutex<u32>,
}

impl MockPkceGenerator {
    /// Create new mock PKCE generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the next verifier to generate.
    pub fn set_next_verifier(&self, verifier: impl Into<String>) -> &Self {
        *self.next_verifier.lock() = Some(verifier.into());
        self
    }

    /// Queue a state value.
    pub fn queue_state(&self, state: impl Into<String>) -> &Self {
        self.next_states.lock().push(state.into());
        self
    }
}

impl PkceGenerator for MockPkceGenerator {
    fn generate(&self, method: PkceMethod) -> PkceParams {
        let code_verifier = self
            .next_verifier
            .lock()
            .take()
            .unwrap_or_else(|| "mock-verifier-0123456789-0123456789-0123456789".to_string());
        let code_challenge = compute_challenge(&code_verifier, method);

        PkceParams {
            code_verifier,
            code_challenge,
            code_challenge_method: method,
        }
    }

    fn generate_state(&self) -> String {
        let mut queued = self.next_states.lock();
        if !queued.is_empty() {
            return queued.remove(0);
        }
        let mut counter = self.state_counter.lock();
        *counter += 1;
        format!("state-{}", *counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_s256() {
        let generator = DefaultPkceGenerator::new();
        let params = generator.generate(PkceMethod::S256);

        assert_eq!(params.code_verifier.len(), 64);
        assert!(is_valid_verifier(&params.code_verifier));
        assert_ne!(params.code_verifier, params.code_challenge);
        assert_eq!(params.code_challenge_method, PkceMethod::S256);
    }

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        let challenge = compute_challenge(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            PkceMethod::S256,
        );
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_length_is_clamped() {
        let generator = DefaultPkceGenerator::with_length(10);
        assert_eq!(generator.generate(PkceMethod::Plain).code_verifier.len(), 43);
    }

    #[test]
    fn test_states_are_unique() {
        let generator = DefaultPkceGenerator::new();
        assert_ne!(generator.generate_state(), generator.generate_state());
    }

    #[test]
    fn test_invalid_verifier() {
        assert!(!is_valid_verifier("short"));
        assert!(!is_valid_verifier(&"a".repeat(129)));
        assert!(!is_valid_verifier(&format!("{}!", "a".repeat(50))));
    }

    #[test]
    fn test_mock_generator_states() {
        let generator = MockPkceGenerator::new();
        generator.queue_state("fixed");
        assert_eq!(generator.generate_state(), "fixed");
        assert_eq!(generator.generate_state(), "state-1");
        assert_eq!(generator.generate_state(), "state-2");
    }
}
