// SecretMasker: thread-safe store of secret values, replaced in output strings.
// Every logger the engine hands out runs its lines through the shared masker.

use crate::constants::{DEFAULT_MIN_SECRET_LENGTH, MASK};
use conveyor_sdk::StringUtil;
use parking_lot::RwLock;
use std::sync::Arc;

/// A thread-safe secret masker that replaces registered secret values
/// in arbitrary strings with `***`.
#[derive(Debug, Clone)]
pub struct SecretMasker {
    inner: Arc<RwLock<SecretMaskerInner>>,
}

#[derive(Debug)]
struct SecretMaskerInner {
    /// Registered secret lines, longest first.
    secrets: Vec<String>,
    /// Values shorter than this are refused at registration.
    min_length: usize,
}

impl Default for SecretMasker {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretMasker {
    /// Create a new empty `SecretMasker` with the default minimum length.
    pub fn new() -> Self {
        Self::with_min_length(DEFAULT_MIN_SECRET_LENGTH)
    }

    pub fn with_min_length(min_length: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SecretMaskerInner {
                secrets: Vec::new(),
                min_length,
            })),
        }
    }

    pub fn min_length(&self) -> usize {
        self.inner.read().min_length
    }

    /// Whether a single line is long enough to be worth masking.
    pub fn is_maskable(&self, line: &str) -> bool {
        line.len() >= self.min_length() && !line.trim().is_empty()
    }

    /// Register a secret value. Multiline values are registered line by line;
    /// lines below the minimum length are skipped.
    ///
    /// Returns the number of lines newly registered.
    pub fn add_value(&self, secret: &str) -> usize {
        let mut inner = self.inner.write();
        let min_length = inner.min_length;
        let mut added = 0;
        for line in StringUtil::lines_without_cr(secret) {
            if line.len() < min_length || line.trim().is_empty() {
                continue;
            }
            if !inner.secrets.iter().any(|s| s == line) {
                inner.secrets.push(line.to_string());
                added += 1;
            }
        }
        if added > 0 {
            // Longer secrets first so a secret that contains another is masked whole.
            inner.secrets.sort_by(|a, b| b.len().cmp(&a.len()));
        }
        added
    }

    /// Remove all registered secrets.
    pub fn clear(&self) {
        self.inner.write().secrets.clear();
    }

    /// Replace all registered secret values in `input` with `***`.
    pub fn mask_secrets(&self, input: &str) -> String {
        let inner = self.inner.read();
        let shortest = inner.secrets.last().map(String::len).unwrap_or(0);
        if inner.secrets.is_empty() || input.len() < shortest {
            return input.to_string();
        }

        let mut result = input.to_string();
        for secret in &inner.secrets {
            if result.contains(secret.as_str()) {
                result = result.replace(secret.as_str(), MASK);
            }
        }
        result
    }

    pub fn contains(&self, secret: &str) -> bool {
        self.inner.read().secrets.iter().any(|s| s == secret)
    }

    /// Returns the number of registered secret lines.
    pub fn secret_count(&self) -> usize {
        self.inner.read().secrets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_single_secret() {
        let masker = SecretMasker::new();
        masker.add_value("sk_live_ABCDEFG");
        assert_eq!(
            masker.mask_secrets("token=sk_live_ABCDEFG;"),
            "token=***;"
        );
    }

    #[test]
    fn test_mask_overlapping_secrets() {
        let masker = SecretMasker::new();
        masker.add_value("pass");
        masker.add_value("password");
        assert_eq!(masker.mask_secrets("my password is here"), "my *** is here");
    }

    #[test]
    fn test_multiline_registered_per_line() {
        let masker = SecretMasker::new();
        let added = masker.add_value("first-line\r\nab\nthird-line\n");
        assert_eq!(added, 2);
        assert!(masker.contains("first-line"));
        assert!(masker.contains("third-line"));
        assert!(!masker.contains("ab"));
        assert_eq!(masker.mask_secrets("x first-line y ab"), "x *** y ab");
    }

    #[test]
    fn test_short_and_blank_values_ignored() {
        let masker = SecretMasker::with_min_length(6);
        assert_eq!(masker.add_value("short"), 0);
        assert_eq!(masker.add_value("      "), 0);
        assert_eq!(masker.secret_count(), 0);
        assert!(!masker.is_maskable("short"));
        assert!(masker.is_maskable("longer"));
    }

    #[test]
    fn test_duplicates_not_counted() {
        let masker = SecretMasker::new();
        assert_eq!(masker.add_value("repeated"), 1);
        assert_eq!(masker.add_value("repeated"), 0);
        assert_eq!(masker.secret_count(), 1);
        masker.clear();
        assert_eq!(masker.secret_count(), 0);
    }

    #[test]
    fn test_no_secrets_passthrough() {
        let masker = SecretMasker::new();
        assert_eq!(masker.mask_secrets("hello world"), "hello world");
    }
}
