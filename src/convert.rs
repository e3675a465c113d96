//! Script normalization seam.
//!
//! The reference deployment normalizes traditional-script titles and artist
//! names to simplified script before tagging. That converter lives behind
//! this trait; the contract is that normalization never fails visibly — an
//! implementation that cannot convert returns its input unchanged.

/// Normalizes artist/title text before it is used for tagging and file names.
pub trait ScriptNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Pass-through normalizer used when no converter is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl ScriptNormalizer for IdentityNormalizer {
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_returns_input_unchanged() {
        let n = IdentityNormalizer;
        assert_eq!(n.normalize("劉德華"), "劉德華");
        assert_eq!(n.normalize(""), "");
    }
}
