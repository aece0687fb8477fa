use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("{what} must be {expected} bytes, got {actual}")]
    InvalidKeyLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{0} is not valid base64")]
    InvalidEncoding(&'static str),

    #[error("certified post-quantum provider is unavailable in this build")]
    ProviderUnavailable,

    #[error("simulated key material requested without explicit insecure opt-in")]
    InsecureModeRefused,

    #[error("provider operation failed: {0}")]
    Provider(&'static str),
}
