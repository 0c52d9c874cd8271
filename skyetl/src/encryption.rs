use std::sync::Once;

static CRYPTO_PROVIDER: Once = Once::new();

/// Selects `aws-lc-rs` as the process-wide rustls provider used by the firehose socket and the
/// search API. Later calls, or a provider installed elsewhere first, leave it unchanged.
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}
