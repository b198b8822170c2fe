//! Tracing initialization.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` (default `info`).
/// `LOG_FORMAT=json` switches to structured JSON output for log shipping.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Mask a secret for log output: keep the first two characters only.
pub fn mask_secret(value: &str) -> String {
    if value.len() <= 2 {
        return "***".to_string();
    }
    format!("{}***", &value[..2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("supersecret"), "su***");
        assert_eq!(mask_secret("ab"), "***");
        assert_eq!(mask_secret(""), "***");
    }
}
