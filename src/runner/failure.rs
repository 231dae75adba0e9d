//! Maps the extractor's untyped failure text onto [`JobError`].
//!
//! yt-dlp only reports failures as text, so substring matching is unavoidable; it lives
//! here and nowhere else.

use crate::utils::truncate_message;
use crate::JobError;

const RATE_LIMIT_MARKERS: &[&str] = &["rate-limited", "rate limited", "too many requests", "http error 429"];

const UNAVAILABLE_MARKERS: &[&str] = &[
    "video unavailable",
    "content is not available",
    "this video is not available",
    "private video",
    "has been removed",
    "not available in your country",
];

const CREDENTIAL_MARKERS: &[&str] = &[
    // credential source itself is unusable
    "cookie",
    "browser",
    "keyring",
    "failed to decrypt",
    // site refused the session
    "forbidden",
    "http error 403",
    "http error 400",
    "bad request",
    "sign in to confirm",
    "login required",
];

/// Classify a raw extractor failure, truncating any carried detail to `max_chars`.
pub fn classify_failure(raw: &str, max_chars: usize) -> JobError {
    let lower = raw.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| lower.contains(marker));

    if contains_any(RATE_LIMIT_MARKERS) {
        JobError::RateLimited
    } else if contains_any(UNAVAILABLE_MARKERS) {
        JobError::ResourceUnavailable
    } else if contains_any(CREDENTIAL_MARKERS) {
        JobError::CredentialSourceFailure(truncate_message(raw, max_chars))
    } else {
        JobError::Unclassified(truncate_message(raw, max_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit() {
        let raw = "ERROR: [youtube] abc: The current session has been rate-limited by YouTube for up to an hour";
        assert_eq!(classify_failure(raw, 200), JobError::RateLimited);
        assert_eq!(classify_failure("HTTP Error 429: Too Many Requests", 200), JobError::RateLimited);
    }

    #[test]
    fn test_rate_limit_wins_over_cookie_hint() {
        let raw = "rate-limited by YouTube. Use --cookies-from-browser for the authentication";
        assert_eq!(classify_failure(raw, 200), JobError::RateLimited);
    }

    #[test]
    fn test_unavailable() {
        assert_eq!(
            classify_failure("ERROR: [youtube] abc: Video unavailable", 200),
            JobError::ResourceUnavailable
        );
        assert_eq!(
            classify_failure("ERROR: [youtube] abc: Private video. Sign in if you've been granted access", 200),
            JobError::ResourceUnavailable
        );
    }

    #[test]
    fn test_server_outage_is_not_reported_as_missing_content() {
        let raw = "ERROR: unable to download video data: HTTP Error 503: Service Unavailable";
        assert!(matches!(classify_failure(raw, 200), JobError::Unclassified(_)));
    }

    #[test]
    fn test_credential_source_failures() {
        for raw in [
            "could not find chrome cookies database in \"/home/u/.config/google-chrome\"",
            "Failed to decrypt with DPAPI",
            "ERROR: unable to download video data: HTTP Error 403: Forbidden",
            "ERROR: [youtube] abc: Sign in to confirm you're not a bot",
            "HTTP Error 400: Bad Request",
        ] {
            let error = classify_failure(raw, 200);
            assert!(error.allows_credential_fallback(), "expected credential failure for {raw:?}");
        }
    }

    #[test]
    fn test_unclassified_is_truncated() {
        let raw = "x".repeat(500);
        match classify_failure(&raw, 100) {
            JobError::Unclassified(detail) => assert_eq!(detail.chars().count(), 100),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_only_credential_failures_fall_back() {
        assert!(!JobError::RateLimited.allows_credential_fallback());
        assert!(!JobError::ResourceUnavailable.allows_credential_fallback());
        assert!(!JobError::Unclassified("x".into()).allows_credential_fallback());
        assert!(!JobError::InvalidInput("x".into()).allows_credential_fallback());
    }
}
