//! # Engine Configuration & Constants
//!
//! Every magic number the engine relies on lives here. Product-specific
//! bounds (tenor ranges, collateral ratios, interest rates) belong to the
//! individual instrument policies in `fsp-contracts`, not here.

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Length of an [`Address`](crate::types::Address) in bytes. Twenty bytes,
/// same as the account format the original deployments used.
pub const ADDRESS_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Seconds in one day. Tenors and engagement windows are expressed in days.
pub const SECONDS_PER_DAY: i64 = 86_400;

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Version byte prepended to every encoded issuance snapshot. Bump when the
/// snapshot layout changes; decoders reject versions they don't know.
pub const CODEC_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Custom Data Tags
// ---------------------------------------------------------------------------

/// `custom_data` tag that returns the codec-encoded issuance snapshot.
pub const ISSUANCE_STATE_TAG: &str = "issuance_state";

// ---------------------------------------------------------------------------
// Custom Event Tags
// ---------------------------------------------------------------------------

/// Maker (or the FSP after the override timestamp) withdraws an
/// unengaged offer.
pub const EVENT_CANCEL_ISSUANCE: &str = "cancel_issuance";

/// Anyone may report that the engagement window has lapsed.
pub const EVENT_ENGAGEMENT_DUE: &str = "engagement_due";

/// Anyone may report that an engaged issuance has passed its due timestamp.
pub const EVENT_ISSUANCE_DUE: &str = "issuance_due";

// ---------------------------------------------------------------------------
// Error Reasons
// ---------------------------------------------------------------------------

/// Reason string for any mutating call against a terminal issuance.
pub const REASON_TERMINATED: &str = "Issuance terminated";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tags_are_distinct() {
        assert_ne!(EVENT_CANCEL_ISSUANCE, EVENT_ENGAGEMENT_DUE);
        assert_ne!(EVENT_ENGAGEMENT_DUE, EVENT_ISSUANCE_DUE);
        assert_ne!(EVENT_CANCEL_ISSUANCE, EVENT_ISSUANCE_DUE);
    }

    #[test]
    fn codec_version_is_nonzero() {
        // Zero is reserved so an all-zero buffer never decodes.
        assert!(CODEC_VERSION > 0);
    }
}
