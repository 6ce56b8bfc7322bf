//! Metric descriptions for the exchange engine
//!
//! Recording goes through the `metrics` facade; installing a recorder or
//! exporter is up to the application.

use metrics::{describe_counter, describe_histogram, Unit};

pub const EXCHANGES_TOTAL: &str = "as4_exchanges_total";
pub const TRANSMIT_ATTEMPTS_TOTAL: &str = "as4_transmit_attempts_total";
pub const RETRIES_TOTAL: &str = "as4_retries_total";
pub const SIGNATURES_CREATED_TOTAL: &str = "as4_signatures_created_total";
pub const SIGNATURE_VERIFICATIONS_TOTAL: &str = "as4_signature_verifications_total";
pub const EXCHANGE_DURATION_SECONDS: &str = "as4_exchange_duration_seconds";

/// Register descriptions for every metric the engine records
pub fn init_metrics() {
    describe_counter!(EXCHANGES_TOTAL, "Completed exchanges, labelled by result");
    describe_counter!(TRANSMIT_ATTEMPTS_TOTAL, "Transmission attempts, retries included");
    describe_counter!(RETRIES_TOTAL, "Retries after a retriable transport failure");
    describe_counter!(SIGNATURES_CREATED_TOTAL, "Outgoing messages signed");
    describe_counter!(
        SIGNATURE_VERIFICATIONS_TOTAL,
        "Incoming signature verifications, labelled by result"
    );
    describe_histogram!(
        EXCHANGE_DURATION_SECONDS,
        Unit::Seconds,
        "Wall time of an exchange from build to delivery"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        // no recorder installed; describing must still be a no-op
        init_metrics();
    }
}
