use std::thread;
use std::time::Duration;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::op::UpdateOutcome;
use crate::store::Store;

/// Fixed-count, fixed-delay retry for single-document updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde(with = "duration_secs")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::ZERO,
        }
    }
}

/// `$set` `fields` on one document, retrying failed attempts per `policy`.
///
/// A missing document is not an error and is not retried. Returns `None`
/// when every attempt failed; the document is then skipped by the caller.
pub fn update_with_retry<S: Store + ?Sized>(
    store: &S,
    id: &Bson,
    fields: &Document,
    policy: RetryPolicy,
) -> Option<UpdateOutcome> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match store.update_one(id, fields) {
            Ok(outcome) => {
                if outcome.matched == 0 {
                    warn!(id = %id, "no document found to update");
                } else {
                    info!(id = %id, "document updated");
                }
                return Some(outcome);
            }
            Err(e) => {
                error!(id = %id, attempt, error = %e, "error updating document");
                if attempt < attempts {
                    info!(delay_secs = policy.delay.as_secs_f64(), "retrying update");
                    thread::sleep(policy.delay);
                }
            }
        }
    }
    error!(id = %id, "final retry failed, skipping document");
    None
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs.max(0.0)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_reads_fractional_seconds() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"attempts": 2, "delay": 0.25}"#).unwrap();
        assert_eq!(policy.delay, Duration::from_millis(250));
        let negative: RetryPolicy =
            serde_json::from_str(r#"{"attempts": 2, "delay": -4}"#).unwrap();
        assert_eq!(negative.delay, Duration::ZERO);
    }

    #[test]
    fn oversized_delay_is_an_error() {
        let parsed = serde_json::from_str::<RetryPolicy>(r#"{"attempts": 2, "delay": 1e300}"#);
        assert!(parsed.is_err());
    }
}
