//! Process-wide invite pacing.
//!
//! Single writer (the operator conversation), many concurrent readers (the
//! invite workers). Workers call [`DelaySettings::next_delay`] immediately
//! before each sleep so a mid-run change takes effect on the next item.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;

use crate::{
    domain::DelayPolicy,
    store::{RecordStore, SettingsDoc},
    Error, Result,
};

pub struct DelaySettings {
    store: Arc<dyn RecordStore>,
    policy: RwLock<DelayPolicy>,
}

impl DelaySettings {
    pub fn load(store: Arc<dyn RecordStore>, default_secs: u64) -> Self {
        let policy = store
            .load_settings()
            .map(|doc| doc.delay)
            .unwrap_or(DelayPolicy::Fixed {
                seconds: default_secs.max(1),
            });
        Self {
            store,
            policy: RwLock::new(policy),
        }
    }

    pub fn current(&self) -> DelayPolicy {
        match self.policy.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replace the policy and persist it. Delays are clamped to >= 1 second;
    /// an inverted random range is an input error.
    pub fn set(&self, policy: DelayPolicy) -> Result<DelayPolicy> {
        let policy = match policy {
            DelayPolicy::Fixed { seconds } => DelayPolicy::Fixed {
                seconds: seconds.max(1),
            },
            DelayPolicy::RandomRange {
                low_seconds,
                high_seconds,
            } => {
                let low = low_seconds.max(1);
                if high_seconds < low {
                    return Err(Error::Input(format!(
                        "random delay range is inverted: {low_seconds} > {high_seconds}"
                    )));
                }
                DelayPolicy::RandomRange {
                    low_seconds: low,
                    high_seconds,
                }
            }
        };

        match self.policy.write() {
            Ok(mut guard) => *guard = policy,
            Err(poisoned) => *poisoned.into_inner() = policy,
        }
        self.store.save_settings(&SettingsDoc { delay: policy })?;
        Ok(policy)
    }

    /// Resolve the next pacing sleep from the current policy.
    pub fn next_delay(&self) -> Duration {
        match self.current() {
            DelayPolicy::Fixed { seconds } => Duration::from_secs(seconds),
            DelayPolicy::RandomRange {
                low_seconds,
                high_seconds,
            } => {
                let secs = rand::thread_rng().gen_range(low_seconds..=high_seconds);
                Duration::from_secs(secs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::temp_store;

    #[tokio::test]
    async fn fixed_delay_is_clamped_to_one_second() {
        let settings = DelaySettings::load(Arc::new(temp_store("delay-clamp")), 60);
        let applied = settings.set(DelayPolicy::Fixed { seconds: 0 }).unwrap();
        assert_eq!(applied, DelayPolicy::Fixed { seconds: 1 });
        assert_eq!(settings.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let settings = DelaySettings::load(Arc::new(temp_store("delay-range")), 60);
        let err = settings.set(DelayPolicy::RandomRange {
            low_seconds: 30,
            high_seconds: 10,
        });
        assert!(matches!(err, Err(Error::Input(_))));
        // Policy unchanged.
        assert_eq!(settings.current(), DelayPolicy::Fixed { seconds: 60 });
    }

    #[tokio::test]
    async fn random_delay_stays_within_bounds() {
        let settings = DelaySettings::load(Arc::new(temp_store("delay-bounds")), 60);
        settings
            .set(DelayPolicy::RandomRange {
                low_seconds: 2,
                high_seconds: 5,
            })
            .unwrap();
        for _ in 0..50 {
            let d = settings.next_delay();
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn persisted_policy_survives_reload() {
        let store = Arc::new(temp_store("delay-reload"));
        let settings = DelaySettings::load(store.clone(), 60);
        settings.set(DelayPolicy::Fixed { seconds: 7 }).unwrap();

        let reloaded = DelaySettings::load(store, 60);
        assert_eq!(reloaded.current(), DelayPolicy::Fixed { seconds: 7 });
    }
}
