pub mod api;
pub mod memory;
pub mod traits;

pub use api::ApiClient;
pub use traits::{
    BrightnessSensor, Clock, KeepAwake, LifecycleCallback, LifecycleSource, RewardSink,
    StatisticsSink, Subscription, SystemClock,
};

/// Thin wrapper around the OS keyring for credential storage.
pub mod keyring_store {
    use crate::error::Result;

    const SERVICE: &str = "focusmode";

    pub fn get(key: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<()> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    pub fn delete(key: &str) -> Result<()> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
