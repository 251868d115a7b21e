use std::sync::Arc;

use crate::storage::Storage;
use crate::Result;

const COUNT_KEY: &str = "visitor_count";
const SESSION_FLAG_KEY: &str = "visit_counted";

/// Persisted visit counter. The durable store outlives the process; the
/// session store lives as long as one browsing session, which is what makes
/// the increment happen at most once per session no matter how often the
/// counter is mounted.
pub struct VisitorCounter {
    durable: Arc<dyn Storage>,
    session: Arc<dyn Storage>,
}

impl VisitorCounter {
    pub fn new(durable: Arc<dyn Storage>, session: Arc<dyn Storage>) -> Self {
        Self { durable, session }
    }

    /// Count this mount and return the total. Idempotent within a session.
    pub fn record(&self) -> Result<u64> {
        let count = self.current()?;
        if self.session.get(SESSION_FLAG_KEY)?.is_some() {
            return Ok(count);
        }
        let count = count + 1;
        self.durable.set(COUNT_KEY, &count.to_string())?;
        self.session.set(SESSION_FLAG_KEY, "1")?;
        debug!("visit recorded, total {}", count);
        Ok(count)
    }

    /// The persisted total without counting anything.
    pub fn current(&self) -> Result<u64> {
        // missing or mangled values read as zero
        Ok(self
            .durable
            .get(COUNT_KEY)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn counts_once_per_session() {
        let durable: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let session: Arc<dyn Storage> = Arc::new(MemoryStorage::new());

        let counter = VisitorCounter::new(durable.clone(), session.clone());
        assert_eq!(counter.record().unwrap(), 1);
        // remounting within the same session changes nothing
        assert_eq!(counter.record().unwrap(), 1);
        let remounted = VisitorCounter::new(durable.clone(), session);
        assert_eq!(remounted.record().unwrap(), 1);

        // a fresh session increments
        let new_session: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let counter = VisitorCounter::new(durable, new_session);
        assert_eq!(counter.record().unwrap(), 2);
    }

    #[test]
    fn mangled_count_reads_as_zero() {
        let durable: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        durable.set(COUNT_KEY, "not a number").unwrap();
        let counter = VisitorCounter::new(durable, Arc::new(MemoryStorage::new()));
        assert_eq!(counter.current().unwrap(), 0);
        assert_eq!(counter.record().unwrap(), 1);
    }
}
