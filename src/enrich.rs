//! Store-first station enrichment.
//!
//! [`EnrichmentCache::resolve`] answers from the local [`StationStore`] when
//! it can and otherwise asks the callbook once. A session expiry gets exactly
//! one re-login and retry. Definitive answers (found or not found) are stored;
//! errors are not, so a later spot can try again.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::qrz::{CallbookService, LookupOutcome};
use crate::station::Resolution;
use crate::stats::LookupStats;
use crate::store::{CacheEntry, StationStore, StoreError};

pub struct EnrichmentCache<S> {
    service: S,
    store: StationStore,
    stats: LookupStats,
}

impl<S: CallbookService> EnrichmentCache<S> {
    pub fn new(service: S, store: StationStore) -> Self {
        Self {
            service,
            store,
            stats: LookupStats::new(),
        }
    }

    /// Resolve a call sign to station data.
    pub async fn resolve(&mut self, call_sign: &str) -> Resolution {
        if let Some(entry) = self.store.get(call_sign) {
            self.stats.cache_hits += 1;
            debug!("Cache hit for {}", call_sign);
            return match entry {
                CacheEntry::Found(record) => Resolution::Found(record.clone()),
                CacheEntry::NotFound => Resolution::NotFound,
            };
        }

        debug!("Cache miss for {}", call_sign);
        let started = Instant::now();
        let mut outcome = self.remote_lookup(call_sign).await;

        if outcome == LookupOutcome::SessionExpired {
            info!("Callbook session expired, logging in again");
            self.stats.session_renewals += 1;
            outcome = match self.service.login().await {
                Ok(()) => self.remote_lookup(call_sign).await,
                Err(e) => LookupOutcome::ServiceError(e.to_string()),
            };
        }
        self.stats.record_latency(started.elapsed());

        match outcome {
            LookupOutcome::Found(record) => {
                self.persist(call_sign, CacheEntry::Found(record.clone()));
                Resolution::Found(record)
            }
            LookupOutcome::NotFound => {
                self.stats.not_found += 1;
                debug!("{} not in callbook", call_sign);
                self.persist(call_sign, CacheEntry::NotFound);
                Resolution::NotFound
            }
            LookupOutcome::SessionExpired => {
                self.stats.errors += 1;
                warn!("Callbook session expired again while looking up {}", call_sign);
                Resolution::Error("session expired after re-login".to_string())
            }
            LookupOutcome::ServiceError(message) => {
                self.stats.errors += 1;
                warn!("Callbook lookup for {} failed: {}", call_sign, message);
                Resolution::Error(message)
            }
        }
    }

    async fn remote_lookup(&mut self, call_sign: &str) -> LookupOutcome {
        self.stats.remote_lookups += 1;
        self.service.lookup(call_sign).await
    }

    fn persist(&mut self, call_sign: &str, entry: CacheEntry) {
        if let Err(e) = self.store.insert(call_sign, entry) {
            self.stats.store_failures += 1;
            error!("Could not save {} to the station store: {}", call_sign, e);
        }
    }

    /// Flush the store to disk.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.store.flush()
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn store(&self) -> &StationStore {
        &self.store
    }

    pub fn stats(&self) -> &LookupStats {
        &self.stats
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};

    use crate::qrz::{CallbookError, CallbookService, LookupOutcome};
    use crate::station::StationRecord;

    /// In-memory callbook that counts calls.
    ///
    /// Scripted outcomes are returned first, in order; after that, known
    /// records are found and everything else is not found.
    #[derive(Default)]
    pub struct ScriptedCallbook {
        pub records: HashMap<String, StationRecord>,
        pub script: VecDeque<LookupOutcome>,
        pub fail_login: bool,
        pub lookups: Vec<String>,
        pub logins: usize,
    }

    impl ScriptedCallbook {
        pub fn with_records(records: impl IntoIterator<Item = StationRecord>) -> Self {
            Self {
                records: records
                    .into_iter()
                    .map(|r| (r.call_sign.clone(), r))
                    .collect(),
                ..Default::default()
            }
        }

        pub fn scripted(script: impl IntoIterator<Item = LookupOutcome>) -> Self {
            Self {
                script: script.into_iter().collect(),
                ..Default::default()
            }
        }
    }

    impl CallbookService for ScriptedCallbook {
        async fn login(&mut self) -> Result<(), CallbookError> {
            self.logins += 1;
            if self.fail_login {
                Err(CallbookError::Login("bad password".to_string()))
            } else {
                Ok(())
            }
        }

        async fn lookup(&mut self, call_sign: &str) -> LookupOutcome {
            self.lookups.push(call_sign.to_string());
            if let Some(outcome) = self.script.pop_front() {
                return outcome;
            }
            match self.records.get(call_sign) {
                Some(record) => LookupOutcome::Found(record.clone()),
                None => LookupOutcome::NotFound,
            }
        }
    }
}
