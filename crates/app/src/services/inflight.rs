//! Single-flight coordination over the ledger.
//!
//! The first caller to find no live flight for a cache key becomes its owner
//! and is the only one that calls the model client. Everyone else polls the
//! shared inflight row until the owner records a result, the owner fails, or
//! their own deadline passes. Polling keeps the protocol working across
//! processes without any notification channel.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};
use router_core::{CacheEntry, CacheSettings, GenerationOutcome, InflightRecord, InflightStatus};
use router_db::Ledger;
use tracing::{debug, warn};

use crate::config::InflightSettings;
use crate::error::{Result, RouterError};
use crate::util::time::to_time_delta;

/// Role a caller was given for one cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum Ticket {
    /// A live cache entry answered the request; no flight was touched.
    Cached(GenerationOutcome),
    Owner,
    Waiter { started_at: DateTime<Utc> },
}

/// How a wait ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Completed(GenerationOutcome),
    /// The inflight row disappeared and no cache entry replaced it; the caller
    /// should try to acquire ownership again.
    Vanished,
    /// The owner stopped refreshing its `waiting` row for longer than
    /// `stale_after`; the next `acquire` takes the flight over.
    Abandoned,
}

enum Observation {
    Record(InflightRecord),
    Missing(Option<CacheEntry>),
}

#[derive(Clone)]
pub struct InflightCoordinator {
    ledger: Arc<Ledger>,
    settings: InflightSettings,
}

impl InflightCoordinator {
    pub fn new(ledger: Arc<Ledger>, settings: InflightSettings) -> Self {
        Self { ledger, settings }
    }

    pub fn settings(&self) -> &InflightSettings {
        &self.settings
    }

    /// Claims ownership of `cache_key` unless a live flight already holds it.
    ///
    /// With `cache` set, expired entries for `model` are purged and a live
    /// entry is returned as [`Ticket::Cached`] from the same transaction, so a
    /// flight that completed after an earlier cache miss is never repeated.
    /// Finished flights (`success` or `error`) and `waiting` rows older than
    /// `stale_after` are taken over; a fresh `waiting` row makes the caller a
    /// waiter whose wait starts now.
    pub fn acquire(
        &self,
        cache_key: &str,
        model: &str,
        workflow: &str,
        cache: Option<&CacheSettings>,
    ) -> Result<Ticket> {
        let stale_after = to_time_delta(self.settings.stale_after());
        self.ledger.transaction(|tx| -> Result<Ticket> {
            // Stored timestamps keep microseconds; a finer start could sort
            // after a completion recorded in the same microsecond.
            let now = Utc::now().trunc_subsecs(6);
            if let Some(cache) = cache {
                tx.purge_expired_cache(model, now, cache.ttl())?;
                if let Some(entry) = tx.get_cache_entry(cache_key)? {
                    debug!(cache_key, model, "cache hit");
                    return Ok(Ticket::Cached(entry.outcome()));
                }
            }
            match tx.get_inflight(cache_key)? {
                Some(record)
                    if record.status == InflightStatus::Waiting
                        && now.signed_duration_since(record.updated_at) <= stale_after =>
                {
                    debug!(cache_key, owner_model = %record.model_name, "joining inflight generation");
                    Ok(Ticket::Waiter { started_at: now })
                }
                Some(record) => {
                    if record.status == InflightStatus::Waiting {
                        warn!(
                            cache_key,
                            updated_at = %record.updated_at,
                            "taking over stale inflight generation"
                        );
                    } else {
                        debug!(cache_key, status = record.status.as_str(), "starting new flight");
                    }
                    tx.create_inflight(cache_key, model, workflow, now)?;
                    Ok(Ticket::Owner)
                }
                None => {
                    tx.create_inflight(cache_key, model, workflow, now)?;
                    Ok(Ticket::Owner)
                }
            }
        })
    }

    /// Waits up to `timeout` for the flight a waiter joined at `started_at`.
    pub fn wait(
        &self,
        cache_key: &str,
        started_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Resolution> {
        self.wait_until(cache_key, started_at, Instant::now() + timeout)
    }

    pub fn wait_until(
        &self,
        cache_key: &str,
        started_at: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<Resolution> {
        let wait_started = Instant::now();
        let stale_after = to_time_delta(self.settings.stale_after());
        loop {
            match self.observe(cache_key)? {
                Observation::Record(record) => {
                    if let Some(outcome) = record.completed_since(started_at) {
                        debug!(cache_key, "inflight generation completed");
                        return Ok(Resolution::Completed(outcome));
                    }
                    if record.status == InflightStatus::Error {
                        return Err(RouterError::InflightFailed {
                            cache_key: cache_key.to_string(),
                            message: record
                                .error
                                .unwrap_or_else(|| "inflight generation failed".to_string()),
                        });
                    }
                    if record.status == InflightStatus::Waiting
                        && Utc::now().signed_duration_since(record.updated_at) > stale_after
                    {
                        warn!(cache_key, updated_at = %record.updated_at, "inflight owner went stale");
                        return Ok(Resolution::Abandoned);
                    }
                }
                Observation::Missing(Some(entry)) => {
                    debug!(cache_key, "inflight row gone, served from cache");
                    return Ok(Resolution::Completed(entry.outcome()));
                }
                Observation::Missing(None) => {
                    debug!(cache_key, "inflight row vanished");
                    return Ok(Resolution::Vanished);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RouterError::InflightTimeout {
                    cache_key: cache_key.to_string(),
                    waited: now.duration_since(wait_started),
                });
            }
            thread::sleep(self.settings.poll_interval().min(deadline - now));
        }
    }

    /// Records the owner's failure so waiters stop polling.
    pub fn fail(&self, cache_key: &str, message: &str) -> Result<()> {
        let updated = self
            .ledger
            .transaction(|tx| tx.mark_inflight_error(cache_key, message, Utc::now()))?;
        if !updated {
            debug!(cache_key, "inflight row already cleared before failure was recorded");
        }
        Ok(())
    }

    /// Guard for an owned flight that marks it failed if dropped unsettled.
    pub fn own<'a>(&'a self, cache_key: &'a str) -> OwnerGuard<'a> {
        OwnerGuard {
            inflight: self,
            cache_key,
            settled: false,
        }
    }

    fn observe(&self, cache_key: &str) -> Result<Observation> {
        self.ledger
            .transaction(|tx| -> Result<Observation> {
                match tx.get_inflight(cache_key)? {
                    Some(record) => Ok(Observation::Record(record)),
                    None => Ok(Observation::Missing(tx.get_cache_entry(cache_key)?)),
                }
            })
    }
}

/// Held by the owner of a flight until its terminal state is committed.
///
/// Dropping it unsettled (an early `?` return or a panic in the model client)
/// records an error so waiters stop polling and the next caller retries.
pub struct OwnerGuard<'a> {
    inflight: &'a InflightCoordinator,
    cache_key: &'a str,
    settled: bool,
}

impl OwnerGuard<'_> {
    /// The owner's terminal write has been committed.
    pub fn settle(mut self) {
        self.settled = true;
    }

    /// Records `message` as the flight's failure and settles the guard.
    pub fn fail(mut self, message: &str) -> Result<()> {
        self.inflight.fail(self.cache_key, message)?;
        self.settled = true;
        Ok(())
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let result = self.inflight.ledger.transaction(|tx| {
            tx.mark_inflight_error(self.cache_key, "owner exited without a result", Utc::now())
        });
        match result {
            Ok(_) => warn!(cache_key = self.cache_key, "inflight owner exited without a result"),
            Err(err) => warn!(
                cache_key = self.cache_key,
                "could not release abandoned inflight generation: {err}"
            ),
        }
    }
}
