use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::config::LimitsConfig;
use crate::error::{AppError, Result};
use crate::models::{ClaimFilter, JobKind, OwnerId};

/// Held while a job runs; dropping it frees both slots.
#[derive(Debug)]
pub struct JobPermit {
    _owner: Option<OwnedSemaphorePermit>,
    _global: OwnedSemaphorePermit,
}

/// Global cap per job kind composed with a per-owner cap per job kind.
///
/// Callers over a cap wait for a slot rather than fail.
pub struct ConcurrencyLimiter {
    limits: LimitsConfig,
    global: HashMap<JobKind, Arc<Semaphore>>,
    per_owner: Mutex<HashMap<(JobKind, OwnerId), Arc<Semaphore>>>,
}

impl ConcurrencyLimiter {
    pub fn new(limits: LimitsConfig) -> Self {
        let global = JobKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(Semaphore::new(limits.get(kind).global.max(1)))))
            .collect();
        Self {
            limits,
            global,
            per_owner: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for an owner slot first, then a global one, so a job stuck behind
    /// its owner's cap does not hold a global slot.
    pub async fn acquire(&self, kind: JobKind, owner: Option<&OwnerId>) -> Result<JobPermit> {
        let owner_permit = match owner {
            Some(owner) => Some(
                self.owner_semaphore(kind, owner)?
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Other(anyhow!(e)))?,
            ),
            None => None,
        };

        let global = self
            .global
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::Other(anyhow!("no limiter for job kind {}", kind)))?;
        let global_permit = global
            .acquire_owned()
            .await
            .map_err(|e| AppError::Other(anyhow!(e)))?;

        Ok(JobPermit {
            _owner: owner_permit,
            _global: global_permit,
        })
    }

    /// Take both slots only if they are free right now.
    pub fn try_acquire(&self, kind: JobKind, owner: Option<&OwnerId>) -> Result<Option<JobPermit>> {
        let owner_permit = match owner {
            Some(owner) => match self.owner_semaphore(kind, owner)?.try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::NoPermits) => return Ok(None),
                Err(e) => return Err(AppError::Other(anyhow!(e))),
            },
            None => None,
        };

        let global = self
            .global
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::Other(anyhow!("no limiter for job kind {}", kind)))?;
        match global.try_acquire_owned() {
            Ok(global_permit) => Ok(Some(JobPermit {
                _owner: owner_permit,
                _global: global_permit,
            })),
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(e) => Err(AppError::Other(anyhow!(e))),
        }
    }

    /// Kinds and owners with no free slot at this moment.
    pub fn saturated(&self) -> Result<ClaimFilter> {
        let kinds = self
            .global
            .iter()
            .filter(|(_, s)| s.available_permits() == 0)
            .map(|(kind, _)| *kind)
            .collect();
        let owners = self
            .per_owner
            .lock()
            .map_err(|_| AppError::Other(anyhow!("limiter lock poisoned")))?
            .iter()
            .filter(|(_, s)| s.available_permits() == 0)
            .map(|(key, _)| key.clone())
            .collect();
        Ok(ClaimFilter { kinds, owners })
    }

    fn owner_semaphore(&self, kind: JobKind, owner: &OwnerId) -> Result<Arc<Semaphore>> {
        let mut map = self
            .per_owner
            .lock()
            .map_err(|_| AppError::Other(anyhow!("limiter lock poisoned")))?;
        let key = (kind, owner.clone());
        if let Some(semaphore) = map.get(&key) {
            return Ok(semaphore.clone());
        }

        // Permits and pending acquires hold a clone, so a lone reference
        // means nobody is using that owner's slots.
        map.retain(|_, s| Arc::strong_count(s) > 1);
        let semaphore = Arc::new(Semaphore::new(self.limits.get(kind).per_owner.max(1)));
        map.insert(key, semaphore.clone());
        Ok(semaphore)
    }

    /// Owners currently holding an entry in the per-owner table.
    pub fn tracked_owners(&self) -> usize {
        self.per_owner.lock().map_or(0, |map| map.len())
    }

    /// Free global slots for `kind`.
    pub fn available(&self, kind: JobKind) -> usize {
        self.global
            .get(&kind)
            .map_or(0, |s| s.available_permits())
    }
}
