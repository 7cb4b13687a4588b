//! Sequence number allocation for the final code segment
//!
//! Counters are keyed by `(zone, budgetCode, fiscalYear)`. Allocation is a single
//! atomic read-increment-write; a counter that has reached [`MAX_SEQUENCE`] is
//! left untouched and reported as exhausted.
use super::error::EngineError;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Mutex;

pub const MAX_SEQUENCE: u16 = 999;
pub const SEQUENCE_TREE: &str = "sequences";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceScope {
    zone: String,
    budget_code: String,
    fiscal_year: String,
}

impl SequenceScope {
    pub fn new(
        zone: impl Into<String>,
        budget_code: impl Into<String>,
        fiscal_year: impl Into<String>,
    ) -> Self {
        Self {
            zone: zone.into(),
            budget_code: budget_code.into(),
            fiscal_year: fiscal_year.into(),
        }
    }
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.zone, self.budget_code, self.fiscal_year)
    }
}

impl std::fmt::Display for SequenceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

pub trait SequenceAllocator: Send + Sync {
    /// Returns the next value in `1..=MAX_SEQUENCE`, never the same one twice per scope.
    fn allocate(&self, scope: &SequenceScope) -> Result<u16, EngineError>;
}

fn exhausted(scope: &SequenceScope) -> EngineError {
    warn!("sequence counter for {scope} reached {MAX_SEQUENCE}");
    EngineError::SequenceExhausted {
        scope: scope.key(),
    }
}

/// Counters persisted in a sled tree, shared by every process using the database.
#[derive(Clone)]
pub struct SledSequenceAllocator {
    tree: sled::Tree,
}

impl SledSequenceAllocator {
    pub fn open(db: &sled::Db) -> Result<Self, EngineError> {
        Ok(Self {
            tree: db.open_tree(SEQUENCE_TREE)?,
        })
    }

    /// Last value handed out for the scope, 0 if none.
    pub fn current(&self, scope: &SequenceScope) -> Result<u64, EngineError> {
        match self.tree.get(scope.key())? {
            None => Ok(0),
            Some(bytes) => decode_counter(&bytes)
                .ok_or_else(|| EngineError::Codec(format!("corrupt counter for {scope}"))),
        }
    }
}

fn decode_counter(bytes: &[u8]) -> Option<u64> {
    <[u8; 8]>::try_from(bytes).ok().map(u64::from_be_bytes)
}

impl SequenceAllocator for SledSequenceAllocator {
    fn allocate(&self, scope: &SequenceScope) -> Result<u16, EngineError> {
        let mut corrupt = false;
        // sled may run the closure more than once under contention
        let previous = self.tree.fetch_and_update(scope.key(), |old| {
            corrupt = false;
            let current = match old {
                None => 0,
                Some(bytes) => match decode_counter(bytes) {
                    Some(value) => value,
                    None => {
                        corrupt = true;
                        return Some(bytes.to_vec());
                    }
                },
            };
            let next = if current >= MAX_SEQUENCE as u64 {
                current
            } else {
                current + 1
            };
            Some(next.to_be_bytes().to_vec())
        })?;

        if corrupt {
            return Err(EngineError::Codec(format!("corrupt counter for {scope}")));
        }
        let previous = previous.and_then(|bytes| decode_counter(&bytes)).unwrap_or(0);
        if previous >= MAX_SEQUENCE as u64 {
            return Err(exhausted(scope));
        }

        let allocated = (previous + 1) as u16;
        debug!("allocated sequence {allocated:03} for {scope}");
        Ok(allocated)
    }
}

/// Process-local counters. Suitable for tests and single-process previews of the flow.
#[derive(Default)]
pub struct MemorySequenceAllocator {
    counters: Mutex<HashMap<SequenceScope, u16>>,
}

impl MemorySequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a scope at `value`, as if `value` numbers had already been handed out.
    pub fn with_counter(self, scope: SequenceScope, value: u16) -> Self {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(scope, value);
        self
    }
}

impl SequenceAllocator for MemorySequenceAllocator {
    fn allocate(&self, scope: &SequenceScope) -> Result<u16, EngineError> {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let counter = counters.entry(scope.clone()).or_insert(0);
        if *counter >= MAX_SEQUENCE {
            return Err(exhausted(scope));
        }
        *counter += 1;
        Ok(*counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> SequenceScope {
        SequenceScope::new("03", "11020401", "1403")
    }

    #[test]
    fn scopes_count_independently() {
        let allocator = MemorySequenceAllocator::new();
        let other = SequenceScope::new("04", "11020401", "1403");

        assert_eq!(allocator.allocate(&scope()).unwrap(), 1);
        assert_eq!(allocator.allocate(&scope()).unwrap(), 2);
        assert_eq!(allocator.allocate(&other).unwrap(), 1);
    }

    #[test]
    fn memory_counter_never_wraps() {
        let allocator = MemorySequenceAllocator::new().with_counter(scope(), MAX_SEQUENCE - 1);

        assert_eq!(allocator.allocate(&scope()).unwrap(), MAX_SEQUENCE);
        assert!(matches!(
            allocator.allocate(&scope()),
            Err(EngineError::SequenceExhausted { .. })
        ));
    }

    #[test]
    fn sled_counter_persists_and_never_wraps() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let allocator = SledSequenceAllocator::open(&db).unwrap();

        assert_eq!(allocator.allocate(&scope()).unwrap(), 1);
        assert_eq!(allocator.current(&scope()).unwrap(), 1);

        let tree = db.open_tree(SEQUENCE_TREE).unwrap();
        tree.insert(scope().key(), (MAX_SEQUENCE as u64).to_be_bytes().to_vec())
            .unwrap();

        assert!(matches!(
            allocator.allocate(&scope()),
            Err(EngineError::SequenceExhausted { .. })
        ));
        assert_eq!(allocator.current(&scope()).unwrap(), MAX_SEQUENCE as u64);
    }

    #[test]
    fn sled_counter_reports_corruption() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let allocator = SledSequenceAllocator::open(&db).unwrap();
        db.open_tree(SEQUENCE_TREE)
            .unwrap()
            .insert(scope().key(), vec![1u8, 2, 3])
            .unwrap();

        assert!(matches!(
            allocator.allocate(&scope()),
            Err(EngineError::Codec(_))
        ));
    }
}
