//! sled-backed transaction records with compare-and-swap writes
use super::error::EngineError;
use super::transaction::Transaction;
use log::debug;

pub const TRANSACTION_TREE: &str = "transactions";

#[derive(Clone)]
pub struct TransactionStore {
    tree: sled::Tree,
}

/// A record as loaded, together with the exact bytes a later swap must find.
pub struct Snapshot {
    pub transaction: Transaction,
    raw: sled::IVec,
}

fn encode(transaction: &Transaction) -> Result<Vec<u8>, EngineError> {
    minicbor::to_vec(transaction).map_err(|e| EngineError::Codec(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Transaction, EngineError> {
    minicbor::decode(bytes).map_err(|e| EngineError::Codec(e.to_string()))
}

impl TransactionStore {
    pub fn open(db: &sled::Db) -> Result<Self, EngineError> {
        Ok(Self {
            tree: db.open_tree(TRANSACTION_TREE)?,
        })
    }

    pub fn load(&self, id: &str) -> Result<Snapshot, EngineError> {
        let raw = self
            .tree
            .get(id.as_bytes())?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let transaction = decode(&raw)?;
        Ok(Snapshot { transaction, raw })
    }

    pub fn get(&self, id: &str) -> Result<Transaction, EngineError> {
        Ok(self.load(id)?.transaction)
    }

    /// Inserts a new record. An id that already exists is never overwritten.
    pub fn insert(&self, transaction: &Transaction) -> Result<(), EngineError> {
        let bytes = encode(transaction)?;
        match self
            .tree
            .compare_and_swap(transaction.id.as_bytes(), None::<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(EngineError::Identifier(format!(
                "transaction id {} already in use",
                transaction.id
            ))),
        }
    }

    /// Replaces `snapshot` with `next` only if nobody wrote the record since it was loaded.
    pub fn swap(&self, snapshot: &Snapshot, next: &Transaction) -> Result<(), EngineError> {
        let bytes = encode(next)?;
        let id = snapshot.transaction.id.as_bytes();
        match self
            .tree
            .compare_and_swap(id, Some(&snapshot.raw), Some(bytes))?
        {
            Ok(()) => Ok(()),
            Err(conflict) => {
                let actual = match conflict.current {
                    Some(current) => decode(&current)?.version,
                    None => return Err(EngineError::NotFound(snapshot.transaction.id.clone())),
                };
                debug!(
                    "lost update race on {}: expected version {}, found {}",
                    snapshot.transaction.id, snapshot.transaction.version, actual
                );
                Err(EngineError::StaleState {
                    expected: snapshot.transaction.version,
                    actual,
                })
            }
        }
    }

    pub fn list(&self) -> Result<Vec<Transaction>, EngineError> {
        self.tree
            .iter()
            .values()
            .map(|raw| decode(&raw?))
            .collect()
    }

    pub fn flush(&self) -> Result<(), EngineError> {
        self.tree.flush()?;
        Ok(())
    }
}
