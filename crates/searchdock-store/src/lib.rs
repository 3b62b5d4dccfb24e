//! The metadata store: durable, name-keyed persistence for resource
//! definitions as opaque byte blobs.
//!
//! One LMDB environment holds one database per resource kind plus a small
//! bookkeeping database for the etag counter. A successful `put` is durable
//! before the call returns (LMDB commit); `list` reads a single transaction
//! and therefore sees a consistent snapshot of committed names.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

const METADATA_STORE_SIZE: usize = 1_073_741_824; // 1 GiB
const BOOKKEEPING_DB_NAME: &str = "bookkeeping";
const ETAG_COUNTER_KEY: &str = "etag-counter";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown resource kind `{0}`")]
    UnknownKind(String),
    #[error("stored blob for `{0}` is corrupted")]
    CorruptedBlob(String),
    #[error(transparent)]
    Heed(#[from] heed::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A blob read back from the store, together with the etag of the write that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub etag: u64,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct MetadataStore {
    env: Env,
    bookkeeping: Database<Str, Bytes>,
    databases: HashMap<&'static str, Database<Str, Bytes>>,
}

impl MetadataStore {
    /// Open (or create) the store at `path` with one database per kind.
    pub fn open(path: &Path, kinds: &[&'static str]) -> Result<Self> {
        fs::create_dir_all(path)?;
        let mut options = EnvOpenOptions::new();
        options.map_size(METADATA_STORE_SIZE);
        options.max_dbs(kinds.len() as u32 + 1);
        let env = unsafe { options.open(path)? };

        let mut wtxn = env.write_txn()?;
        let bookkeeping = env.create_database(&mut wtxn, Some(BOOKKEEPING_DB_NAME))?;
        let mut databases = HashMap::with_capacity(kinds.len());
        for kind in kinds {
            let database = env.create_database(&mut wtxn, Some(kind))?;
            databases.insert(*kind, database);
        }
        wtxn.commit()?;

        Ok(Self { env, bookkeeping, databases })
    }

    fn database(&self, kind: &str) -> Result<Database<Str, Bytes>> {
        self.databases.get(kind).copied().ok_or_else(|| Error::UnknownKind(kind.to_string()))
    }

    /// Write a blob; returns the new, monotonically increasing etag.
    pub fn put(&self, kind: &str, name: &str, data: &[u8]) -> Result<u64> {
        let database = self.database(kind)?;
        let mut wtxn = self.env.write_txn()?;

        let etag = match self.bookkeeping.get(&wtxn, ETAG_COUNTER_KEY)? {
            Some(bytes) => decode_etag(bytes).ok_or_else(|| {
                Error::CorruptedBlob(format!("{BOOKKEEPING_DB_NAME}/{ETAG_COUNTER_KEY}"))
            })? + 1,
            None => 1,
        };
        self.bookkeeping.put(&mut wtxn, ETAG_COUNTER_KEY, &etag.to_be_bytes())?;

        let mut value = Vec::with_capacity(8 + data.len());
        value.extend_from_slice(&etag.to_be_bytes());
        value.extend_from_slice(data);
        database.put(&mut wtxn, name, &value)?;

        wtxn.commit()?;
        Ok(etag)
    }

    pub fn get(&self, kind: &str, name: &str) -> Result<Option<Entry>> {
        let database = self.database(kind)?;
        let rtxn = self.env.read_txn()?;
        match database.get(&rtxn, name)? {
            Some(value) => {
                let (etag, data) = split_blob(value)
                    .ok_or_else(|| Error::CorruptedBlob(format!("{kind}/{name}")))?;
                Ok(Some(Entry { name: name.to_string(), etag, data: data.to_vec() }))
            }
            None => Ok(None),
        }
    }

    /// All committed entries of a kind, in name order.
    pub fn list(&self, kind: &str) -> Result<Vec<Entry>> {
        let database = self.database(kind)?;
        let rtxn = self.env.read_txn()?;
        let mut entries = Vec::new();
        for item in database.iter(&rtxn)? {
            let (name, value) = item?;
            let (etag, data) =
                split_blob(value).ok_or_else(|| Error::CorruptedBlob(format!("{kind}/{name}")))?;
            entries.push(Entry { name: name.to_string(), etag, data: data.to_vec() });
        }
        Ok(entries)
    }

    pub fn delete(&self, kind: &str, name: &str) -> Result<bool> {
        let database = self.database(kind)?;
        let mut wtxn = self.env.write_txn()?;
        let deleted = database.delete(&mut wtxn, name)?;
        wtxn.commit()?;
        Ok(deleted)
    }

    pub fn exists(&self, kind: &str, name: &str) -> Result<bool> {
        let database = self.database(kind)?;
        let rtxn = self.env.read_txn()?;
        Ok(database.get(&rtxn, name)?.is_some())
    }

    pub fn count(&self, kind: &str) -> Result<u64> {
        let database = self.database(kind)?;
        let rtxn = self.env.read_txn()?;
        Ok(database.len(&rtxn)?)
    }
}

fn decode_etag(bytes: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

fn split_blob(value: &[u8]) -> Option<(u64, &[u8])> {
    if value.len() < 8 {
        return None;
    }
    let (etag, data) = value.split_at(8);
    Some((decode_etag(etag)?, data))
}
