use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{
    IndexKey, PageId, RecordId, Result, StrataError, BUCKET_ARRAY_SIZE, HASH_MAX_DEPTH,
    INVALID_PAGE_ID,
};
use crate::storage::page::{
    HashBucketPage, HashBucketPageRef, HashDirectoryPage, HashDirectoryPageRef,
};

use super::KeyHasher;

/// Extendible hash index over buffer-pool pages.
///
/// One directory page maps the low `global_depth` bits of `hash(key)` to a
/// bucket page; each bucket carries a `local_depth <= global_depth`, and
/// two directory slots agreeing on their low `local_depth` bits share a
/// bucket. Buckets split (possibly doubling the directory) when full and
/// merge with their split image when emptied; an index drained back to
/// empty returns to `global_depth == 0`.
///
/// The directory latch is the index-level RwLock: lookups and in-bucket
/// mutations hold it shared (bucket exclusivity comes from the page write
/// guard), restructuring (bootstrap, split, merge, grow, shrink) re-takes
/// it exclusive and re-validates before touching anything, since another
/// writer may have restructured between the release and the re-acquire.
pub struct ExtendibleHashIndex {
    bpm: Arc<BufferPoolManager>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    hasher: Box<dyn KeyHasher>,
}

enum InsertProbe {
    Done(bool),
    NeedsRestructure,
}

impl ExtendibleHashIndex {
    /// Creates an empty index, allocating its directory page.
    pub fn new(bpm: Arc<BufferPoolManager>, hasher: Box<dyn KeyHasher>) -> Result<Self> {
        let directory_page_id = {
            let mut guard = bpm.new_page()?;
            let mut dir = HashDirectoryPage::new(guard.data_mut());
            dir.init();
            guard.page_id()
        };
        Ok(Self {
            bpm,
            directory_page_id,
            table_latch: RwLock::new(()),
            hasher,
        })
    }

    /// Reopens an index whose directory page already exists.
    pub fn open(
        directory_page_id: PageId,
        bpm: Arc<BufferPoolManager>,
        hasher: Box<dyn KeyHasher>,
    ) -> Self {
        Self {
            bpm,
            directory_page_id,
            table_latch: RwLock::new(()),
            hasher,
        }
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    fn hash(&self, key: IndexKey) -> u32 {
        self.hasher.hash(key)
    }

    /// Inserts a (key, value) pair. Returns Ok(false) when the exact pair
    /// is already present; the same key with a different value is fine.
    pub fn insert(&self, key: IndexKey, value: RecordId) -> Result<bool> {
        loop {
            {
                let _latch = self.table_latch.read();
                match self.try_insert(key, value)? {
                    InsertProbe::Done(inserted) => return Ok(inserted),
                    InsertProbe::NeedsRestructure => {}
                }
            }
            {
                let _latch = self.table_latch.write();
                // Re-probe under the exclusive latch: a concurrent writer
                // may have already done the work this thread queued up for.
                match self.try_insert(key, value)? {
                    InsertProbe::Done(inserted) => return Ok(inserted),
                    InsertProbe::NeedsRestructure => self.restructure_for(key)?,
                }
            }
        }
    }

    /// One insert attempt without restructuring. Shared-latch safe.
    fn try_insert(&self, key: IndexKey, value: RecordId) -> Result<InsertProbe> {
        let (bucket_page_id, _) = match self.route(key)? {
            Some(route) => route,
            None => return Ok(InsertProbe::NeedsRestructure),
        };

        let mut guard = self.bpm.fetch_page_write(bucket_page_id)?;
        let mut bucket = HashBucketPage::new(guard.data_mut());
        if bucket.contains(key, value) {
            return Ok(InsertProbe::Done(false));
        }
        if bucket.is_full() {
            return Ok(InsertProbe::NeedsRestructure);
        }
        bucket.insert(key, value);
        Ok(InsertProbe::Done(true))
    }

    /// Looks up every value stored under the key.
    pub fn get_value(&self, key: IndexKey) -> Result<Vec<RecordId>> {
        let _latch = self.table_latch.read();
        let Some((bucket_page_id, _)) = self.route(key)? else {
            return Ok(Vec::new());
        };
        let guard = self.bpm.fetch_page_read(bucket_page_id)?;
        Ok(HashBucketPageRef::new(guard.data()).get_value(key))
    }

    /// Removes the exact (key, value) pair; when the routed bucket is left
    /// empty (even by an earlier call), merges it with its split image.
    pub fn remove(&self, key: IndexKey, value: RecordId) -> Result<bool> {
        let (removed, emptied) = {
            let _latch = self.table_latch.read();
            let Some((bucket_page_id, _)) = self.route(key)? else {
                return Ok(false);
            };
            let mut guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let mut bucket = HashBucketPage::new(guard.data_mut());
            let removed = bucket.remove(key, value);
            (removed, bucket.is_empty())
        };

        if emptied {
            let _latch = self.table_latch.write();
            self.merge_empty_buckets()?;
        }
        Ok(removed)
    }

    /// Current global depth of the directory.
    pub fn global_depth(&self) -> Result<u32> {
        let _latch = self.table_latch.read();
        let guard = self.bpm.fetch_page_read(self.directory_page_id)?;
        Ok(HashDirectoryPageRef::new(guard.data()).global_depth())
    }

    /// Asserts the directory's structural invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        let _latch = self.table_latch.read();
        let mut guard = self.bpm.fetch_page_write(self.directory_page_id)?;
        HashDirectoryPage::new(guard.data_mut()).verify_integrity();
        Ok(())
    }

    /// Resolves a key to (bucket page, directory slot), or None while the
    /// index has no buckets. Depth zero with a live slot 0 is the merged
    /// single-bucket state and routes everything there.
    fn route(&self, key: IndexKey) -> Result<Option<(PageId, usize)>> {
        let guard = self.bpm.fetch_page_read(self.directory_page_id)?;
        let dir = HashDirectoryPageRef::new(guard.data());
        if dir.global_depth() == 0 && dir.bucket_page_id(0) == INVALID_PAGE_ID {
            return Ok(None);
        }
        let idx = (self.hash(key) & dir.global_depth_mask()) as usize;
        Ok(Some((dir.bucket_page_id(idx), idx)))
    }

    /// Makes room for the key under the exclusive latch: bootstraps the
    /// empty index, or splits the key's full bucket (growing the directory
    /// when its local depth has caught up with the global depth).
    fn restructure_for(&self, key: IndexKey) -> Result<()> {
        if self.bootstrap()? {
            return Ok(());
        }
        self.split_bucket(key)
    }

    /// First insert ever: one bucket at depth 1, both directory slots
    /// pointing at it. Returns false if the index is already live.
    fn bootstrap(&self) -> Result<bool> {
        let mut dir_guard = self.bpm.fetch_page_write(self.directory_page_id)?;
        let mut dir = HashDirectoryPage::new(dir_guard.data_mut());
        if dir.global_depth() != 0 || dir.bucket_page_id(0) != INVALID_PAGE_ID {
            return Ok(false);
        }

        let bucket_page_id = {
            let guard = self.bpm.new_page()?;
            guard.page_id()
        };

        dir.incr_global_depth();
        dir.set_bucket_page_id(0, bucket_page_id);
        dir.set_bucket_page_id(1, bucket_page_id);
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        debug!("hash index bootstrapped with bucket {bucket_page_id}");
        Ok(true)
    }

    /// Splits the bucket the key routes to. Caller holds the exclusive
    /// latch and has established that the bucket is full.
    fn split_bucket(&self, key: IndexKey) -> Result<()> {
        let mut dir_guard = self.bpm.fetch_page_write(self.directory_page_id)?;
        let mut dir = HashDirectoryPage::new(dir_guard.data_mut());

        let old_idx = (self.hash(key) & dir.global_depth_mask()) as usize;
        let old_page_id = dir.bucket_page_id(old_idx);
        let old_local = dir.local_depth(old_idx);

        // Grow the directory when the bucket already consults every bit
        // the directory does: mirror the live half upward, then deepen.
        if old_local == dir.global_depth() {
            if dir.global_depth() == HASH_MAX_DEPTH {
                return Err(StrataError::DirectoryFull);
            }
            let size = dir.size();
            for i in 0..size {
                dir.set_bucket_page_id(size + i, dir.bucket_page_id(i));
                dir.set_local_depth(size + i, dir.local_depth(i));
            }
            dir.incr_global_depth();
            debug!("hash directory grew to depth {}", dir.global_depth());
        }

        let mut new_guard = self.bpm.new_page()?;
        let new_page_id = new_guard.page_id();

        // Redistribute: pairs whose hash has bit `old_local` set move to
        // the new image bucket.
        {
            let mut old_bucket_guard = self.bpm.fetch_page_write(old_page_id)?;
            let mut old_bucket = HashBucketPage::new(old_bucket_guard.data_mut());
            let mut new_bucket = HashBucketPage::new(new_guard.data_mut());
            for i in 0..BUCKET_ARRAY_SIZE {
                if old_bucket.is_readable(i) {
                    let k = old_bucket.key_at(i);
                    if (self.hash(k) >> old_local) & 1 == 1 {
                        let v = old_bucket.value_at(i);
                        old_bucket.set_readable(i, false);
                        new_bucket.insert(k, v);
                    }
                }
            }
        }

        // Repoint every slot of the split family and deepen it by one.
        let mask = (1u32 << old_local) - 1;
        for i in 0..dir.size() {
            if (i as u32) & mask == (old_idx as u32) & mask {
                if (i >> old_local) & 1 == 1 {
                    dir.set_bucket_page_id(i, new_page_id);
                } else {
                    dir.set_bucket_page_id(i, old_page_id);
                }
                dir.set_local_depth(i, old_local + 1);
            }
        }
        debug!("split bucket {old_page_id} into {new_page_id} at depth {}", old_local + 1);
        Ok(())
    }

    /// Merges every empty bucket whose split image sits at the same local
    /// depth, cascading until no merge applies, then shrinks the directory
    /// to the deepest surviving bucket. A fully drained index collapses to
    /// global depth zero with no bucket pages left. Caller holds the
    /// exclusive latch; emptiness is re-validated here because a concurrent
    /// insert may have landed between the removal and the latch upgrade.
    fn merge_empty_buckets(&self) -> Result<()> {
        let mut dir_guard = self.bpm.fetch_page_write(self.directory_page_id)?;
        let mut dir = HashDirectoryPage::new(dir_guard.data_mut());

        let mut doomed_pages = Vec::new();
        loop {
            let mut merged_any = false;
            for idx in 0..dir.size() {
                let local = dir.local_depth(idx);
                if local == 0 {
                    continue;
                }
                let image_idx = dir.split_image_index(idx);
                if dir.local_depth(image_idx) != local {
                    continue;
                }
                let page_id = dir.bucket_page_id(idx);
                let image_page_id = dir.bucket_page_id(image_idx);
                if page_id == image_page_id {
                    continue;
                }
                let is_empty = {
                    let guard = self.bpm.fetch_page_read(page_id)?;
                    HashBucketPageRef::new(guard.data()).num_readable() == 0
                };
                if !is_empty {
                    continue;
                }

                // Redirect the family to the surviving image, one level up.
                let family_mask = (1u32 << (local - 1)) - 1;
                for i in 0..dir.size() {
                    if (i as u32) & family_mask == (idx as u32) & family_mask {
                        dir.set_bucket_page_id(i, image_page_id);
                        dir.set_local_depth(i, local - 1);
                    }
                }
                doomed_pages.push(page_id);
                debug!("merged empty bucket {page_id} into {image_page_id}");
                merged_any = true;
            }
            if !merged_any {
                break;
            }
        }

        let max_local = dir.max_local_depth();
        if max_local < dir.global_depth() {
            dir.set_global_depth(max_local);
            debug!("hash directory shrank to depth {max_local}");
        }
        // At depth zero a single bucket remains. If it too is drained, drop
        // it and return the directory to its never-bootstrapped state.
        if dir.global_depth() == 0 {
            let survivor = dir.bucket_page_id(0);
            if survivor != INVALID_PAGE_ID {
                let is_empty = {
                    let guard = self.bpm.fetch_page_read(survivor)?;
                    HashBucketPageRef::new(guard.data()).num_readable() == 0
                };
                if is_empty {
                    dir.set_bucket_page_id(0, INVALID_PAGE_ID);
                    doomed_pages.push(survivor);
                }
            }
        }
        drop(dir_guard);

        for page_id in doomed_pages {
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DefaultKeyHasher, IdentityKeyHasher};
    use crate::storage::disk::DiskManager;
    use crate::common::SlotId;
    use tempfile::NamedTempFile;

    fn rid(n: u64) -> RecordId {
        RecordId::new(PageId::new(n as u32), SlotId::new((n % 7) as u16))
    }

    fn create_index(pool: usize, hasher: Box<dyn KeyHasher>) -> (ExtendibleHashIndex, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(pool, dm));
        (ExtendibleHashIndex::new(bpm, hasher).unwrap(), temp_file)
    }

    #[test]
    fn test_hash_index_insert_lookup() {
        let (index, _temp) = create_index(16, Box::new(DefaultKeyHasher));

        for i in 0..100u64 {
            assert!(index.insert(i, rid(i)).unwrap());
        }
        for i in 0..100u64 {
            assert_eq!(index.get_value(i).unwrap(), vec![rid(i)]);
        }
        assert!(index.get_value(1000).unwrap().is_empty());
        index.verify_integrity().unwrap();
    }

    #[test]
    fn test_hash_index_duplicate_pairs_rejected() {
        let (index, _temp) = create_index(16, Box::new(DefaultKeyHasher));

        assert!(index.insert(1, rid(1)).unwrap());
        assert!(!index.insert(1, rid(1)).unwrap());
        // same key, different value is allowed
        assert!(index.insert(1, rid(2)).unwrap());
        assert_eq!(index.get_value(1).unwrap().len(), 2);
    }

    #[test]
    fn test_hash_index_empty_lookup_and_remove() {
        let (index, _temp) = create_index(8, Box::new(DefaultKeyHasher));
        assert!(index.get_value(5).unwrap().is_empty());
        assert!(!index.remove(5, rid(5)).unwrap());
        assert_eq!(index.global_depth().unwrap(), 0);
    }

    #[test]
    fn test_hash_index_split_keeps_all_keys() {
        // Identity hashing with even keys: everything routes through low
        // bit 0, forcing directory growth past the first split.
        let (index, _temp) = create_index(32, Box::new(IdentityKeyHasher));

        let n = BUCKET_ARRAY_SIZE as u64 + 1;
        for i in 0..n {
            assert!(index.insert(i * 2, rid(i)).unwrap(), "insert {i}");
        }
        assert!(index.global_depth().unwrap() >= 2);
        for i in 0..n {
            assert_eq!(index.get_value(i * 2).unwrap(), vec![rid(i)], "lookup {i}");
        }
        index.verify_integrity().unwrap();
    }

    #[test]
    fn test_hash_index_drains_back_to_depth_zero() {
        let (index, _temp) = create_index(32, Box::new(DefaultKeyHasher));

        let n = 600u64;
        for i in 0..n {
            assert!(index.insert(i, rid(i)).unwrap());
        }
        assert!(index.global_depth().unwrap() > 0);

        for i in 0..n {
            assert!(index.remove(i, rid(i)).unwrap(), "remove {i}");
            assert!(index.get_value(i).unwrap().is_empty());
        }
        assert_eq!(index.global_depth().unwrap(), 0);
        index.verify_integrity().unwrap();
    }

    #[test]
    fn test_hash_index_remove_wrong_value_is_noop() {
        let (index, _temp) = create_index(8, Box::new(DefaultKeyHasher));

        index.insert(1, rid(1)).unwrap();
        assert!(!index.remove(1, rid(2)).unwrap());
        assert_eq!(index.get_value(1).unwrap(), vec![rid(1)]);
    }
}
