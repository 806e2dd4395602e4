use crate::common::{PageId, DIRECTORY_ARRAY_SIZE, HASH_MAX_DEPTH, PAGE_SIZE};

/// Hash directory page layout:
///
/// | Field           | Offset | Size                     |
/// |-----------------|--------|--------------------------|
/// | global_depth    | 0      | 4                        |
/// | local_depths    | 4      | DIRECTORY_ARRAY_SIZE     |
/// | bucket_page_ids | LD_END | DIRECTORY_ARRAY_SIZE * 4 |
///
/// Only the first 2^global_depth slots are meaningful. Slot `i` maps the
/// low `global_depth` bits of a key hash to a bucket page; two slots that
/// agree on their low `local_depth` bits share a bucket.
const GLOBAL_DEPTH_OFFSET: usize = 0;
const LOCAL_DEPTHS_OFFSET: usize = 4;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;

const _: () = assert!(BUCKET_PAGE_IDS_OFFSET + DIRECTORY_ARRAY_SIZE * 4 <= PAGE_SIZE);

fn global_depth_raw(data: &[u8]) -> u32 {
    u32::from_le_bytes(
        data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
            .try_into()
            .unwrap(),
    )
}

fn local_depth_raw(data: &[u8], idx: usize) -> u32 {
    data[LOCAL_DEPTHS_OFFSET + idx] as u32
}

fn bucket_page_id_raw(data: &[u8], idx: usize) -> PageId {
    let base = BUCKET_PAGE_IDS_OFFSET + idx * 4;
    PageId::new(u32::from_le_bytes(data[base..base + 4].try_into().unwrap()))
}

/// Mutable view of the hash directory page.
pub struct HashDirectoryPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HashDirectoryPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
        // Slot 0 distinguishes a never-bootstrapped index from one whose
        // buckets merged down to a single depth-0 bucket.
        self.set_bucket_page_id(0, crate::common::INVALID_PAGE_ID);
    }

    pub fn global_depth(&self) -> u32 {
        global_depth_raw(self.data)
    }

    pub fn set_global_depth(&mut self, depth: u32) {
        assert!(depth <= HASH_MAX_DEPTH);
        self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
            .copy_from_slice(&depth.to_le_bytes());
    }

    pub fn incr_global_depth(&mut self) {
        self.set_global_depth(self.global_depth() + 1);
    }

    /// Mask selecting the hash bits the directory consults.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    /// Number of meaningful directory slots.
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        local_depth_raw(self.data, idx)
    }

    pub fn set_local_depth(&mut self, idx: usize, depth: u32) {
        assert!(depth <= HASH_MAX_DEPTH);
        self.data[LOCAL_DEPTHS_OFFSET + idx] = depth as u8;
    }

    pub fn incr_local_depth(&mut self, idx: usize) {
        self.set_local_depth(idx, self.local_depth(idx) + 1);
    }

    /// Mask selecting the hash bits the bucket at `idx` was split by.
    pub fn local_depth_mask(&self, idx: usize) -> u32 {
        (1u32 << self.local_depth(idx)) - 1
    }

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        bucket_page_id_raw(self.data, idx)
    }

    pub fn set_bucket_page_id(&mut self, idx: usize, page_id: PageId) {
        let base = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        self.data[base..base + 4].copy_from_slice(&page_id.as_u32().to_le_bytes());
    }

    /// The slot paired with `idx` at its current local depth: flip the
    /// highest consulted bit.
    pub fn split_image_index(&self, idx: usize) -> usize {
        let depth = self.local_depth(idx);
        assert!(depth > 0, "depth-0 bucket has no split image");
        idx ^ (1 << (depth - 1))
    }

    /// The largest local depth among the live slots. The directory can
    /// shrink whenever this is below the global depth.
    pub fn max_local_depth(&self) -> u32 {
        (0..self.size()).map(|i| self.local_depth(i)).max().unwrap_or(0)
    }

    /// Checks the structural invariants: every local depth is bounded by
    /// the global depth, and slots agreeing on their low local-depth bits
    /// point at the same bucket page.
    pub fn verify_integrity(&self) {
        let size = self.size();
        for i in 0..size {
            assert!(
                self.local_depth(i) <= self.global_depth(),
                "slot {i}: local depth exceeds global depth"
            );
            for j in 0..size {
                let mask = self.local_depth_mask(i).min(self.local_depth_mask(j));
                if (i as u32) & mask == (j as u32) & mask
                    && self.local_depth(i) == self.local_depth(j)
                {
                    assert_eq!(
                        self.bucket_page_id(i),
                        self.bucket_page_id(j),
                        "slots {i} and {j} share low bits but not a bucket"
                    );
                }
            }
        }
    }
}

/// Read-only view of the hash directory page.
pub struct HashDirectoryPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HashDirectoryPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn global_depth(&self) -> u32 {
        global_depth_raw(self.data)
    }

    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        local_depth_raw(self.data, idx)
    }

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        bucket_page_id_raw(self.data, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_depths_and_masks() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = HashDirectoryPage::new(&mut data);
        dir.init();

        assert_eq!(dir.global_depth(), 0);
        assert_eq!(dir.size(), 1);
        assert_eq!(dir.global_depth_mask(), 0);

        dir.incr_global_depth();
        dir.incr_global_depth();
        assert_eq!(dir.global_depth(), 2);
        assert_eq!(dir.size(), 4);
        assert_eq!(dir.global_depth_mask(), 0b11);

        dir.set_local_depth(3, 2);
        assert_eq!(dir.local_depth_mask(3), 0b11);
        assert_eq!(dir.split_image_index(3), 1);
        dir.set_local_depth(3, 1);
        assert_eq!(dir.split_image_index(3), 2);
    }

    #[test]
    fn test_directory_bucket_map_round_trip() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = HashDirectoryPage::new(&mut data);
        dir.init();
        dir.set_global_depth(2);

        for i in 0..4 {
            dir.set_bucket_page_id(i, PageId::new(100 + i as u32));
        }
        let view = HashDirectoryPageRef::new(&data);
        for i in 0..4 {
            assert_eq!(view.bucket_page_id(i), PageId::new(100 + i as u32));
        }
    }

    #[test]
    fn test_directory_integrity_check() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = HashDirectoryPage::new(&mut data);
        dir.init();
        dir.set_global_depth(1);
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        dir.set_bucket_page_id(0, PageId::new(5));
        dir.set_bucket_page_id(1, PageId::new(6));
        dir.verify_integrity();

        assert_eq!(dir.max_local_depth(), 1);
    }
}
