use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::{PageId, Result, StrataError};
use crate::storage::disk::DiskManager;

use super::{BufferPoolManager, ReadPageGuard, WritePageGuard};

/// Router over several independent buffer pool instances sharing one disk
/// manager. Page id `p` is owned by instance `p % num_instances`; each
/// instance allocates new ids along its own stride, so ownership is stable
/// and every operation delegates by the same modulus.
pub struct ParallelBufferPool {
    instances: Vec<Arc<BufferPoolManager>>,
    /// Round-robin start position for new_page
    next_instance: AtomicUsize,
}

impl ParallelBufferPool {
    /// Builds `num_instances` pools of `pool_size_each` frames apiece.
    pub fn new(num_instances: u32, pool_size_each: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(num_instances > 0, "pool must have at least one instance");
        let instances = (0..num_instances)
            .map(|i| {
                Arc::new(BufferPoolManager::with_stride(
                    pool_size_each,
                    num_instances,
                    i,
                    Arc::clone(&disk_manager),
                ))
            })
            .collect();
        Self {
            instances,
            next_instance: AtomicUsize::new(0),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Total frames across all instances.
    pub fn pool_size(&self) -> usize {
        self.instances.iter().map(|i| i.pool_size()).sum()
    }

    fn instance_for(&self, page_id: PageId) -> &Arc<BufferPoolManager> {
        &self.instances[page_id.as_usize() % self.instances.len()]
    }

    /// Allocates a new page, starting from a round-robin instance and
    /// probing each instance once before reporting a full pool.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let n = self.instances.len();
        let start = self.next_instance.fetch_add(1, Ordering::Relaxed) % n;
        for offset in 0..n {
            match self.instances[(start + offset) % n].new_page() {
                Ok(guard) => return Ok(guard),
                Err(StrataError::BufferPoolFull) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StrataError::BufferPoolFull)
    }

    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        self.instance_for(page_id).fetch_page_read(page_id)
    }

    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        self.instance_for(page_id).fetch_page_write(page_id)
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).flush_page(page_id)
    }

    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).delete_page(page_id)
    }

    pub fn flush_all_pages(&self) -> Result<()> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.instance_for(page_id).pin_count(page_id)
    }
}
