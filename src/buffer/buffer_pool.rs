use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::common::{FrameId, PageId, Result, StrataError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::DiskManager;

use super::page_guard::FrameBytes;
use super::{ClockReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping for one frame. Pin counts and dirty bits only ever change
/// under the pool's instance mutex, so they are plain fields; the page
/// bytes live outside in [`FrameBytes`] with their own latch.
#[derive(Clone, Copy)]
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl FrameMeta {
    fn free() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

/// Frame table, page table and free list, serialized under one mutex per
/// instance.
struct PoolInner {
    frames: Vec<FrameMeta>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// State shared with the page-guard release callbacks.
struct PoolShared {
    /// Per-frame page bytes, shared with outstanding guards
    bytes: Vec<Arc<FrameBytes>>,
    inner: Mutex<PoolInner>,
    replacer: ClockReplacer,
}

impl PoolShared {
    /// Guard release path: OR in the dirty bit and unpin; at pin count zero
    /// the frame becomes eligible for eviction.
    fn release(&self, page_id: PageId, is_dirty: bool) {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return;
        };
        let meta = &mut inner.frames[frame_id.as_usize()];
        if is_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count > 0 {
            meta.pin_count -= 1;
            if meta.pin_count == 0 {
                self.replacer.unpin(frame_id);
            }
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of frames and hands
/// out RAII page guards that pin a page for the guard's lifetime. Eviction
/// victims come from the clock replacer; dirty victims are written back
/// before their frame is reused.
///
/// An instance may be one of several behind a [`super::ParallelBufferPool`]:
/// instance `i` of `n` owns exactly the page ids congruent to `i` mod `n`
/// and allocates new ids along that stride.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Stride of page-id allocation (1 for a standalone pool)
    num_instances: u32,
    /// This instance's offset within the stride
    instance_index: u32,
    /// Next page id to hand out; advances by `num_instances`
    next_page_id: AtomicU32,
    shared: Arc<PoolShared>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Creates a standalone buffer pool.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_stride(pool_size, 1, 0, disk_manager)
    }

    /// Creates one instance of a parallel pool arrangement.
    pub fn with_stride(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "pool must have at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index must fall inside the pool arrangement"
        );

        let mut bytes = Vec::with_capacity(pool_size);
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            bytes.push(Arc::new(RwLock::new(Box::new([0u8; PAGE_SIZE]))));
            frames.push(FrameMeta::free());
            free_list.push_back(FrameId::new(i as u32));
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            next_page_id: AtomicU32::new(instance_index),
            shared: Arc::new(PoolShared {
                bytes,
                inner: Mutex::new(PoolInner {
                    frames,
                    page_table: HashMap::new(),
                    free_list,
                }),
                replacer: ClockReplacer::new(pool_size),
            }),
            disk_manager,
        }
    }

    /// Allocates a fresh page and returns it pinned behind a write guard
    /// with zeroed contents. The page is born dirty so it reaches disk even
    /// if the caller never writes a byte.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let mut inner = self.shared.inner.lock();
        let frame_id = self.find_usable_frame(&mut inner)?;

        let page_id = self.allocate_page_id();
        self.shared.bytes[frame_id.as_usize()].write().fill(0);
        inner.frames[frame_id.as_usize()] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: true,
        };
        inner.page_table.insert(page_id, frame_id);
        self.shared.replacer.pin(frame_id);
        drop(inner);

        Ok(self.make_write_guard(page_id, frame_id))
    }

    /// Fetches a page for shared access, reading it from disk if it is not
    /// resident. Fails with `BufferPoolFull` when every frame is pinned.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(self.make_read_guard(page_id, frame_id))
    }

    /// Fetches a page for exclusive access, reading it from disk if it is
    /// not resident. Fails with `BufferPoolFull` when every frame is pinned.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(self.make_write_guard(page_id, frame_id))
    }

    /// Writes a resident page to disk, dirty or not. Returns false if the
    /// page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.shared.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let mut data = [0u8; PAGE_SIZE];
        data.copy_from_slice(&**self.shared.bytes[frame_id.as_usize()].read());
        self.disk_manager.write_page(page_id, &data)?;
        inner.frames[frame_id.as_usize()].is_dirty = false;
        Ok(true)
    }

    /// Writes every page resident in this instance to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        let resident: Vec<(PageId, FrameId)> =
            inner.page_table.iter().map(|(&p, &f)| (p, f)).collect();
        for (page_id, frame_id) in resident {
            let mut data = [0u8; PAGE_SIZE];
            data.copy_from_slice(&**self.shared.bytes[frame_id.as_usize()].read());
            self.disk_manager.write_page(page_id, &data)?;
            inner.frames[frame_id.as_usize()].is_dirty = false;
        }
        Ok(())
    }

    /// Deletes a page. A non-resident page is vacuously deleted (Ok(true));
    /// a pinned page cannot be deleted.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.shared.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };

        if inner.frames[frame_id.as_usize()].pin_count > 0 {
            return Err(StrataError::PageStillPinned(page_id));
        }

        inner.page_table.remove(&page_id);
        inner.frames[frame_id.as_usize()] = FrameMeta::free();
        self.shared.bytes[frame_id.as_usize()].write().fill(0);
        self.shared.replacer.pin(frame_id);
        inner.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns the pin count of a resident page, or None.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.shared.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| inner.frames[frame_id.as_usize()].pin_count)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.shared.inner.lock().free_list.len()
    }

    /// Number of frames the replacer currently considers evictable.
    pub fn evictable_count(&self) -> usize {
        self.shared.replacer.size()
    }

    /// True if this instance owns the given page id under its stride.
    pub fn owns_page(&self, page_id: PageId) -> bool {
        page_id.as_u32() % self.num_instances == self.instance_index
    }

    fn allocate_page_id(&self) -> PageId {
        let id = self.next_page_id.fetch_add(self.num_instances, Ordering::SeqCst);
        PageId::new(id)
    }

    /// Pins the frame hosting `page_id`, pulling the page in from disk
    /// through a usable frame when it is not resident.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        let mut inner = self.shared.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            inner.frames[frame_id.as_usize()].pin_count += 1;
            self.shared.replacer.pin(frame_id);
            return Ok(frame_id);
        }

        let frame_id = self.find_usable_frame(&mut inner)?;

        let mut data = [0u8; PAGE_SIZE];
        self.disk_manager.read_page(page_id, &mut data)?;
        self.shared.bytes[frame_id.as_usize()]
            .write()
            .copy_from_slice(&data);

        inner.frames[frame_id.as_usize()] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        inner.page_table.insert(page_id, frame_id);
        self.shared.replacer.pin(frame_id);
        Ok(frame_id)
    }

    /// Free list first, then a replacer victim; a dirty victim is written
    /// back before its frame is handed out, and its mapping is erased. The
    /// victim's pin count is zero, so its byte latch is free by the guard
    /// drop ordering.
    fn find_usable_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.shared.replacer.victim() else {
            return Err(StrataError::BufferPoolFull);
        };

        let victim = inner.frames[frame_id.as_usize()];
        debug!(
            "evicting page {} from frame {} (dirty: {})",
            victim.page_id, frame_id, victim.is_dirty
        );

        if victim.is_dirty {
            let mut data = [0u8; PAGE_SIZE];
            data.copy_from_slice(&**self.shared.bytes[frame_id.as_usize()].read());
            self.disk_manager.write_page(victim.page_id, &data)?;
        }

        inner.page_table.remove(&victim.page_id);
        inner.frames[frame_id.as_usize()] = FrameMeta::free();
        Ok(frame_id)
    }

    fn make_read_guard(&self, page_id: PageId, frame_id: FrameId) -> ReadPageGuard {
        let bytes = Arc::clone(&self.shared.bytes[frame_id.as_usize()]);
        let shared = Arc::clone(&self.shared);
        unsafe {
            ReadPageGuard::new(
                page_id,
                bytes,
                Box::new(move |pid, is_dirty| shared.release(pid, is_dirty)),
            )
        }
    }

    fn make_write_guard(&self, page_id: PageId, frame_id: FrameId) -> WritePageGuard {
        let bytes = Arc::clone(&self.shared.bytes[frame_id.as_usize()]);
        let shared = Arc::clone(&self.shared);
        unsafe {
            WritePageGuard::new(
                page_id,
                bytes,
                Box::new(move |pid, is_dirty| shared.release(pid, is_dirty)),
            )
        }
    }
}
