use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

/// A frame's page bytes. All other frame state (page id, pin count, dirty
/// bit) lives inside the pool's instance mutex; the bytes get their own
/// latch so guard holders can work on them without serializing behind the
/// pool.
pub(crate) type FrameBytes = RwLock<Box<[u8; PAGE_SIZE]>>;

/// Callback invoked when a guard is dropped: (page_id, wrote_to_page)
type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Shared plumbing of the two guard types. Holding the guard keeps the
/// frame pinned; dropping it runs the release callback exactly once, which
/// is what makes the mandatory unpin-on-every-exit-path hold by
/// construction.
struct PageGuardBase {
    page_id: PageId,
    /// Keeps the frame's bytes alive for the guard's lifetime
    _bytes: Arc<FrameBytes>,
    release_callback: Option<ReleaseCallback>,
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(page_id: PageId, bytes: Arc<FrameBytes>, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            _bytes: bytes,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    fn drop_impl(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// RAII guard for read-only access to a page. Holds the frame's data latch
/// shared and unpins the page when dropped.
pub struct ReadPageGuard {
    base: PageGuardBase,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The caller must ensure that the frame's bytes outlive this guard;
    /// the Arc held by the base makes this hold.
    pub(crate) unsafe fn new(
        page_id: PageId,
        bytes: Arc<FrameBytes>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = bytes.read();
        // The 'static lifetime is a lie the Arc makes true.
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            base: PageGuardBase::new(page_id, bytes, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the data latch before unpinning so an evictor that sees
        // pin count zero never races this reader on the bytes.
        self.data_guard.take();
        self.base.drop_impl();
    }
}

/// RAII guard for read-write access to a page. Holds the frame's data latch
/// exclusively; the first `data_mut` marks the page dirty, and dropping the
/// guard unpins it.
pub struct WritePageGuard {
    base: PageGuardBase,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    /// The caller must ensure that the frame's bytes outlive this guard;
    /// the Arc held by the base makes this hold.
    pub(crate) unsafe fn new(
        page_id: PageId,
        bytes: Arc<FrameBytes>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = bytes.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            base: PageGuardBase::new(page_id, bytes, release_callback),
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Returns a mutable view of the page bytes and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.base.drop_impl();
    }
}
