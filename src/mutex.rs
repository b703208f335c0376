/*!
    mutex shared between the periodic runner and the host

    locking never blocks a thread or an executor: acquisition is retried on each poll, which is enough since the engine is only held for the duration of a tick or of a process data copy.
*/

use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    sync::atomic::AtomicBool,
    sync::atomic::Ordering::*,
    future::poll_fn,
    task::Poll,
    ops::{Deref, DerefMut},
    };

pub struct BusyMutex<T> {
    value: UnsafeCell<T>,
    locked: AtomicBool,
}
// access to the value is serialized by the lock flag
unsafe impl<T: Send> Sync for BusyMutex<T> {}

impl<T> BusyMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: value.into(),
            locked: AtomicBool::new(false),
        }
    }
    pub fn try_lock(&self) -> Option<BusyMutexGuard<'_, T>> {
        BusyMutexGuard::try_new(self)
    }
    /// busy polling future until lock is acquired
    pub async fn lock(&self) -> BusyMutexGuard<'_, T> {
        poll_fn(|cx| match BusyMutexGuard::try_new(self) {
            Some(guard) => Poll::Ready(guard),
            None => {
                cx.waker().wake_by_ref();
                Poll::Pending
            },
            }).await
    }
    /// busy wait until lock is acquired
    #[cfg(feature = "std")]
    pub fn blocking_lock(&self) -> BusyMutexGuard<'_, T> {
        loop {
            if let Some(guard) = BusyMutexGuard::try_new(self)
                {break guard}
            // nothing else to do, leave resources to the kernel
            std::thread::yield_now();
        }
    }
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

pub struct BusyMutexGuard<'m, T> {
    mutex: &'m BusyMutex<T>,
    // shares and sends like the exclusive reference it stands for
    access: PhantomData<&'m mut T>,
}
impl<'m, T> BusyMutexGuard<'m, T> {
    fn try_new(mutex: &'m BusyMutex<T>) -> Option<Self> {
        // previous value false means we took the lock
        if mutex.locked.swap(true, Acquire)
            {None}
        else
            {Some(Self {mutex, access: PhantomData})}
    }
}
impl<T> Deref for BusyMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe {& *self.mutex.value.get()}
    }
}
impl<T> DerefMut for BusyMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe {&mut *self.mutex.value.get()}
    }
}
impl<T> Drop for BusyMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Release);
    }
}
