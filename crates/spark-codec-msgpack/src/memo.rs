//! 一次写入的记忆化单元。
//!
//! 句柄解析结果与延迟类型的绑定都依赖“只写一次”的语义：并发首访时只允许一个调用方执行初始化，
//! 其余调用方阻塞等待并观察同一个值。`OnceLock` 负责无锁读取，`parking_lot::Mutex` 串行化初始化过程。

use std::sync::OnceLock;

use parking_lot::Mutex;

/// 受锁保护的一次写入单元。
///
/// # 契约说明（What）
/// - `get_or_try_init` 的初始化闭包在同一时刻至多执行一次；返回 `Ok(None)` 时不落盘，下次调用会重新初始化；
/// - 值一旦写入即不可覆盖，[`MemoCell::set`] 对已写入的单元返回 `Err(value)`；
/// - 初始化闭包内不得再次访问同一个单元，否则会自锁。
pub(crate) struct MemoCell<T> {
    value: OnceLock<T>,
    init: Mutex<()>,
}

impl<T> MemoCell<T> {
    pub(crate) const fn new() -> Self {
        Self {
            value: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub(crate) fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// 尝试写入；单元已有值时把入参原样退回。
    pub(crate) fn set(&self, value: T) -> Result<(), T> {
        let _guard = self.init.lock();
        self.value.set(value)
    }

    pub(crate) fn get_or_try_init<E, F>(&self, init: F) -> Result<Option<&T>, E>
    where
        F: FnOnce() -> Result<Option<T>, E>,
    {
        if let Some(value) = self.value.get() {
            return Ok(Some(value));
        }

        let _guard = self.init.lock();
        if let Some(value) = self.value.get() {
            return Ok(Some(value));
        }

        match init()? {
            Some(value) => {
                // 持锁期间不存在并发写入，`set` 必然成功。
                let _ = self.value.set(value);
                Ok(self.value.get())
            }
            None => Ok(None),
        }
    }
}

impl<T> Default for MemoCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn racing_initializers_run_once() {
        let cell = Arc::new(MemoCell::<Arc<String>>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let runs = Arc::clone(&runs);
                thread::spawn(move || {
                    let value = cell
                        .get_or_try_init::<(), _>(|| {
                            runs.fetch_add(1, Ordering::SeqCst);
                            Ok(Some(Arc::new("resolved".to_owned())))
                        })
                        .expect("初始化不应失败")
                        .cloned()
                        .expect("初始化必须产出值");
                    Arc::as_ptr(&value) as usize
                })
            })
            .collect();

        let pointers: Vec<usize> = handles
            .into_iter()
            .map(|handle| handle.join().expect("线程不应 panic"))
            .collect();

        assert_eq!(runs.load(Ordering::SeqCst), 1, "初始化闭包只能执行一次");
        assert!(pointers.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn empty_outcome_is_not_memoized() {
        let cell = MemoCell::<u32>::new();
        assert_eq!(cell.get_or_try_init::<(), _>(|| Ok(None)), Ok(None));
        assert_eq!(cell.get_or_try_init::<(), _>(|| Ok(Some(7))), Ok(Some(&7)));
        assert_eq!(cell.set(9), Err(9));
        assert_eq!(cell.get(), Some(&7));
    }
}
