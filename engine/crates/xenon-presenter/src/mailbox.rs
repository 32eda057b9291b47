//! guest output 的三缓冲 mailbox
//!
//! 生产者（guest output 线程）总是写入 writable 槽位，写完之后将其发布为 ready，
//! 直接替换掉尚未被消费的 ready 槽位，以获得最低的延迟；
//! 消费者（绘制线程）获取最新的 ready 槽位，将其变为 acquired。
//!
//! acquired 以及 ready 的索引保存在同一个原子变量中：
//! - bits 0..1：acquired
//! - bits 2..3：ready

use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicU32, Ordering},
};

use crate::guest_output::{GUEST_OUTPUT_MAILBOX_SIZE, GuestOutputProperties};

struct MailboxProducer {
    writable: u32,
    /// 上一次刷新时 guest output 是否处于 active 状态
    active_last_refresh: bool,
}

pub struct GuestOutputMailbox {
    producer: Mutex<MailboxProducer>,
    consumer: Mutex<()>,

    acquired_and_ready: AtomicU32,

    /// 每个槽位的属性
    ///
    /// 槽位的所有权由 `acquired_and_ready` 决定，这里的 Mutex 不会产生竞争
    properties: [Mutex<GuestOutputProperties>; GUEST_OUTPUT_MAILBOX_SIZE],
}

/// 消费者持有的 guest output
///
/// 在该对象存活期间，acquired 槽位不会被生产者写入
pub struct ConsumedGuestOutput<'a> {
    _consumer_lock: MutexGuard<'a, ()>,

    /// inactive 时为 None
    mailbox_index: Option<usize>,
    properties: GuestOutputProperties,
}

impl ConsumedGuestOutput<'_> {
    #[inline]
    pub fn mailbox_index(&self) -> Option<usize> {
        self.mailbox_index
    }

    #[inline]
    pub fn properties(&self) -> &GuestOutputProperties {
        &self.properties
    }
}

impl Default for GuestOutputMailbox {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl GuestOutputMailbox {
    pub fn new() -> Self {
        Self {
            // acquired = 0, ready = 0，第一次写入 1 号槽位
            producer: Mutex::new(MailboxProducer {
                writable: 1,
                active_last_refresh: false,
            }),
            consumer: Mutex::new(()),
            acquired_and_ready: AtomicU32::new(0),
            properties: Default::default(),
        }
    }
}

// 生产者
impl GuestOutputMailbox {
    /// 写入 writable 槽位并发布
    ///
    /// # param
    /// * refresh_impl - 槽位有内容时调用，负责写入图像；参数为槽位索引以及槽位的属性（可以修改 is_8bpc）
    ///
    /// # return
    /// * None - 没有发布：写入失败，或者连续的 inactive
    /// * Some(is_active) - 已经发布
    pub fn refresh(
        &self,
        frontbuffer_width: u32,
        frontbuffer_height: u32,
        display_aspect_ratio_x: u32,
        display_aspect_ratio_y: u32,
        refresh_impl: impl FnOnce(usize, &mut GuestOutputProperties) -> bool,
    ) -> Option<bool> {
        let mut producer = self.producer.lock().unwrap_or_else(|e| e.into_inner());
        let writable = producer.writable;

        let is_active;
        {
            let mut properties = self.properties[writable as usize].lock().unwrap_or_else(|e| e.into_inner());
            *properties = GuestOutputProperties {
                frontbuffer_width,
                frontbuffer_height,
                display_aspect_ratio_x,
                display_aspect_ratio_y,
                is_8bpc: false,
            };
            is_active = properties.is_active();
            if is_active {
                // 写入失败时，图像可能处于未定义状态，不能发布；
                // 失败可能只是暂时的，因此也不把 guest output 设置为 inactive
                if !refresh_impl(writable as usize, &mut *properties) {
                    return None;
                }
                producer.active_last_refresh = true;
            } else {
                // 只有之前有内容时，才需要发布一次空白图像
                if !producer.active_last_refresh {
                    return None;
                }
                producer.active_last_refresh = false;
            }
        }

        // ready = writable，acquired 只由消费者修改
        let mut last_acquired_and_ready = self.acquired_and_ready.load(Ordering::Relaxed);
        while let Err(actual) = self.acquired_and_ready.compare_exchange_weak(
            last_acquired_and_ready,
            (last_acquired_and_ready & 3) | (writable << 2),
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            last_acquired_and_ready = actual;
        }

        // 选择下一个 writable：既不是 acquired，也不是刚刚发布的 ready
        let last_acquired = last_acquired_and_ready & 3;
        producer.writable = if last_acquired == writable {
            // 新发布的图像在 compare-exchange 完成之前已经被获取了
            // 使用 + 1 而不是 ^ 1，重复发生时等待的是 3 帧之前的 GPU 工作
            (writable + 1) % 3
        } else {
            (3 - last_acquired - writable) % 3
        };

        Some(is_active)
    }
}

// 消费者
impl GuestOutputMailbox {
    /// 获取最新的 ready 槽位
    ///
    /// 返回的对象持有消费者锁，在使用槽位的图像期间需要一直持有
    pub fn consume(&self) -> ConsumedGuestOutput<'_> {
        let consumer_lock = self.consumer.lock().unwrap_or_else(|e| e.into_inner());

        let mut old_acquired_and_ready = self.acquired_and_ready.load(Ordering::Relaxed);
        // acquired = ready
        let mut desired_acquired_and_ready = (old_acquired_and_ready & !3) | (old_acquired_and_ready >> 2);
        while old_acquired_and_ready != desired_acquired_and_ready {
            match self.acquired_and_ready.compare_exchange_weak(
                old_acquired_and_ready,
                desired_acquired_and_ready,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => {
                    old_acquired_and_ready = actual;
                    desired_acquired_and_ready = (actual & !3) | (actual >> 2);
                }
            }
        }

        let mailbox_index = (desired_acquired_and_ready & 3) as usize;
        let properties = *self.properties[mailbox_index].lock().unwrap_or_else(|e| e.into_inner());

        ConsumedGuestOutput {
            _consumer_lock: consumer_lock,
            mailbox_index: properties.is_active().then_some(mailbox_index),
            properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use super::*;

    fn refresh_ok(mailbox: &GuestOutputMailbox, width: u32) -> (Option<bool>, usize) {
        let mut written = usize::MAX;
        let result = mailbox.refresh(width, 720, 16, 9, |index, _| {
            written = index;
            true
        });
        (result, written)
    }

    #[test]
    fn test_initially_inactive() {
        let mailbox = GuestOutputMailbox::new();
        let consumed = mailbox.consume();
        assert_eq!(consumed.mailbox_index(), None);
        assert!(!consumed.properties().is_active());
    }

    #[test]
    fn test_consume_latest() {
        let mailbox = GuestOutputMailbox::new();
        let (result, first) = refresh_ok(&mailbox, 1280);
        assert_eq!(result, Some(true));
        let (_, second) = refresh_ok(&mailbox, 1920);
        assert_ne!(first, second);

        // 只能看到最新的一帧
        let consumed = mailbox.consume();
        assert_eq!(consumed.mailbox_index(), Some(second));
        assert_eq!(consumed.properties().frontbuffer_width, 1920);
    }

    #[test]
    fn test_writable_never_acquired() {
        let mailbox = GuestOutputMailbox::new();
        for frame in 0..32u32 {
            let acquired = mailbox.consume().mailbox_index();
            let (_, written) = refresh_ok(&mailbox, 100 + frame);
            if let Some(acquired) = acquired {
                assert_ne!(acquired, written, "frame {}", frame);
            }
            if frame % 3 == 0 {
                let consumed = mailbox.consume();
                assert_eq!(consumed.mailbox_index(), Some(written));
                assert_eq!(consumed.properties().frontbuffer_width, 100 + frame);
            }
        }
    }

    #[test]
    fn test_failed_refresh_not_published() {
        let mailbox = GuestOutputMailbox::new();
        let (_, written) = refresh_ok(&mailbox, 1280);
        assert_eq!(mailbox.refresh(1920, 1080, 16, 9, |_, _| false), None);
        let consumed = mailbox.consume();
        assert_eq!(consumed.mailbox_index(), Some(written));
        assert_eq!(consumed.properties().frontbuffer_width, 1280);
    }

    #[test]
    fn test_inactive_published_once() {
        let mailbox = GuestOutputMailbox::new();
        // 从未 active 时，inactive 不会发布
        assert_eq!(mailbox.refresh(0, 0, 0, 0, |_, _| unreachable!()), None);

        refresh_ok(&mailbox, 1280);
        assert_eq!(mailbox.refresh(0, 0, 16, 9, |_, _| unreachable!()), Some(false));
        assert_eq!(mailbox.consume().mailbox_index(), None);
        assert_eq!(mailbox.refresh(0, 0, 16, 9, |_, _| unreachable!()), None);
    }

    #[test]
    fn test_refresher_sets_8bpc() {
        let mailbox = GuestOutputMailbox::new();
        mailbox.refresh(1280, 720, 16, 9, |_, props| {
            props.is_8bpc = true;
            true
        });
        assert!(mailbox.consume().properties().is_8bpc);
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let mailbox = Arc::new(GuestOutputMailbox::new());
        let done = Arc::new(AtomicBool::new(false));
        let writing: Arc<[AtomicBool; 3]> = Arc::new(Default::default());

        let producer = {
            let mailbox = mailbox.clone();
            let writing = writing.clone();
            std::thread::spawn(move || {
                for frame in 1..=2000u32 {
                    mailbox.refresh(frame, 720, 16, 9, |index, _| {
                        writing[index].store(true, Ordering::SeqCst);
                        std::thread::yield_now();
                        writing[index].store(false, Ordering::SeqCst);
                        true
                    });
                }
            })
        };

        let consumer = {
            let mailbox = mailbox.clone();
            let done = done.clone();
            let writing = writing.clone();
            std::thread::spawn(move || {
                let mut last_width = 0;
                while !done.load(Ordering::SeqCst) {
                    let consumed = mailbox.consume();
                    if let Some(index) = consumed.mailbox_index() {
                        // 消费者持有的槽位不会被生产者写入
                        assert!(!writing[index].load(Ordering::SeqCst));
                        // 帧只会前进
                        assert!(consumed.properties().frontbuffer_width >= last_width);
                        last_width = consumed.properties().frontbuffer_width;
                    }
                }
            })
        };

        producer.join().unwrap();
        done.store(true, Ordering::SeqCst);
        consumer.join().unwrap();
        assert_eq!(mailbox.consume().properties().frontbuffer_width, 2000);
    }
}
