//! 在 guest output 之上绘制的 UI
//!
//! drawer 按照 z-order 从小到大绘制，相同 z-order 的按照添加的先后顺序绘制

use std::any::Any;
use std::sync::Arc;

/// 绘制 UI 时后端提供的上下文
///
/// 具体的 command buffer / command list 需要通过 `as_any` 转换为后端的类型获取
pub trait UiDrawContext {
    fn render_target_width(&self) -> u32;
    fn render_target_height(&self) -> u32;

    fn as_any(&self) -> &dyn Any;
}

pub trait UiDrawer: Send + Sync {
    fn draw(&self, ctx: &dyn UiDrawContext);
}

struct UiDrawerEntry {
    z_order: usize,
    /// 添加顺序，相同 z-order 的 drawer 按照该值排序
    seq: u64,
    drawer: Arc<dyn UiDrawer>,
    /// 最后一次被绘制的周期，用于保证一个周期内只绘制一次
    last_draw: u64,
}

impl UiDrawerEntry {
    #[inline]
    fn key(&self) -> (usize, u64) {
        (self.z_order, self.seq)
    }
}

/// drawer 的注册表
///
/// 绘制期间允许添加以及删除 drawer，通过游标而不是迭代器遍历
#[derive(Default)]
pub struct UiDrawerRegistry {
    /// 按照 (z_order, seq) 有序
    entries: Vec<UiDrawerEntry>,
    next_seq: u64,

    /// 当前的绘制周期
    cycle: u64,
    /// 绘制期间，最后一个被绘制的 drawer 的位置
    cursor: Option<(usize, u64)>,
    executing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiDrawerChange {
    /// 注册表是否发生了变化
    pub changed: bool,
    /// 变化之前是否为空
    pub was_empty: bool,
}

// 增删
impl UiDrawerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, drawer: &Arc<dyn UiDrawer>) -> Option<usize> {
        self.entries.iter().position(|entry| std::ptr::addr_eq(Arc::as_ptr(&entry.drawer), Arc::as_ptr(drawer)))
    }

    fn insert_sorted(&mut self, entry: UiDrawerEntry) {
        let pos = self.entries.partition_point(|e| e.key() < entry.key());
        self.entries.insert(pos, entry);
    }

    /// 添加 drawer，已经存在时修改其 z-order
    pub fn add(&mut self, drawer: Arc<dyn UiDrawer>, z_order: usize) -> UiDrawerChange {
        let was_empty = self.entries.is_empty();

        let mut last_draw = u64::MAX;
        if let Some(pos) = self.position(&drawer) {
            if self.entries[pos].z_order == z_order {
                return UiDrawerChange {
                    changed: false,
                    was_empty,
                };
            }
            // 移动到新的位置，保留绘制周期，避免在同一周期内绘制两次
            last_draw = self.entries.remove(pos).last_draw;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.insert_sorted(UiDrawerEntry {
            z_order,
            seq,
            drawer,
            last_draw,
        });

        UiDrawerChange {
            changed: true,
            was_empty,
        }
    }

    pub fn remove(&mut self, drawer: &Arc<dyn UiDrawer>) -> UiDrawerChange {
        let was_empty = self.entries.is_empty();
        let changed = match self.position(drawer) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        };
        UiDrawerChange { changed, was_empty }
    }
}

// getters
impl UiDrawerRegistry {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_executing(&self) -> bool {
        self.executing
    }
}

// 绘制
impl UiDrawerRegistry {
    pub fn begin_execute(&mut self) {
        debug_assert!(!self.executing);
        self.executing = true;
        self.cursor = None;
    }

    /// 下一个需要绘制的 drawer，并将其标记为本周期已绘制
    ///
    /// 调用方在绘制时不需要持有注册表，因此 drawer 可以在绘制中修改注册表
    pub fn next_drawer(&mut self) -> Option<Arc<dyn UiDrawer>> {
        debug_assert!(self.executing);
        let cycle = self.cycle;
        let cursor = self.cursor;
        let entry = self
            .entries
            .iter_mut()
            .filter(|entry| cursor.is_none_or(|cursor| entry.key() > cursor))
            .find(|entry| entry.last_draw != cycle)?;
        entry.last_draw = cycle;
        self.cursor = Some(entry.key());
        Some(entry.drawer.clone())
    }

    pub fn end_execute(&mut self) {
        debug_assert!(self.executing);
        self.executing = false;
        self.cursor = None;
        self.cycle = self.cycle.wrapping_add(1);
        // u64::MAX 表示从未绘制
        if self.cycle == u64::MAX {
            self.cycle = 0;
        }
    }

    /// 不需要在绘制期间修改注册表时的便捷接口
    pub fn execute(&mut self, ctx: &dyn UiDrawContext) {
        self.begin_execute();
        while let Some(drawer) = self.next_drawer() {
            drawer.draw(ctx);
        }
        self.end_execute();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct TestContext;
    impl UiDrawContext for TestContext {
        fn render_target_width(&self) -> u32 {
            1280
        }
        fn render_target_height(&self) -> u32 {
            720
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct NamedDrawer {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }
    impl UiDrawer for NamedDrawer {
        fn draw(&self, ctx: &dyn UiDrawContext) {
            assert_eq!(ctx.render_target_width(), 1280);
            self.log.lock().unwrap().push(self.name);
        }
    }

    fn drawer(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn UiDrawer> {
        Arc::new(NamedDrawer { name, log: log.clone() })
    }

    /// 手动遍历，在每次绘制之后调用 `on_draw`
    fn run_cycle(
        registry: &mut UiDrawerRegistry,
        mut on_draw: impl FnMut(&mut UiDrawerRegistry, usize),
    ) {
        registry.begin_execute();
        let mut count = 0;
        while let Some(drawer) = registry.next_drawer() {
            drawer.draw(&TestContext);
            on_draw(registry, count);
            count += 1;
        }
        registry.end_execute();
    }

    #[test]
    fn test_z_order_and_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UiDrawerRegistry::new();
        registry.add(drawer("top", &log), 10);
        registry.add(drawer("a", &log), 0);
        registry.add(drawer("b", &log), 0);
        registry.add(drawer("mid", &log), 5);

        registry.execute(&TestContext);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "mid", "top"]);
    }

    #[test]
    fn test_add_change() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UiDrawerRegistry::new();
        let a = drawer("a", &log);

        assert_eq!(
            registry.add(a.clone(), 1),
            UiDrawerChange {
                changed: true,
                was_empty: true
            }
        );
        // 相同的 z-order 不产生变化
        assert_eq!(
            registry.add(a.clone(), 1),
            UiDrawerChange {
                changed: false,
                was_empty: false
            }
        );
        assert!(registry.add(a.clone(), 2).changed);
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&a).changed);
        assert!(!registry.remove(&a).changed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_during_execute() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UiDrawerRegistry::new();
        let a = drawer("a", &log);
        let b = drawer("b", &log);
        let c = drawer("c", &log);
        registry.add(a.clone(), 0);
        registry.add(b.clone(), 1);
        registry.add(c.clone(), 2);

        // 绘制 a 时删除自己以及 b
        run_cycle(&mut registry, |registry, index| {
            if index == 0 {
                registry.remove(&a);
                registry.remove(&b);
            }
        });
        assert_eq!(*log.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_add_during_execute() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UiDrawerRegistry::new();
        registry.add(drawer("a", &log), 5);
        let before = drawer("before", &log);
        let after = drawer("after", &log);

        run_cycle(&mut registry, |registry, index| {
            if index == 0 {
                // 位于游标之前的 drawer 在下一周期才绘制
                registry.add(before.clone(), 0);
                registry.add(after.clone(), 10);
            }
        });
        assert_eq!(*log.lock().unwrap(), vec!["a", "after"]);

        log.lock().unwrap().clear();
        registry.execute(&TestContext);
        assert_eq!(*log.lock().unwrap(), vec!["before", "a", "after"]);
    }

    #[test]
    fn test_move_during_execute_draws_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = UiDrawerRegistry::new();
        let a = drawer("a", &log);
        registry.add(a.clone(), 0);
        registry.add(drawer("b", &log), 5);

        // a 绘制后移动到 b 之后，本周期不会再次绘制
        run_cycle(&mut registry, |registry, index| {
            if index == 0 {
                registry.add(a.clone(), 10);
            }
        });
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);

        log.lock().unwrap().clear();
        registry.execute(&TestContext);
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }
}
