//! 绘制时使用的 descriptor heap 的布局，以及 guest output 纹理在 view heap 中的槽位分配

use xenon_presenter::{guest_output::GUEST_OUTPUT_MAILBOX_SIZE, paint_flow::MAX_GUEST_OUTPUT_PAINT_EFFECTS};

/// swap chain 的 buffer 数量
pub const SWAP_CHAIN_BUFFER_COUNT: u32 = 3;

/// 最后一个 effect 直接绘制到 swap chain，其余的 effect 各自需要一个 intermediate 纹理
pub const INTERMEDIATE_TEXTURE_COUNT: usize = MAX_GUEST_OUTPUT_PAINT_EFFECTS - 1;

// =======================================
// === RTV heap

/// swap chain buffer 的 RTV，在连接 surface 时更新
pub const RTV_INDEX_SWAP_CHAIN_BUFFER_0: u32 = 0;
/// intermediate 纹理的 RTV，在纹理重建时更新
pub const RTV_INDEX_INTERMEDIATE_0: u32 = RTV_INDEX_SWAP_CHAIN_BUFFER_0 + SWAP_CHAIN_BUFFER_COUNT;
pub const RTV_COUNT: u32 = RTV_INDEX_INTERMEDIATE_0 + INTERMEDIATE_TEXTURE_COUNT as u32;

// =======================================
// === shader visible 的 CBV/SRV/UAV heap

/// guest output 纹理的 SRV，索引和 paint ref 的槽位一致
pub const VIEW_INDEX_GUEST_OUTPUT_0_SRV: u32 = 0;
pub const VIEW_INDEX_INTERMEDIATE_0_SRV: u32 = VIEW_INDEX_GUEST_OUTPUT_0_SRV + GUEST_OUTPUT_MAILBOX_SIZE as u32;
pub const VIEW_COUNT: u32 = VIEW_INDEX_INTERMEDIATE_0_SRV + INTERMEDIATE_TEXTURE_COUNT as u32;

/// 绘制线程对 guest output 纹理的引用，以及该纹理最后一次被使用的 paint submission
///
/// submission 为 0 表示引用已经建立，但是还没有被实际使用
pub type PaintRef<T> = (u64, Option<T>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaintRefSlot {
    pub index: usize,
    /// 是否需要在该槽位上建立新的引用（以及创建 SRV）
    pub is_new: bool,
    /// 替换旧的引用之前，需要等待完成的 paint submission
    pub await_submission: Option<u64>,
}

/// 为 `target` 选择 paint ref 的槽位
///
/// 优先复用已经引用了 `target` 的槽位；其次是空的或者从未被使用的槽位；
/// 都没有时，替换最早被使用的槽位，此时需要等待其最后一次使用完成
pub fn find_paint_ref_slot<T: PartialEq>(refs: &[PaintRef<T>], target: &T) -> PaintRefSlot {
    let mut free_index = None;
    for (i, (last_submission, resource)) in refs.iter().enumerate() {
        if resource.as_ref() == Some(target) {
            return PaintRefSlot {
                index: i,
                is_new: false,
                await_submission: None,
            };
        }
        if free_index.is_none() && (resource.is_none() || *last_submission == 0) {
            free_index = Some(i);
        }
    }

    if let Some(index) = free_index {
        return PaintRefSlot {
            index,
            is_new: true,
            await_submission: None,
        };
    }

    let index = refs
        .iter()
        .enumerate()
        .min_by_key(|(_, (last_submission, _))| *last_submission)
        .map_or(0, |(i, _)| i);
    PaintRefSlot {
        index,
        is_new: true,
        await_submission: Some(refs.get(index).map_or(0, |(last_submission, _)| *last_submission)),
    }
}

/// 释放 GPU 已经不再使用的引用，`keep` 对应的引用不会被释放
pub fn release_completed_paint_refs<T: PartialEq>(refs: &mut [PaintRef<T>], keep: Option<&T>, completed_submission: u64) {
    for (last_submission, resource) in refs.iter_mut() {
        if resource.is_none() || resource.as_ref() == keep {
            continue;
        }
        if completed_submission >= *last_submission {
            *resource = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_layout() {
        assert_eq!(RTV_INDEX_INTERMEDIATE_0, 3);
        assert_eq!(RTV_COUNT, 3 + INTERMEDIATE_TEXTURE_COUNT as u32);
        assert_eq!(VIEW_INDEX_INTERMEDIATE_0_SRV, GUEST_OUTPUT_MAILBOX_SIZE as u32);
        assert_eq!(VIEW_COUNT, GUEST_OUTPUT_MAILBOX_SIZE as u32 + INTERMEDIATE_TEXTURE_COUNT as u32);
    }

    #[test]
    fn test_paint_ref_existing() {
        let refs: [PaintRef<u32>; 3] = [(5, Some(10)), (6, Some(20)), (0, None)];
        let slot = find_paint_ref_slot(&refs, &20);
        assert_eq!(
            slot,
            PaintRefSlot {
                index: 1,
                is_new: false,
                await_submission: None
            }
        );
    }

    #[test]
    fn test_paint_ref_free_slot() {
        // 从未被使用的槽位也可以直接复用
        let refs: [PaintRef<u32>; 3] = [(5, Some(10)), (0, Some(20)), (0, None)];
        let slot = find_paint_ref_slot(&refs, &30);
        assert_eq!(slot.index, 1);
        assert!(slot.is_new);
        assert_eq!(slot.await_submission, None);
    }

    #[test]
    fn test_paint_ref_replace_oldest() {
        let refs: [PaintRef<u32>; 3] = [(7, Some(10)), (4, Some(20)), (9, Some(30))];
        let slot = find_paint_ref_slot(&refs, &40);
        assert_eq!(
            slot,
            PaintRefSlot {
                index: 1,
                is_new: true,
                await_submission: Some(4)
            }
        );
    }

    #[test]
    fn test_release_paint_refs() {
        let mut refs: [PaintRef<u32>; 3] = [(3, Some(10)), (8, Some(20)), (2, Some(30))];
        release_completed_paint_refs(&mut refs, Some(&30), 5);
        assert_eq!(refs, [(3, None), (8, Some(20)), (2, Some(30))]);
    }
}
