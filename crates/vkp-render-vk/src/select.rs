// SPDX-License-Identifier: CEPL-1.0
//! Pluggable device selection policies.
//!
//! The defaults reproduce the plain scan-order behaviour: no scoring, the
//! first match in index order wins. Stricter policies can be dropped in
//! through `VkRendererConfig` without touching the setup sequence.

use crate::error::VkError;
use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// What a queue family can do for us.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct QueueCaps: u8 {
        const GRAPHICS = 1 << 0;
        const PRESENT = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct families, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

pub trait QueueFamilySelector {
    fn select(&self, families: &[QueueCaps]) -> Result<QueueFamilyIndices, VkError>;
}

/// Scan families in index order. Every graphics-capable family overwrites
/// the graphics pick and every present-capable one the present pick; the
/// scan stops as soon as both picks name the same family.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScanOrder;

impl QueueFamilySelector for ScanOrder {
    fn select(&self, families: &[QueueCaps]) -> Result<QueueFamilyIndices, VkError> {
        let mut graphics = None;
        let mut present = None;

        for (i, caps) in families.iter().enumerate() {
            let i = i as u32;
            if caps.contains(QueueCaps::GRAPHICS) {
                graphics = Some(i);
            }
            if caps.contains(QueueCaps::PRESENT) {
                present = Some(i);
            }
            if graphics.is_some() && graphics == present {
                break;
            }
        }

        Ok(QueueFamilyIndices {
            graphics: graphics.ok_or(VkError::NoGraphicsQueue)?,
            present: present.ok_or(VkError::NoPresentQueue)?,
        })
    }
}

/// Memory property flags per advertised memory type, in device order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryTypeTable {
    types: Vec<vk::MemoryPropertyFlags>,
}

impl MemoryTypeTable {
    pub fn new(types: Vec<vk::MemoryPropertyFlags>) -> Self {
        Self { types }
    }

    pub fn from_properties(props: &vk::PhysicalDeviceMemoryProperties) -> Self {
        let count = (props.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
        Self::new(
            props.memory_types[..count]
                .iter()
                .map(|t| t.property_flags)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn flags(&self, index: u32) -> Option<vk::MemoryPropertyFlags> {
        self.types.get(index as usize).copied()
    }
}

pub trait MemoryTypeSelector {
    /// Pick a memory type index allowed by `type_bits` that carries at least
    /// `required`. `None` when nothing qualifies.
    fn select(
        &self,
        table: &MemoryTypeTable,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Option<u32>;
}

/// Lowest index whose bit is set in the mask and whose flags are a superset
/// of `required`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstMatch;

impl MemoryTypeSelector for FirstMatch {
    fn select(
        &self,
        table: &MemoryTypeTable,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        table
            .types
            .iter()
            .enumerate()
            .take(32)
            .find(|(i, flags)| type_bits & (1 << i) != 0 && flags.contains(required))
            .map(|(i, _)| i as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: QueueCaps = QueueCaps::GRAPHICS;
    const P: QueueCaps = QueueCaps::PRESENT;

    fn both() -> QueueCaps {
        G | P
    }

    #[test]
    fn combined_family_found_after_graphics_only() {
        let picked = ScanOrder.select(&[G, both(), P]).unwrap();
        assert_eq!(picked, QueueFamilyIndices { graphics: 1, present: 1 });
        assert!(picked.is_shared());
        assert_eq!(picked.unique(), vec![1]);
    }

    #[test]
    fn last_graphics_family_wins_without_a_combined_one() {
        let picked = ScanOrder.select(&[G, G, P]).unwrap();
        assert_eq!(picked, QueueFamilyIndices { graphics: 1, present: 2 });
        assert_eq!(picked.unique(), vec![1, 2]);
    }

    #[test]
    fn earlier_combined_family_beats_later_graphics() {
        let picked = ScanOrder.select(&[both(), G, G]).unwrap();
        assert_eq!(picked, QueueFamilyIndices { graphics: 0, present: 0 });
    }

    #[test]
    fn leading_incapable_family_is_skipped() {
        let picked = ScanOrder.select(&[QueueCaps::empty(), both()]).unwrap();
        assert_eq!(picked, QueueFamilyIndices { graphics: 1, present: 1 });
    }

    #[test]
    fn no_graphics_anywhere() {
        let err = ScanOrder.select(&[P, P]).unwrap_err();
        assert!(matches!(err, VkError::NoGraphicsQueue));
        let err = ScanOrder.select(&[]).unwrap_err();
        assert!(matches!(err, VkError::NoGraphicsQueue));
    }

    #[test]
    fn no_present_anywhere() {
        let err = ScanOrder.select(&[G, G]).unwrap_err();
        assert!(matches!(err, VkError::NoPresentQueue));
    }

    fn table() -> MemoryTypeTable {
        use vk::MemoryPropertyFlags as M;
        MemoryTypeTable::new(vec![
            M::DEVICE_LOCAL,
            M::HOST_VISIBLE,
            M::DEVICE_LOCAL,
            M::HOST_VISIBLE | M::HOST_COHERENT,
        ])
    }

    #[test]
    fn requested_property_narrows_the_mask() {
        let mask = (1 << 1) | (1 << 3);
        let picked = FirstMatch.select(&table(), mask, vk::MemoryPropertyFlags::HOST_COHERENT);
        assert_eq!(picked, Some(3));
    }

    #[test]
    fn no_requirement_takes_first_allowed_type() {
        let mask = (1 << 2) | (1 << 3);
        assert_eq!(
            FirstMatch.select(&table(), mask, vk::MemoryPropertyFlags::empty()),
            Some(2)
        );
    }

    #[test]
    fn nothing_matches() {
        assert_eq!(
            FirstMatch.select(&table(), 0, vk::MemoryPropertyFlags::empty()),
            None
        );
        assert_eq!(
            FirstMatch.select(&table(), 1 << 0, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
        // bits beyond the advertised types are ignored
        assert_eq!(
            FirstMatch.select(&table(), 1 << 7, vk::MemoryPropertyFlags::empty()),
            None
        );
    }

    #[test]
    fn table_from_device_properties_respects_count() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::HOST_CACHED;
        let t = MemoryTypeTable::from_properties(&props);
        assert_eq!(t.len(), 2);
        assert_eq!(t.flags(1), Some(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert_eq!(t.flags(2), None);
    }
}
