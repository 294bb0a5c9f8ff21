// SPDX-License-Identifier: CEPL-1.0
use crate::context::LogicalDevice;
use crate::error::{VkError, VkResultExt};
use ash::vk;

struct SyncSlot {
    image_acquired: vk::Semaphore,
    draw_done: vk::Fence,
}

/// Fixed set of (acquire semaphore, draw fence) pairs, created once and
/// handed out by slot index. Fences start unsignaled.
pub(crate) struct SyncPool {
    device: ash::Device,
    slots: Vec<SyncSlot>,
}

impl SyncPool {
    pub unsafe fn new(dev: &LogicalDevice, count: usize) -> Result<Self, VkError> {
        let mut pool = SyncPool {
            device: dev.raw().clone(),
            slots: Vec::with_capacity(count),
        };
        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo::default();
        for _ in 0..count.max(1) {
            let image_acquired = pool
                .device
                .create_semaphore(&sem_ci, None)
                .vk_context("vkCreateSemaphore")?;
            let draw_done = match pool.device.create_fence(&fence_ci, None) {
                Ok(f) => f,
                Err(result) => {
                    pool.device.destroy_semaphore(image_acquired, None);
                    return Err(VkError::Vk {
                        call: "vkCreateFence",
                        result,
                    });
                }
            };
            pool.slots.push(SyncSlot {
                image_acquired,
                draw_done,
            });
        }
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn image_acquired(&self, slot: usize) -> vk::Semaphore {
        self.slots[slot].image_acquired
    }

    pub fn draw_done(&self, slot: usize) -> vk::Fence {
        self.slots[slot].draw_done
    }
}

impl Drop for SyncPool {
    fn drop(&mut self) {
        unsafe {
            for s in &self.slots {
                self.device.destroy_fence(s.draw_done, None);
                self.device.destroy_semaphore(s.image_acquired, None);
            }
        }
    }
}
