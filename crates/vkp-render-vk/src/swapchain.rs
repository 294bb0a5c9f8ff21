// SPDX-License-Identifier: CEPL-1.0
use crate::context::{DeviceContext, LogicalDevice};
use crate::error::{VkError, VkResultExt};
use crate::select::{QueueCaps, QueueFamilyIndices, QueueFamilySelector};
use ash::khr::{surface, swapchain};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};

/// Format used when the surface has no preference.
pub(crate) const FALLBACK_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

const COMPOSITE_ALPHA_PREFERENCE: [vk::CompositeAlphaFlagsKHR; 4] = [
    vk::CompositeAlphaFlagsKHR::OPAQUE,
    vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::INHERIT,
];

pub(crate) fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::Format, VkError> {
    match formats {
        [] => Err(VkError::NoSurfaceFormat),
        [only] if only.format == vk::Format::UNDEFINED => Ok(FALLBACK_FORMAT),
        [first, ..] => Ok(first.format),
    }
}

/// The surface's current extent, or the requested size clamped into the
/// supported range when the surface leaves it undefined.
pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

pub(crate) fn choose_composite_alpha(
    supported: vk::CompositeAlphaFlagsKHR,
) -> vk::CompositeAlphaFlagsKHR {
    COMPOSITE_ALPHA_PREFERENCE
        .into_iter()
        .find(|&mode| supported.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub(crate) fn choose_pre_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

pub(crate) fn desired_image_count(buffer_count: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    buffer_count.max(caps.min_image_count)
}

/// Concurrent sharing only when graphics and present live in different families.
pub(crate) fn sharing_mode(indices: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if indices.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, indices.unique())
    }
}

pub(crate) struct Surface {
    loader: surface::Instance,
    raw: vk::SurfaceKHR,
}

impl Surface {
    pub unsafe fn create(
        ctx: &DeviceContext,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self, VkError> {
        let raw = ash_window::create_surface(ctx.entry(), ctx.instance(), display, window, None)
            .vk_context("create_surface")?;
        let loader = surface::Instance::new(ctx.entry(), ctx.instance());
        Ok(Surface { loader, raw })
    }

    /// Graphics bit from the family properties, present bit from the surface.
    pub unsafe fn queue_caps(&self, ctx: &DeviceContext) -> Result<Vec<QueueCaps>, VkError> {
        ctx.queue_families()
            .iter()
            .enumerate()
            .map(|(i, family)| -> Result<QueueCaps, VkError> {
                let mut caps = QueueCaps::empty();
                if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                    caps |= QueueCaps::GRAPHICS;
                }
                let present = self
                    .loader
                    .get_physical_device_surface_support(ctx.physical_device(), i as u32, self.raw)
                    .vk_context("vkGetPhysicalDeviceSurfaceSupportKHR")?;
                if present {
                    caps |= QueueCaps::PRESENT;
                }
                Ok(caps)
            })
            .collect()
    }

    pub unsafe fn find_graphics_and_present_queue(
        &self,
        ctx: &DeviceContext,
        selector: &dyn QueueFamilySelector,
    ) -> Result<QueueFamilyIndices, VkError> {
        let caps = self.queue_caps(ctx)?;
        let indices = selector.select(&caps)?;
        info!(
            "queue families: graphics={} present={}",
            indices.graphics, indices.present
        );
        Ok(indices)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.raw, None) };
    }
}

pub(crate) struct Swapchain {
    device: ash::Device,
    loader: swapchain::Device,
    raw: vk::SwapchainKHR,
    format: vk::Format,
    extent: vk::Extent2D,
    views: Vec<vk::ImageView>,
}

impl Swapchain {
    /// `buffer_count` is a lower bound; the surface minimum wins when larger.
    pub unsafe fn setup(
        ctx: &DeviceContext,
        dev: &LogicalDevice,
        surface: &Surface,
        buffer_count: u32,
        width: u32,
        height: u32,
    ) -> Result<Self, VkError> {
        let phys = ctx.physical_device();
        let formats = surface
            .loader
            .get_physical_device_surface_formats(phys, surface.raw)
            .vk_context("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let format = choose_format(&formats)?;

        let caps = surface
            .loader
            .get_physical_device_surface_capabilities(phys, surface.raw)
            .vk_context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let extent = choose_extent(&caps, width, height);
        let image_count = desired_image_count(buffer_count, &caps);
        let (sharing, families) = sharing_mode(&dev.indices());

        // FIFO is the one mode every implementation must support
        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: surface.raw,
            min_image_count: image_count,
            image_format: format,
            image_color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: families.len() as u32,
            p_queue_family_indices: families.as_ptr(),
            pre_transform: choose_pre_transform(&caps),
            composite_alpha: choose_composite_alpha(caps.supported_composite_alpha),
            present_mode: vk::PresentModeKHR::FIFO,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let loader = swapchain::Device::new(ctx.instance(), dev.raw());
        let raw = loader
            .create_swapchain(&swap_info, None)
            .vk_context("vkCreateSwapchainKHR")?;
        let mut chain = Swapchain {
            device: dev.raw().clone(),
            loader,
            raw,
            format,
            extent,
            views: Vec::new(),
        };

        let images = chain
            .loader
            .get_swapchain_images(raw)
            .vk_context("vkGetSwapchainImagesKHR")?;
        for image in images {
            let view = chain.create_view(image)?;
            chain.views.push(view);
        }

        info!(
            "swapchain ready ({}x{}, fmt {:?}, {} images, {:?})",
            extent.width,
            extent.height,
            format,
            chain.views.len(),
            sharing
        );
        Ok(chain)
    }

    unsafe fn create_view(&self, image: vk::Image) -> Result<vk::ImageView, VkError> {
        let iv_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: self.format,
            components: vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            },
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        self.device
            .create_image_view(&iv_info, None)
            .vk_context("vkCreateImageView")
    }

    /// Blocks until the presentation engine hands out an image.
    pub unsafe fn acquire_next_image(&self, signal: vk::Semaphore) -> Result<u32, VkError> {
        let (index, suboptimal) = self
            .loader
            .acquire_next_image(self.raw, u64::MAX, signal, vk::Fence::null())
            .vk_context("vkAcquireNextImageKHR")?;
        if suboptimal {
            debug!("acquired image {index} from a suboptimal swapchain");
        }
        Ok(index)
    }

    pub unsafe fn present(&self, queue: vk::Queue, image_index: u32) -> Result<(), VkError> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            swapchain_count: 1,
            p_swapchains: &self.raw,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let suboptimal = self
            .loader
            .queue_present(queue, &present)
            .vk_context("vkQueuePresentKHR")?;
        if suboptimal {
            debug!("presented image {image_index} to a suboptimal swapchain");
        }
        Ok(())
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.views.len()
    }

    pub fn views(&self) -> impl Iterator<Item = vk::ImageView> + '_ {
        self.views.iter().copied()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.raw, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps_with_undefined_extent() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn undefined_extent_clamps_requested_size() {
        let caps = caps_with_undefined_extent();
        assert_eq!(
            choose_extent(&caps, 30, 30),
            vk::Extent2D {
                width: 64,
                height: 64
            }
        );
        assert_eq!(
            choose_extent(&caps, 5000, 5000),
            vk::Extent2D {
                width: 4096,
                height: 4096
            }
        );
        assert_eq!(
            choose_extent(&caps, 640, 480),
            vk::Extent2D {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn defined_extent_is_used_verbatim() {
        let mut caps = caps_with_undefined_extent();
        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(choose_extent(&caps, 30, 5000), caps.current_extent);
    }

    #[test]
    fn no_preference_format_falls_back_to_bgra() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(choose_format(&formats).unwrap(), FALLBACK_FORMAT);
    }

    #[test]
    fn first_reported_format_wins() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_format(&formats).unwrap(), vk::Format::R8G8B8A8_SRGB);
        assert!(matches!(choose_format(&[]), Err(VkError::NoSurfaceFormat)));
    }

    #[test]
    fn composite_alpha_follows_preference_order() {
        use vk::CompositeAlphaFlagsKHR as A;
        assert_eq!(choose_composite_alpha(A::OPAQUE | A::INHERIT), A::OPAQUE);
        assert_eq!(
            choose_composite_alpha(A::INHERIT | A::POST_MULTIPLIED),
            A::POST_MULTIPLIED
        );
        assert_eq!(choose_composite_alpha(A::INHERIT), A::INHERIT);
        assert_eq!(choose_composite_alpha(A::empty()), A::OPAQUE);
    }

    #[test]
    fn image_count_respects_both_bounds() {
        let caps = caps_with_undefined_extent();
        assert_eq!(desired_image_count(1, &caps), 2);
        assert_eq!(desired_image_count(2, &caps), 2);
        assert_eq!(desired_image_count(3, &caps), 3);
    }

    #[test]
    fn identity_transform_preferred() {
        let mut caps = caps_with_undefined_extent();
        caps.supported_transforms =
            vk::SurfaceTransformFlagsKHR::IDENTITY | vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(
            choose_pre_transform(&caps),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );
        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(
            choose_pre_transform(&caps),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );
    }

    #[test]
    fn sharing_is_concurrent_only_across_families() {
        let shared = QueueFamilyIndices {
            graphics: 0,
            present: 0,
        };
        assert_eq!(sharing_mode(&shared), (vk::SharingMode::EXCLUSIVE, vec![]));
        let split = QueueFamilyIndices {
            graphics: 0,
            present: 2,
        };
        assert_eq!(
            sharing_mode(&split),
            (vk::SharingMode::CONCURRENT, vec![0, 2])
        );
    }
}
