// SPDX-License-Identifier: CEPL-1.0
use crate::error::{VkError, VkResultExt};
use crate::select::{MemoryTypeTable, QueueFamilyIndices};
use ash::ext::debug_utils;
use ash::khr::swapchain;
use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, c_void, CStr, CString};
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// 1.1 when the loader can do it, otherwise 1.0. `loader` is what
/// `vkEnumerateInstanceVersion` reported (absent on 1.0 loaders).
pub(crate) fn pick_api_version(loader: Option<u32>) -> u32 {
    match loader {
        Some(v) if v >= vk::API_VERSION_1_1 => vk::API_VERSION_1_1,
        _ => vk::API_VERSION_1_0,
    }
}

/// First enumerated device, no suitability ranking.
pub(crate) fn select_primary<T: Copy>(devices: &[T]) -> Result<T, VkError> {
    devices.first().copied().ok_or(VkError::NoDevice)
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!("[vulkan] {msg}");
    } else {
        debug!("[vulkan] {msg}");
    }
    vk::FALSE
}

pub(crate) unsafe fn create_instance(
    entry: &Entry,
    app_name: &str,
    api_version: u32,
    extensions: &[*const c_char],
    layers: &[&CStr],
) -> Result<Instance, VkError> {
    let name = CString::new(app_name)?;
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: name.as_ptr(),
        application_version: 1,
        p_engine_name: name.as_ptr(),
        engine_version: 1,
        api_version,
        ..Default::default()
    };

    let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();
    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        ..Default::default()
    };

    entry
        .create_instance(&create_info, None)
        .vk_context("vkCreateInstance")
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT), VkError> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .vk_context("vkCreateDebugUtilsMessengerEXT")?;
    Ok((loader, messenger))
}

/// Instance plus the selected physical device and what it advertises.
pub(crate) struct DeviceContext {
    entry: Entry,
    instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    api_version: u32,
    phys: vk::PhysicalDevice,
    queue_families: Vec<vk::QueueFamilyProperties>,
    memory_types: MemoryTypeTable,
}

impl DeviceContext {
    pub unsafe fn new(
        display: RawDisplayHandle,
        app_name: &str,
        validation: bool,
    ) -> Result<Self, VkError> {
        let entry = Entry::linked();

        let api_version = pick_api_version(
            entry
                .try_enumerate_instance_version()
                .vk_context("vkEnumerateInstanceVersion")?,
        );

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .vk_context("enumerate_required_extensions")?
            .to_vec();
        let mut layers = Vec::new();
        if validation {
            extensions.push(debug_utils::NAME.as_ptr());
            layers.push(VALIDATION_LAYER);
        }

        let instance = create_instance(&entry, app_name, api_version, &extensions, &layers)?;
        info!(
            "instance created (api {}.{}, validation={})",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            validation
        );

        let mut ctx = DeviceContext {
            entry,
            instance,
            debug: None,
            api_version,
            phys: vk::PhysicalDevice::null(),
            queue_families: Vec::new(),
            memory_types: MemoryTypeTable::default(),
        };
        if validation {
            ctx.debug = Some(create_debug_messenger(&ctx.entry, &ctx.instance)?);
        }

        ctx.select_primary_device()?;
        ctx.query_queue_families();
        Ok(ctx)
    }

    unsafe fn select_primary_device(&mut self) -> Result<(), VkError> {
        let devices = self
            .instance
            .enumerate_physical_devices()
            .vk_context("vkEnumeratePhysicalDevices")?;
        let phys = select_primary(&devices)?;

        let props = self.instance.get_physical_device_properties(phys);
        if props.api_version < self.api_version {
            return Err(VkError::UnsupportedApiVersion {
                requested: self.api_version,
                supported: props.api_version,
            });
        }

        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("physical device: {name} ({} available)", devices.len());
        self.phys = phys;
        Ok(())
    }

    unsafe fn query_queue_families(&mut self) {
        self.queue_families = self
            .instance
            .get_physical_device_queue_family_properties(self.phys);
        let mem = self.instance.get_physical_device_memory_properties(self.phys);
        self.memory_types = MemoryTypeTable::from_properties(&mem);
        debug!(
            "{} queue families, {} memory types",
            self.queue_families.len(),
            self.memory_types.len()
        );
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.phys
    }

    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_families
    }

    pub fn memory_types(&self) -> &MemoryTypeTable {
        &self.memory_types
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Logical device, its queues and the single reusable graphics command buffer.
pub(crate) struct LogicalDevice {
    device: ash::Device,
    indices: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    cmd_pool: vk::CommandPool,
    cmd_buf: vk::CommandBuffer,
}

impl LogicalDevice {
    pub unsafe fn new(ctx: &DeviceContext, indices: QueueFamilyIndices) -> Result<Self, VkError> {
        let device = Self::create_logical_device(ctx, indices)?;
        let mut dev = LogicalDevice {
            device,
            indices,
            graphics_queue: vk::Queue::null(),
            present_queue: vk::Queue::null(),
            cmd_pool: vk::CommandPool::null(),
            cmd_buf: vk::CommandBuffer::null(),
        };
        dev.setup_device_queue();
        dev.create_command_pool()?;
        dev.create_command_buffer()?;
        Ok(dev)
    }

    unsafe fn create_logical_device(
        ctx: &DeviceContext,
        indices: QueueFamilyIndices,
    ) -> Result<ash::Device, VkError> {
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = indices
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let device_exts = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };

        ctx.instance()
            .create_device(ctx.physical_device(), &dinfo, None)
            .vk_context("vkCreateDevice")
    }

    unsafe fn setup_device_queue(&mut self) {
        self.graphics_queue = self.device.get_device_queue(self.indices.graphics, 0);
        self.present_queue = if self.indices.is_shared() {
            self.graphics_queue
        } else {
            self.device.get_device_queue(self.indices.present, 0)
        };
    }

    unsafe fn create_command_pool(&mut self) -> Result<(), VkError> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: self.indices.graphics,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        self.cmd_pool = self
            .device
            .create_command_pool(&pool_info, None)
            .vk_context("vkCreateCommandPool")?;
        Ok(())
    }

    unsafe fn create_command_buffer(&mut self) -> Result<(), VkError> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.cmd_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        self.cmd_buf = self
            .device
            .allocate_command_buffers(&alloc_info)
            .vk_context("vkAllocateCommandBuffers")?[0];
        Ok(())
    }

    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub fn indices(&self) -> QueueFamilyIndices {
        self.indices
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd_buf
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device;
            d.device_wait_idle().ok();
            if self.cmd_buf != vk::CommandBuffer::null() {
                d.free_command_buffers(self.cmd_pool, std::slice::from_ref(&self.cmd_buf));
            }
            if self.cmd_pool != vk::CommandPool::null() {
                d.destroy_command_pool(self.cmd_pool, None);
            }
            d.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_devices_is_no_device() {
        let none: [vk::PhysicalDevice; 0] = [];
        assert!(matches!(select_primary(&none), Err(VkError::NoDevice)));
    }

    #[test]
    fn first_device_is_primary() {
        assert_eq!(select_primary(&[7u32, 3, 9]).unwrap(), 7);
    }

    #[test]
    fn api_version_negotiation() {
        assert_eq!(pick_api_version(None), vk::API_VERSION_1_0);
        assert_eq!(pick_api_version(Some(vk::API_VERSION_1_0)), vk::API_VERSION_1_0);
        assert_eq!(
            pick_api_version(Some(vk::make_api_version(0, 1, 3, 250))),
            vk::API_VERSION_1_1
        );
    }
}
