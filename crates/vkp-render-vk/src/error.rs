// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("no Vulkan physical device available")]
    NoDevice,
    #[error("unable to find a graphics queue on device")]
    NoGraphicsQueue,
    #[error("unable to find a present queue on device")]
    NoPresentQueue,
    #[error("unable to find suitable memory for {what}")]
    NoSuitableMemory { what: &'static str },
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
    #[error(
        "Vulkan {} not supported by device (max version {})",
        version_str(.requested),
        version_str(.supported)
    )]
    UnsupportedApiVersion { requested: u32, supported: u32 },
    #[error("shader {}: {source}", .path.display())]
    Shader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("application name: {0}")]
    AppName(#[from] std::ffi::NulError),
    #[error("window handle: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
    #[error("frame loop halted: sync slot {slot} holds an unconsumed acquire signal")]
    StrandedSlot { slot: usize },
    #[error("{call}: {}", describe(.result))]
    Vk {
        call: &'static str,
        result: vk::Result,
    },
}

impl VkError {
    /// Native result code behind this error, if it came from a device call.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            VkError::Vk { result, .. } => Some(*result),
            _ => None,
        }
    }
}

pub(crate) trait VkResultExt<T> {
    /// Tag a failing native call with its entry point name.
    fn vk_context(self, call: &'static str) -> Result<T, VkError>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn vk_context(self, call: &'static str) -> Result<T, VkError> {
        self.map_err(|result| VkError::Vk { call, result })
    }
}

fn describe(result: &vk::Result) -> &'static str {
    vk_result_message(*result)
}

fn version_str(v: &u32) -> String {
    format!("{}.{}", vk::api_version_major(*v), vk::api_version_minor(*v))
}

/// Human readable text for a native result code.
pub fn vk_result_message(result: vk::Result) -> &'static str {
    match result {
        // success codes
        vk::Result::SUCCESS => "Command successfully completed.",
        vk::Result::NOT_READY => "A fence or query has not yet completed.",
        vk::Result::TIMEOUT => "A wait operation has not completed in the specified time.",
        vk::Result::EVENT_SET => "An event is signaled.",
        vk::Result::EVENT_RESET => "An event is unsignaled.",
        vk::Result::INCOMPLETE => "A return array was too small for the result.",
        vk::Result::SUBOPTIMAL_KHR => {
            "A swapchain no longer matches the surface properties exactly, but can still be used to present to the surface successfully."
        }
        // error codes
        vk::Result::ERROR_OUT_OF_HOST_MEMORY => "A host memory allocation has failed.",
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => "A device memory allocation has failed.",
        vk::Result::ERROR_INITIALIZATION_FAILED => {
            "Initialization of an object could not be completed for implementation-specific reasons."
        }
        vk::Result::ERROR_DEVICE_LOST => "The logical or physical device has been lost.",
        vk::Result::ERROR_MEMORY_MAP_FAILED => "Mapping of a memory object has failed.",
        vk::Result::ERROR_LAYER_NOT_PRESENT => {
            "A requested layer is not present or could not be loaded."
        }
        vk::Result::ERROR_EXTENSION_NOT_PRESENT => "A requested extension is not supported.",
        vk::Result::ERROR_FEATURE_NOT_PRESENT => "A requested feature is not supported.",
        vk::Result::ERROR_INCOMPATIBLE_DRIVER => {
            "The requested version of Vulkan is not supported by the driver or is otherwise incompatible for implementation-specific reasons."
        }
        vk::Result::ERROR_TOO_MANY_OBJECTS => {
            "Too many objects of the type have already been created."
        }
        vk::Result::ERROR_FORMAT_NOT_SUPPORTED => {
            "A requested format is not supported on this device."
        }
        vk::Result::ERROR_FRAGMENTED_POOL => {
            "A pool allocation has failed due to fragmentation of the pool's memory."
        }
        vk::Result::ERROR_SURFACE_LOST_KHR => "A surface is no longer available.",
        vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => {
            "The requested window is already in use by Vulkan or another API in a manner which prevents it from being used again."
        }
        vk::Result::ERROR_OUT_OF_DATE_KHR => {
            "A surface has changed in such a way that it is no longer compatible with the swapchain, and further presentation requests using the swapchain will fail."
        }
        vk::Result::ERROR_INCOMPATIBLE_DISPLAY_KHR => {
            "The display used by a swapchain does not use the same presentable image layout, or is incompatible in a way that prevents sharing an image."
        }
        vk::Result::ERROR_INVALID_SHADER_NV => "One or more shaders failed to compile or link.",
        vk::Result::ERROR_OUT_OF_POOL_MEMORY => "A pool memory allocation has failed.",
        vk::Result::ERROR_INVALID_EXTERNAL_HANDLE => {
            "An external handle is not a valid handle of the specified type."
        }
        vk::Result::ERROR_FRAGMENTATION => {
            "A descriptor pool creation has failed due to fragmentation."
        }
        vk::Result::ERROR_INVALID_OPAQUE_CAPTURE_ADDRESS => {
            "A buffer creation failed because the requested address is not available."
        }
        _ => "An unknown error occurred.",
    }
}
