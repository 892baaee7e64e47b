//! Vulkan instance management.
//!
//! Creates the `VkInstance`, optionally with the Khronos validation layer and a
//! debug messenger that forwards validation output to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use ember_rhi::instance::Instance;
//!
//! let instance = Instance::new("ember", cfg!(debug_assertions), &[])
//!     .expect("Failed to create Vulkan instance");
//! let vk_instance = instance.handle();
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

/// The Khronos validation layer name.
pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with optional validation layer support.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    /// Present only when API diagnostics are enabled.
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enables the validation layer and debug messenger
    /// * `window_extensions` - Instance extensions the window system needs for
    ///   surface creation
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Validation is requested but the layer is not installed
    /// - Instance or debug messenger creation fails
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        window_extensions: &[*const c_char],
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        if enable_validation && !Self::is_validation_layer_available(&entry)? {
            error!("Validation layer requested but not available");
            return Err(RhiError::ValidationLayerUnavailable(
                VALIDATION_LAYER_NAME.to_string_lossy().into_owned(),
            ));
        }

        let app_name = CString::new(app_name)
            .map_err(|e| ember_core::Error::Config(format!("invalid application name: {}", e)))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"ember")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let extensions = merge_extensions(window_extensions, enable_validation);

        let layers = if enable_validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        // Chained into instance creation so that vkCreateInstance and
        // vkDestroyInstance are covered as well.
        let mut messenger_info = debug_messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        if enable_validation {
            create_info = create_info.push_next(&mut messenger_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created for '{}' (API version 1.2, {} extensions)",
            app_name.to_string_lossy(),
            extensions.len()
        );

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = match unsafe {
                debug_utils.create_debug_utils_messenger(&debug_messenger_create_info(), None)
            } {
                Ok(messenger) => messenger,
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            };
            info!("Validation layers enabled");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let found = available_layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
        });

        Ok(found)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
                debug!("Debug messenger destroyed");
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Window-system extensions plus debug utils when diagnostics are enabled.
fn merge_extensions(window_extensions: &[*const c_char], enable_validation: bool) -> Vec<*const c_char> {
    let mut extensions = window_extensions.to_vec();
    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    extensions
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Forwards validation layer messages to `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader; `p_callback_data` is either null or valid for
/// the duration of the call.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan {}] {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[Vulkan {}] {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => info!("[Vulkan {}] {}", type_str, message),
        _ => debug!("[Vulkan {}] {}", type_str, message),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_creation_without_validation() {
        match Instance::new("ember-test", false, &[]) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_instance_creation_with_validation() {
        match Instance::new("ember-test", true, &[]) {
            Ok(instance) => {
                assert!(instance.has_validation());
                assert!(instance.debug_utils.is_some());
            }
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(RhiError::ValidationLayerUnavailable(name)) => {
                assert_eq!(name, "VK_LAYER_KHRONOS_validation");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_invalid_app_name() {
        match Instance::new("bad\0name", false, &[]) {
            Err(RhiError::Core(ember_core::Error::Config(_))) => {}
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            other => panic!("Unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn test_messenger_reports_every_severity() {
        let create_info = debug_messenger_create_info();
        assert!(create_info.message_severity.contains(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
        ));
        assert!(create_info.pfn_user_callback.is_some());
    }

    #[test]
    fn test_merge_extensions() {
        let window = [ash::khr::surface::NAME.as_ptr()];

        let plain = merge_extensions(&window, false);
        assert_eq!(plain, window.to_vec());

        let with_debug = merge_extensions(&window, true);
        assert_eq!(with_debug.len(), 2);
        assert_eq!(with_debug[0], window[0]);
        assert_eq!(with_debug[1], ash::ext::debug_utils::NAME.as_ptr());
    }
}
