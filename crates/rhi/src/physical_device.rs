//! Physical device (GPU) selection.
//!
//! Every enumerated GPU is turned into a [`DeviceCandidate`] describing what it
//! offers; the first candidate without a [`Rejection`] is selected. There is
//! no ranking, so with several eligible GPUs the pick depends on the driver's
//! enumeration order.
//!
//! # Example
//!
//! ```no_run
//! # fn demo(instance: &ember_rhi::instance::Instance, surface: &ember_rhi::surface::Surface) {
//! use ember_rhi::physical_device::select_physical_device;
//!
//! let device_info = select_physical_device(instance.handle(), surface)
//!     .expect("Failed to select physical device");
//! println!("Selected GPU: {}", device_info.device_name());
//! # }
//! ```

use std::ffi::CStr;
use std::fmt;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::surface::Surface;
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every selected GPU must provide.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Queue family indices for graphics and presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks that both a graphics and a present family were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the distinct family indices, graphics first.
    ///
    /// One entry when graphics and present share a family, two otherwise.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Why a GPU was not selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// No graphics and/or no present capable queue family.
    MissingQueueFamilies { graphics: bool, present: bool },
    /// Required device extensions that are not supported.
    MissingExtensions(Vec<String>),
    /// The surface reports no formats or no present modes for this GPU.
    InadequateSwapchain,
    /// `samplerAnisotropy` is not supported.
    NoSamplerAnisotropy,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingQueueFamilies { graphics, present } => write!(
                f,
                "missing required queue families (graphics={}, present={})",
                graphics, present
            ),
            Self::MissingExtensions(names) => {
                write!(f, "missing device extensions: {}", names.join(", "))
            }
            Self::InadequateSwapchain => write!(f, "no surface formats or present modes"),
            Self::NoSamplerAnisotropy => write!(f, "sampler anisotropy not supported"),
        }
    }
}

/// The queried facts about one GPU that decide whether it can be used.
#[derive(Clone, Debug, Default)]
pub struct DeviceCandidate {
    pub name: String,
    pub queue_families: QueueFamilyIndices,
    pub missing_extensions: Vec<String>,
    pub swapchain_adequate: bool,
    pub sampler_anisotropy: bool,
}

impl DeviceCandidate {
    /// Returns the first requirement this GPU fails, or `None` if it is eligible.
    ///
    /// Swapchain adequacy is only meaningful once the swapchain extension is
    /// known to be present, so extensions are checked first.
    pub fn rejection(&self) -> Option<Rejection> {
        if !self.queue_families.is_complete() {
            return Some(Rejection::MissingQueueFamilies {
                graphics: self.queue_families.graphics_family.is_some(),
                present: self.queue_families.present_family.is_some(),
            });
        }
        if !self.missing_extensions.is_empty() {
            return Some(Rejection::MissingExtensions(self.missing_extensions.clone()));
        }
        if !self.swapchain_adequate {
            return Some(Rejection::InadequateSwapchain);
        }
        if !self.sampler_anisotropy {
            return Some(Rejection::NoSamplerAnisotropy);
        }
        None
    }
}

/// Returns the index of the first eligible candidate.
pub fn first_eligible(candidates: &[DeviceCandidate]) -> Option<usize> {
    candidates.iter().position(|c| c.rejection().is_none())
}

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        device_name(&self.properties)
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> &str {
    properties
        .device_name_as_c_str()
        .ok()
        .and_then(|name| name.to_str().ok())
        .unwrap_or("Unknown Device")
}

/// Selects the first physical device that can render and present to `surface`.
///
/// Requirements: a graphics queue family, a queue family that can present to
/// the surface, the swapchain extension, at least one surface format and
/// present mode, and `samplerAnisotropy`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU satisfies all requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: &Surface,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut candidates = Vec::with_capacity(devices.len());
    for &device in &devices {
        let candidate = query_candidate(instance, device, surface)?;
        if let Some(rejection) = candidate.rejection() {
            debug!("GPU '{}' skipped: {}", candidate.name, rejection);
        }
        candidates.push(candidate);
    }

    let Some(index) = first_eligible(&candidates) else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let device = devices[index];
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let selected = PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families: candidates[index].queue_families,
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch
    );

    Ok(selected)
}

fn query_candidate(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: &Surface,
) -> RhiResult<DeviceCandidate> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let family_properties = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let queue_families = find_queue_families(&family_properties, |index| {
        surface.supports_present(device, index).unwrap_or(false)
    });

    let available = unsafe { instance.enumerate_device_extension_properties(device)? };
    let available_names: Vec<&CStr> = available
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();
    let missing_extensions = missing_extensions(&REQUIRED_DEVICE_EXTENSIONS, &available_names);

    // Surface queries are only valid with the swapchain extension present.
    let swapchain_adequate = missing_extensions.is_empty()
        && SwapchainSupportDetails::query(device, surface)?.is_adequate();

    Ok(DeviceCandidate {
        name: device_name(&properties).to_string(),
        queue_families,
        missing_extensions,
        swapchain_adequate,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
    })
}

/// Picks the first graphics family and the first family that can present.
///
/// `supports_present` is asked for each family with at least one queue until
/// a present family is found.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() && supports_present(i) {
            indices.present_family = Some(i);
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Names from `required` that are not in `available`.
fn missing_extensions(required: &[&CStr], available: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, queue_count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count,
            ..Default::default()
        }
    }

    fn eligible(name: &str) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            queue_families: QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: Some(0),
            },
            missing_extensions: Vec::new(),
            swapchain_adequate: true,
            sampler_anisotropy: true,
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_unique_families() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(1),
        };
        assert_eq!(split.unique_families(), vec![2, 1]);
    }

    #[test]
    fn test_find_queue_families_shared() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 4),
        ];
        let indices = find_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(0));
    }

    #[test]
    fn test_find_queue_families_separate_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::COMPUTE, 0),
            family(vk::QueueFlags::COMPUTE, 1),
        ];
        let indices = find_queue_families(&families, |i| i >= 1);
        // Family 1 has no queues and is skipped.
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(2));
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_find_queue_families_no_graphics() {
        let families = [family(vk::QueueFlags::COMPUTE, 1)];
        let indices = find_queue_families(&families, |_| true);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_missing_extensions() {
        let required = [ash::khr::swapchain::NAME];
        assert!(missing_extensions(&required, &[c"VK_KHR_foo", ash::khr::swapchain::NAME]).is_empty());
        assert_eq!(
            missing_extensions(&required, &[c"VK_KHR_foo"]),
            vec!["VK_KHR_swapchain".to_string()]
        );
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(eligible("gpu").rejection(), None);

        let mut no_present = eligible("gpu");
        no_present.queue_families.present_family = None;
        assert_eq!(
            no_present.rejection(),
            Some(Rejection::MissingQueueFamilies {
                graphics: true,
                present: false
            })
        );

        let mut no_swapchain_ext = eligible("gpu");
        no_swapchain_ext.missing_extensions = vec!["VK_KHR_swapchain".to_string()];
        no_swapchain_ext.swapchain_adequate = false;
        assert!(matches!(
            no_swapchain_ext.rejection(),
            Some(Rejection::MissingExtensions(_))
        ));

        let mut no_formats = eligible("gpu");
        no_formats.swapchain_adequate = false;
        assert_eq!(no_formats.rejection(), Some(Rejection::InadequateSwapchain));

        let mut no_aniso = eligible("gpu");
        no_aniso.sampler_anisotropy = false;
        assert_eq!(no_aniso.rejection(), Some(Rejection::NoSamplerAnisotropy));
    }

    #[test]
    fn test_first_eligible_wins() {
        let mut integrated = eligible("integrated");
        integrated.sampler_anisotropy = false;
        let candidates = [integrated, eligible("second"), eligible("third")];

        assert_eq!(first_eligible(&candidates), Some(1));
        assert_eq!(first_eligible(&candidates[..1]), None);
        assert_eq!(first_eligible(&[]), None);
    }
}
