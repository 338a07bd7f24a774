//! Device memory through gpu-allocator.

use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};

use super::conversion::{
    buffer_handle, convert_buffer_usage, convert_image_usage, convert_texture_format,
    image_handle, vk_creation_error,
};
use crate::backend::{BackendError, GpuAllocator};
use crate::types::{BufferDescriptor, BufferHandle, ImageDescriptor, ImageHandle};

/// Buffer and image allocator for one logical device.
///
/// Must be dropped before the device it was created from.
pub struct VulkanAllocator {
    device: ash::Device,
    allocator: Option<Allocator>,
    buffers: HashMap<u64, (vk::Buffer, Allocation)>,
    images: HashMap<u64, (vk::Image, Allocation)>,
}

impl VulkanAllocator {
    /// Create the allocator for `device`.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Result<Self, BackendError> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
        })?;

        Ok(Self {
            device,
            allocator: Some(allocator),
            buffers: HashMap::new(),
            images: HashMap::new(),
        })
    }

    fn allocator(&mut self) -> Result<&mut Allocator, BackendError> {
        self.allocator
            .as_mut()
            .ok_or_else(|| BackendError::Internal("allocator already released".into()))
    }

    fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation, BackendError> {
        self.allocator()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| match e {
                gpu_allocator::AllocationError::OutOfMemory => BackendError::OutOfMemory,
                other => BackendError::ResourceCreationFailed(format!(
                    "Failed to allocate memory for '{}': {}",
                    name, other
                )),
            })
    }

    fn free(&mut self, allocation: Allocation) {
        if let Ok(allocator) = self.allocator()
            && let Err(e) = allocator.free(allocation)
        {
            log::error!("Failed to free allocation: {}", e);
        }
    }
}

impl GpuAllocator for VulkanAllocator {
    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
    ) -> Result<BufferHandle, BackendError> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| vk_creation_error("Failed to create buffer", e))?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let location = if descriptor.host_visible {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };
        let allocation =
            match self.allocate(descriptor.label_or_default(), requirements, location, true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { self.device.destroy_buffer(buffer, None) };
                    return Err(e);
                }
            };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free(allocation);
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(vk_creation_error("Failed to bind buffer memory", e));
        }

        self.buffers.insert(buffer.as_raw(), (buffer, allocation));
        Ok(buffer_handle(buffer))
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let Some((_, allocation)) = self.buffers.get_mut(&buffer.as_raw()) else {
            return Err(BackendError::InvalidParameter(format!(
                "unknown buffer {:?}",
                buffer
            )));
        };

        let Some(mapped) = allocation.mapped_slice_mut() else {
            return Err(BackendError::InvalidParameter(
                "buffer is not mapped for CPU access".into(),
            ));
        };

        let start = offset as usize;
        let end = start.saturating_add(data.len());
        let Some(dst) = mapped.get_mut(start..end) else {
            return Err(BackendError::InvalidParameter(format!(
                "write of {} bytes at offset {} exceeds mapped size {}",
                data.len(),
                offset,
                mapped.len()
            )));
        };
        dst.copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<(), BackendError> {
        let Some((raw, allocation)) = self.buffers.remove(&buffer.as_raw()) else {
            return Err(BackendError::InvalidParameter(format!(
                "unknown buffer {:?}",
                buffer
            )));
        };
        unsafe { self.device.destroy_buffer(raw, None) };
        self.free(allocation);
        Ok(())
    }

    fn create_image(&mut self, descriptor: &ImageDescriptor) -> Result<ImageHandle, BackendError> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(convert_texture_format(descriptor.format))
            .extent(vk::Extent3D {
                width: descriptor.extent.width,
                height: descriptor.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_image_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }
            .map_err(|e| vk_creation_error("Failed to create image", e))?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate(
            descriptor.label_or_default(),
            requirements,
            MemoryLocation::GpuOnly,
            false,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free(allocation);
            unsafe { self.device.destroy_image(image, None) };
            return Err(vk_creation_error("Failed to bind image memory", e));
        }

        self.images.insert(image.as_raw(), (image, allocation));
        Ok(image_handle(image))
    }

    fn destroy_image(&mut self, image: ImageHandle) -> Result<(), BackendError> {
        let Some((raw, allocation)) = self.images.remove(&image.as_raw()) else {
            return Err(BackendError::InvalidParameter(format!(
                "unknown image {:?}",
                image
            )));
        };
        unsafe { self.device.destroy_image(raw, None) };
        self.free(allocation);
        Ok(())
    }

    fn live_allocations(&self) -> usize {
        self.buffers.len() + self.images.len()
    }
}

impl Drop for VulkanAllocator {
    fn drop(&mut self) {
        let leaked = self.live_allocations();
        if leaked > 0 {
            log::warn!("Releasing {} allocation(s) still held at allocator drop", leaked);
        }

        let buffers: Vec<_> = self.buffers.drain().map(|(_, entry)| entry).collect();
        for (buffer, allocation) in buffers {
            unsafe { self.device.destroy_buffer(buffer, None) };
            self.free(allocation);
        }
        let images: Vec<_> = self.images.drain().map(|(_, entry)| entry).collect();
        for (image, allocation) in images {
            unsafe { self.device.destroy_image(image, None) };
            self.free(allocation);
        }

        if self.allocator.take().is_some() {
            log::debug!("Memory allocator released");
        }
    }
}
