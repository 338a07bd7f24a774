//! Resource allocator.
//!
//! Wraps the backend's device-memory allocator. Buffers and images are
//! returned as owned [`GpuBuffer`]/[`GpuImage`] values; giving one back to
//! [`ResourceAllocator::destroy_buffer`] or [`ResourceAllocator::destroy_image`]
//! frees the object and its memory together.
//!
//! Host-visible buffers can be filled at creation time. The copy happens
//! before `create_buffer` returns, so there is no upload to wait for.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backend::GpuAllocator;
use crate::device::{DeviceContext, SubmissionTracker};
use crate::error::{AllocationError, InitError, ResourceBusyError, SurfaceError};
use crate::types::{
    BufferDescriptor, BufferHandle, BufferUsage, Extent2D, ImageDescriptor, ImageHandle,
    TextureFormat,
};

/// A buffer and its memory.
#[derive(Debug, PartialEq, Eq)]
pub struct GpuBuffer {
    handle: BufferHandle,
    size: u64,
    usage: BufferUsage,
    host_visible: bool,
    label: String,
}

impl GpuBuffer {
    /// Get the buffer handle.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Get the size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Check if the buffer lives in host-visible memory.
    pub fn is_host_visible(&self) -> bool {
        self.host_visible
    }

    /// Get the debug label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// An image and its memory.
#[derive(Debug, PartialEq, Eq)]
pub struct GpuImage {
    handle: ImageHandle,
    extent: Extent2D,
    format: TextureFormat,
    label: String,
}

impl GpuImage {
    /// Get the image handle.
    pub fn handle(&self) -> ImageHandle {
        self.handle
    }

    /// Get the extent.
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Get the pixel format.
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Get the debug label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Snapshot of allocator bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorReport {
    /// Buffers created and not destroyed.
    pub outstanding_buffers: usize,
    /// Images created and not destroyed.
    pub outstanding_images: usize,
    /// Bytes held by outstanding buffers.
    pub outstanding_bytes: u64,
    /// Buffers created over the allocator's lifetime.
    pub buffers_created: u64,
    /// Images created over the allocator's lifetime.
    pub images_created: u64,
    /// Allocations the backend itself still tracks.
    pub backend_allocations: usize,
}

impl AllocatorReport {
    /// Total outstanding allocations.
    pub fn outstanding(&self) -> usize {
        self.outstanding_buffers + self.outstanding_images
    }

    /// Check if nothing is outstanding.
    pub fn is_clean(&self) -> bool {
        self.outstanding() == 0 && self.backend_allocations == 0
    }
}

/// Creates and destroys buffers and images on the device.
///
/// Created strictly after the logical device and shut down strictly before it.
pub struct ResourceAllocator {
    allocator: Box<dyn GpuAllocator>,
    submissions: Arc<SubmissionTracker>,
    buffers: HashMap<BufferHandle, u64>,
    images: HashSet<ImageHandle>,
    buffers_created: u64,
    images_created: u64,
}

impl std::fmt::Debug for ResourceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceAllocator")
            .field("report", &self.report())
            .finish()
    }
}

impl ResourceAllocator {
    /// Bind an allocator to the device.
    pub fn init(ctx: &DeviceContext) -> Result<Self, InitError> {
        let allocator = ctx.device().create_allocator()?;
        log::debug!("Resource allocator bound to {}", ctx.adapter().name);
        Ok(Self {
            allocator,
            submissions: Arc::clone(ctx.submissions()),
            buffers: HashMap::new(),
            images: HashSet::new(),
            buffers_created: 0,
            images_created: 0,
        })
    }

    /// Create a buffer, optionally filled with `contents`.
    ///
    /// `contents` requires a host-visible buffer and must fit in it. The bytes
    /// are mapped, copied and unmapped before this returns.
    pub fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
        contents: Option<&[u8]>,
    ) -> Result<GpuBuffer, AllocationError> {
        let label = descriptor.label_or_default().to_string();

        if descriptor.size == 0 {
            return Err(AllocationError::ZeroSize(label));
        }
        if let Some(data) = contents {
            if !descriptor.host_visible {
                return Err(AllocationError::NotHostVisible(label));
            }
            if data.len() as u64 > descriptor.size {
                return Err(AllocationError::ContentsTooLarge {
                    data: data.len() as u64,
                    size: descriptor.size,
                });
            }
        }

        let handle = self
            .allocator
            .create_buffer(descriptor)
            .map_err(|source| AllocationError::Backend {
                label: label.clone(),
                source,
            })?;

        if let Some(data) = contents
            && let Err(source) = self.allocator.write_buffer(handle, 0, data)
        {
            if let Err(e) = self.allocator.destroy_buffer(handle) {
                log::warn!("Failed to free '{}' after upload error: {}", label, e);
            }
            return Err(AllocationError::Backend { label, source });
        }

        self.buffers.insert(handle, descriptor.size);
        self.buffers_created += 1;
        log::debug!(
            "Created buffer '{}' ({} bytes, {:?})",
            label,
            descriptor.size,
            descriptor.usage
        );

        Ok(GpuBuffer {
            handle,
            size: descriptor.size,
            usage: descriptor.usage,
            host_visible: descriptor.host_visible,
            label,
        })
    }

    /// Free a buffer and its memory.
    ///
    /// Fails with [`ResourceBusyError`] while any submission is outstanding.
    /// A buffer rejected this way stays registered and is reclaimed at
    /// [`ResourceAllocator::shutdown`].
    pub fn destroy_buffer(&mut self, buffer: GpuBuffer) -> Result<(), SurfaceError> {
        self.ensure_idle(&buffer.label)?;
        if self.buffers.remove(&buffer.handle).is_none() {
            return Err(AllocationError::UnknownBuffer(buffer.label).into());
        }
        self.allocator
            .destroy_buffer(buffer.handle)
            .map_err(|source| AllocationError::Backend {
                label: buffer.label.clone(),
                source,
            })?;
        log::debug!("Destroyed buffer '{}'", buffer.label);
        Ok(())
    }

    /// Create an image.
    pub fn create_image(
        &mut self,
        descriptor: &ImageDescriptor,
    ) -> Result<GpuImage, AllocationError> {
        let label = descriptor.label_or_default().to_string();
        if descriptor.extent.is_empty() {
            return Err(AllocationError::ZeroSize(label));
        }

        let handle = self
            .allocator
            .create_image(descriptor)
            .map_err(|source| AllocationError::Backend {
                label: label.clone(),
                source,
            })?;
        self.images.insert(handle);
        self.images_created += 1;
        log::debug!(
            "Created image '{}' ({}, {:?})",
            label,
            descriptor.extent,
            descriptor.format
        );

        Ok(GpuImage {
            handle,
            extent: descriptor.extent,
            format: descriptor.format,
            label,
        })
    }

    /// Free an image and its memory. Same contract as [`Self::destroy_buffer`].
    pub fn destroy_image(&mut self, image: GpuImage) -> Result<(), SurfaceError> {
        self.ensure_idle(&image.label)?;
        if !self.images.remove(&image.handle) {
            return Err(AllocationError::UnknownImage(image.label).into());
        }
        self.allocator
            .destroy_image(image.handle)
            .map_err(|source| AllocationError::Backend {
                label: image.label.clone(),
                source,
            })?;
        log::debug!("Destroyed image '{}'", image.label);
        Ok(())
    }

    /// Fail if submitted work may still reference resources.
    pub fn ensure_idle(&self, resource: &str) -> Result<(), ResourceBusyError> {
        let outstanding = self.submissions.outstanding();
        if outstanding == 0 {
            Ok(())
        } else {
            Err(ResourceBusyError {
                resource: resource.to_string(),
                outstanding,
            })
        }
    }

    /// Current bookkeeping.
    pub fn report(&self) -> AllocatorReport {
        AllocatorReport {
            outstanding_buffers: self.buffers.len(),
            outstanding_images: self.images.len(),
            outstanding_bytes: self.buffers.values().sum(),
            buffers_created: self.buffers_created,
            images_created: self.images_created,
            backend_allocations: self.allocator.live_allocations(),
        }
    }

    /// Release the allocator, returning what was still outstanding.
    ///
    /// Anything left over is logged as a leak and freed so the device can be
    /// destroyed afterwards.
    pub fn shutdown(mut self) -> AllocatorReport {
        let report = self.report();

        if !report.is_clean() {
            log::error!(
                "Resource allocator shut down with {} buffer(s) ({} bytes) and {} image(s) outstanding",
                report.outstanding_buffers,
                report.outstanding_bytes,
                report.outstanding_images
            );
            for (handle, _) in self.buffers.drain() {
                if let Err(e) = self.allocator.destroy_buffer(handle) {
                    log::error!("Failed to free leaked {:?}: {}", handle, e);
                }
            }
            for handle in self.images.drain() {
                if let Err(e) = self.allocator.destroy_image(handle) {
                    log::error!("Failed to free leaked {:?}: {}", handle, e);
                }
            }
        }

        log::info!(
            "Resource allocator shut down ({} buffers, {} images created)",
            report.buffers_created,
            report.images_created
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::ImageUsage;

    fn setup() -> (DummyBackend, DeviceContext) {
        let backend = DummyBackend::new();
        let surface = backend.create_surface();
        let ctx = DeviceContext::acquire(backend.instance(), surface).unwrap();
        (backend, ctx)
    }

    #[test]
    fn test_host_visible_buffer_is_filled_on_create() {
        let (backend, ctx) = setup();
        let mut allocator = ResourceAllocator::init(&ctx).unwrap();

        let descriptor = BufferDescriptor::new(4, BufferUsage::VERTEX)
            .with_label("bytes")
            .with_host_visible(true);
        let buffer = allocator
            .create_buffer(&descriptor, Some(&[1, 2, 3, 4]))
            .unwrap();
        assert_eq!(backend.buffer_contents(buffer.handle()), Some(vec![1, 2, 3, 4]));
        assert_eq!(buffer.label(), "bytes");

        allocator.destroy_buffer(buffer).unwrap();
        assert!(allocator.shutdown().is_clean());
        ctx.release().unwrap();
    }

    #[test]
    fn test_contents_validation() {
        let (_backend, ctx) = setup();
        let mut allocator = ResourceAllocator::init(&ctx).unwrap();

        let device_local = BufferDescriptor::new(4, BufferUsage::VERTEX);
        assert!(matches!(
            allocator.create_buffer(&device_local, Some(&[0])),
            Err(AllocationError::NotHostVisible(_))
        ));

        let small = BufferDescriptor::new(2, BufferUsage::VERTEX).with_host_visible(true);
        assert!(matches!(
            allocator.create_buffer(&small, Some(&[0, 1, 2])),
            Err(AllocationError::ContentsTooLarge { data: 3, size: 2 })
        ));

        let empty = BufferDescriptor::new(0, BufferUsage::VERTEX);
        assert!(matches!(
            allocator.create_buffer(&empty, None),
            Err(AllocationError::ZeroSize(_))
        ));

        assert_eq!(allocator.shutdown().buffers_created, 0);
        ctx.release().unwrap();
    }

    #[test]
    fn test_destroy_while_busy_is_rejected() {
        let (_backend, ctx) = setup();
        let mut allocator = ResourceAllocator::init(&ctx).unwrap();
        let buffer = allocator
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::INDEX), None)
            .unwrap();

        ctx.submissions().mark_submitted();
        assert!(matches!(
            allocator.destroy_buffer(buffer),
            Err(SurfaceError::ResourceBusy(ResourceBusyError { outstanding: 1, .. }))
        ));

        ctx.wait_idle().unwrap();
        let report = allocator.shutdown();
        assert_eq!(report.outstanding_buffers, 1);
        assert_eq!(report.outstanding_bytes, 16);
        ctx.release().unwrap();
    }

    #[test]
    fn test_shutdown_reclaims_leaks() {
        let (backend, ctx) = setup();
        let mut allocator = ResourceAllocator::init(&ctx).unwrap();
        let _image = allocator
            .create_image(&ImageDescriptor::new(
                Extent2D::new(8, 8),
                TextureFormat::Depth32Float,
                ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            ))
            .unwrap();

        let report = allocator.shutdown();
        assert_eq!(report.outstanding_images, 1);
        assert!(!report.is_clean());

        ctx.release().unwrap();
        assert_eq!(backend.live_objects(), 0);
    }
}
