//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't touch a GPU. Every operation is appended to a shared
//! call log, objects are tracked so leaks and double frees are observable, and
//! acquire/present results can be faulted on demand. Submission completes
//! instantly: the fence passed to `submit` is signaled immediately.
//!
//! ```
//! use redlilium_surface::backend::dummy::{DummyBackend, GpuCall};
//!
//! let backend = DummyBackend::new();
//! let surface = backend.create_surface();
//! let instance = backend.instance();
//! let adapters = instance.adapters(surface).unwrap();
//! assert_eq!(adapters.len(), 1);
//! assert!(matches!(backend.calls()[0], GpuCall::CreateSurface(_)));
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    AcquiredImage, AdapterInfo, AdapterType, BackendError, GpuAllocator, GpuDevice, GpuInstance,
    PresentStatus, QueueFamilyInfo, SubmitDescriptor, SurfaceCapabilities, SwapchainDescriptor,
};
use crate::types::{
    BufferDescriptor, BufferHandle, CommandBufferHandle, Extent2D, FenceHandle, FramebufferHandle,
    ImageAspect, ImageDescriptor, ImageHandle, ImageViewHandle, PresentMode, RenderPassHandle,
    SemaphoreHandle, SurfaceFormat, SurfaceHandle, SwapchainHandle, TextureFormat,
};

/// One recorded backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCall {
    CreateSurface(SurfaceHandle),
    DestroySurface(SurfaceHandle),
    QuerySurface(SurfaceHandle),
    OpenDevice { adapter: usize, queue_family: u32 },
    DestroyDevice,
    DestroyInstance,
    WaitIdle,
    CreateAllocator,
    DestroyAllocator,
    CreateSwapchain(SwapchainHandle),
    DestroySwapchain(SwapchainHandle),
    CreateImageView(ImageViewHandle),
    DestroyImageView(ImageViewHandle),
    CreateFramebuffer(FramebufferHandle),
    DestroyFramebuffer(FramebufferHandle),
    CreateSemaphore(SemaphoreHandle),
    DestroySemaphore(SemaphoreHandle),
    CreateFence(FenceHandle),
    WaitFence(FenceHandle),
    ResetFence(FenceHandle),
    DestroyFence(FenceHandle),
    AllocateCommandBuffer(CommandBufferHandle),
    FreeCommandBuffer(CommandBufferHandle),
    RecordClear(CommandBufferHandle),
    AcquireImage(SwapchainHandle),
    Submit(CommandBufferHandle),
    Present {
        swapchain: SwapchainHandle,
        image_index: u32,
    },
    CreateBuffer(BufferHandle),
    WriteBuffer(BufferHandle),
    DestroyBuffer(BufferHandle),
    CreateImage(ImageHandle),
    DestroyImage(ImageHandle),
}

/// A one-shot failure injected into the next acquire or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyFault {
    /// Report the swapchain as out of date.
    OutOfDate,
    /// Succeed but flag the swapchain as suboptimal.
    Suboptimal,
    /// Report device loss.
    DeviceLost,
}

#[derive(Debug)]
struct SwapchainRecord {
    images: Vec<ImageHandle>,
    next_image: u32,
}

#[derive(Debug)]
struct BufferRecord {
    host_visible: bool,
    contents: Vec<u8>,
}

#[derive(Debug)]
struct DummyState {
    next_handle: u64,
    calls: Vec<GpuCall>,
    adapters: Vec<AdapterInfo>,
    capabilities: SurfaceCapabilities,
    formats: Vec<SurfaceFormat>,
    present_modes: Vec<PresentMode>,
    fail_surface_queries: bool,
    allocation_fault: Option<usize>,
    acquire_faults: VecDeque<DummyFault>,
    present_faults: VecDeque<DummyFault>,
    swapchains: HashMap<SwapchainHandle, SwapchainRecord>,
    fences: HashMap<FenceHandle, bool>,
    buffers: HashMap<BufferHandle, BufferRecord>,
    images: HashSet<ImageHandle>,
    live: HashSet<u64>,
    invalid_destroys: usize,
}

impl DummyState {
    fn next_raw(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Hand out a fresh handle and track it as live.
    fn create(&mut self) -> u64 {
        let raw = self.next_raw();
        self.live.insert(raw);
        raw
    }

    /// Stop tracking a handle; counts a double destroy if it wasn't live.
    fn release(&mut self, raw: u64, what: &str) -> bool {
        if self.live.remove(&raw) {
            true
        } else {
            log::warn!("DummyBackend: destroying unknown {} {:#x}", what, raw);
            self.invalid_destroys += 1;
            false
        }
    }

    /// Count down an injected allocation fault; true when it fires.
    fn allocation_fails(&mut self) -> bool {
        match self.allocation_fault {
            Some(0) => {
                self.allocation_fault = None;
                true
            }
            Some(remaining) => {
                self.allocation_fault = Some(remaining - 1);
                false
            }
            None => false,
        }
    }

    fn record(&mut self, call: GpuCall) {
        log::trace!("DummyBackend: {:?}", call);
        self.calls.push(call);
    }
}

/// Dummy GPU backend.
///
/// Cloning is cheap and every clone observes the same state, so a test keeps
/// one clone for inspection while the components own the trait objects.
#[derive(Debug, Clone)]
pub struct DummyBackend {
    state: Arc<Mutex<DummyState>>,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a backend with one suitable adapter and a permissive surface.
    pub fn new() -> Self {
        let state = DummyState {
            next_handle: 0,
            calls: Vec::new(),
            adapters: vec![Self::default_adapter()],
            capabilities: Self::default_capabilities(),
            formats: vec![
                SurfaceFormat::srgb(TextureFormat::Bgra8UnormSrgb),
                SurfaceFormat::srgb(TextureFormat::Bgra8Unorm),
            ],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
            fail_surface_queries: false,
            allocation_fault: None,
            acquire_faults: VecDeque::new(),
            present_faults: VecDeque::new(),
            swapchains: HashMap::new(),
            fences: HashMap::new(),
            buffers: HashMap::new(),
            images: HashSet::new(),
            live: HashSet::new(),
            invalid_destroys: 0,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// The adapter a fresh backend reports.
    pub fn default_adapter() -> AdapterInfo {
        AdapterInfo {
            index: 0,
            name: "Dummy Adapter".to_string(),
            adapter_type: AdapterType::DiscreteGpu,
            queue_families: vec![QueueFamilyInfo {
                index: 0,
                graphics: true,
                present: true,
            }],
            supports_swapchain: true,
        }
    }

    /// The surface capabilities a fresh backend reports.
    pub fn default_capabilities() -> SurfaceCapabilities {
        SurfaceCapabilities {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: None,
            min_extent: Extent2D::new(1, 1),
            max_extent: Extent2D::new(16384, 16384),
            supports_transfer_dst: true,
        }
    }

    /// Replace the reported adapters.
    pub fn with_adapters(self, adapters: Vec<AdapterInfo>) -> Self {
        self.state.lock().adapters = adapters;
        self
    }

    /// Replace the reported surface capabilities.
    pub fn with_capabilities(self, capabilities: SurfaceCapabilities) -> Self {
        self.set_capabilities(capabilities);
        self
    }

    /// Replace the reported surface formats.
    pub fn with_formats(self, formats: Vec<SurfaceFormat>) -> Self {
        self.state.lock().formats = formats;
        self
    }

    /// Replace the reported present modes.
    pub fn with_present_modes(self, present_modes: Vec<PresentMode>) -> Self {
        self.state.lock().present_modes = present_modes;
        self
    }

    /// Create an instance sharing this backend's state.
    pub fn instance(&self) -> Box<dyn GpuInstance> {
        Box::new(DummyInstance {
            state: Arc::clone(&self.state),
        })
    }

    /// Create a surface, standing in for the windowing shim.
    pub fn create_surface(&self) -> SurfaceHandle {
        let mut state = self.state.lock();
        let surface = SurfaceHandle::from_raw(state.create());
        state.record(GpuCall::CreateSurface(surface));
        surface
    }

    /// Change the surface capabilities (e.g. after a simulated resize).
    pub fn set_capabilities(&self, capabilities: SurfaceCapabilities) {
        self.state.lock().capabilities = capabilities;
    }

    /// Make surface queries fail until reset.
    pub fn fail_surface_queries(&self, fail: bool) {
        self.state.lock().fail_surface_queries = fail;
    }

    /// Make a buffer or image allocation fail with out-of-memory after
    /// `skip` further allocations succeed.
    pub fn fail_allocation_after(&self, skip: usize) {
        self.state.lock().allocation_fault = Some(skip);
    }

    /// Queue a fault for a future `acquire_next_image` call.
    pub fn inject_acquire_fault(&self, fault: DummyFault) {
        self.state.lock().acquire_faults.push_back(fault);
    }

    /// Queue a fault for a future `present` call.
    pub fn inject_present_fault(&self, fault: DummyFault) {
        self.state.lock().present_faults.push_back(fault);
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<GpuCall> {
        self.state.lock().calls.clone()
    }

    /// Drain the call log.
    pub fn take_calls(&self) -> Vec<GpuCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    /// Empty the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of objects created and not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Number of destroy calls on handles that weren't live.
    pub fn invalid_destroys(&self) -> usize {
        self.state.lock().invalid_destroys
    }

    /// Number of images a live swapchain owns.
    pub fn swapchain_image_count(&self, swapchain: SwapchainHandle) -> Option<usize> {
        self.state
            .lock()
            .swapchains
            .get(&swapchain)
            .map(|record| record.images.len())
    }

    /// Current contents of a host-visible buffer.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .map(|record| record.contents.clone())
    }
}

/// Instance half of the dummy backend.
#[derive(Debug)]
pub struct DummyInstance {
    state: Arc<Mutex<DummyState>>,
}

impl DummyInstance {
    fn query(
        &self,
        surface: SurfaceHandle,
    ) -> Result<parking_lot::MutexGuard<'_, DummyState>, BackendError> {
        let mut state = self.state.lock();
        state.record(GpuCall::QuerySurface(surface));
        if state.fail_surface_queries {
            return Err(BackendError::SurfaceLost);
        }
        Ok(state)
    }
}

impl GpuInstance for DummyInstance {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn adapters(&self, _surface: SurfaceHandle) -> Result<Vec<AdapterInfo>, BackendError> {
        Ok(self.state.lock().adapters.clone())
    }

    fn open_device(
        &self,
        adapter: &AdapterInfo,
        queue_family: u32,
    ) -> Result<Box<dyn GpuDevice>, BackendError> {
        let mut state = self.state.lock();
        if !state.adapters.iter().any(|a| a.index == adapter.index) {
            return Err(BackendError::InitializationFailed(format!(
                "unknown adapter {}",
                adapter.index
            )));
        }
        state.record(GpuCall::OpenDevice {
            adapter: adapter.index,
            queue_family,
        });
        Ok(Box::new(DummyDevice {
            state: Arc::clone(&self.state),
        }))
    }

    fn surface_capabilities(
        &self,
        _adapter: &AdapterInfo,
        surface: SurfaceHandle,
    ) -> Result<SurfaceCapabilities, BackendError> {
        Ok(self.query(surface)?.capabilities)
    }

    fn surface_formats(
        &self,
        _adapter: &AdapterInfo,
        surface: SurfaceHandle,
    ) -> Result<Vec<SurfaceFormat>, BackendError> {
        Ok(self.query(surface)?.formats.clone())
    }

    fn surface_present_modes(
        &self,
        _adapter: &AdapterInfo,
        surface: SurfaceHandle,
    ) -> Result<Vec<PresentMode>, BackendError> {
        Ok(self.query(surface)?.present_modes.clone())
    }

    fn destroy_surface(&self, surface: SurfaceHandle) {
        let mut state = self.state.lock();
        state.release(surface.as_raw(), "surface");
        state.record(GpuCall::DestroySurface(surface));
    }
}

impl Drop for DummyInstance {
    fn drop(&mut self) {
        self.state.lock().record(GpuCall::DestroyInstance);
    }
}

/// Device half of the dummy backend.
#[derive(Debug)]
pub struct DummyDevice {
    state: Arc<Mutex<DummyState>>,
}

impl GpuDevice for DummyDevice {
    fn wait_idle(&self) -> Result<(), BackendError> {
        self.state.lock().record(GpuCall::WaitIdle);
        Ok(())
    }

    fn create_allocator(&self) -> Result<Box<dyn GpuAllocator>, BackendError> {
        self.state.lock().record(GpuCall::CreateAllocator);
        Ok(Box::new(DummyAllocator {
            state: Arc::clone(&self.state),
        }))
    }

    fn create_swapchain(
        &self,
        descriptor: &SwapchainDescriptor,
    ) -> Result<SwapchainHandle, BackendError> {
        if descriptor.extent.is_empty() {
            return Err(BackendError::InvalidParameter(format!(
                "swapchain extent {} has zero area",
                descriptor.extent
            )));
        }
        let mut state = self.state.lock();
        let swapchain = SwapchainHandle::from_raw(state.create());
        let images = (0..descriptor.image_count)
            .map(|_| ImageHandle::from_raw(state.next_raw()))
            .collect();
        state.swapchains.insert(
            swapchain,
            SwapchainRecord {
                images,
                next_image: 0,
            },
        );
        state.record(GpuCall::CreateSwapchain(swapchain));
        Ok(swapchain)
    }

    fn swapchain_images(
        &self,
        swapchain: SwapchainHandle,
    ) -> Result<Vec<ImageHandle>, BackendError> {
        self.state
            .lock()
            .swapchains
            .get(&swapchain)
            .map(|record| record.images.clone())
            .ok_or_else(|| BackendError::InvalidParameter(format!("unknown {:?}", swapchain)))
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        let mut state = self.state.lock();
        state.swapchains.remove(&swapchain);
        state.release(swapchain.as_raw(), "swapchain");
        state.record(GpuCall::DestroySwapchain(swapchain));
    }

    fn create_image_view(
        &self,
        _image: ImageHandle,
        _format: TextureFormat,
        _aspect: ImageAspect,
    ) -> Result<ImageViewHandle, BackendError> {
        let mut state = self.state.lock();
        let view = ImageViewHandle::from_raw(state.create());
        state.record(GpuCall::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        let mut state = self.state.lock();
        state.release(view.as_raw(), "image view");
        state.record(GpuCall::DestroyImageView(view));
    }

    fn create_framebuffer(
        &self,
        _render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: Extent2D,
    ) -> Result<FramebufferHandle, BackendError> {
        if attachments.is_empty() || extent.is_empty() {
            return Err(BackendError::InvalidParameter(
                "framebuffer needs attachments and a non-zero extent".to_string(),
            ));
        }
        let mut state = self.state.lock();
        let framebuffer = FramebufferHandle::from_raw(state.create());
        state.record(GpuCall::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        let mut state = self.state.lock();
        state.release(framebuffer.as_raw(), "framebuffer");
        state.record(GpuCall::DestroyFramebuffer(framebuffer));
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, BackendError> {
        let mut state = self.state.lock();
        let semaphore = SemaphoreHandle::from_raw(state.create());
        state.record(GpuCall::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut state = self.state.lock();
        state.release(semaphore.as_raw(), "semaphore");
        state.record(GpuCall::DestroySemaphore(semaphore));
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, BackendError> {
        let mut state = self.state.lock();
        let fence = FenceHandle::from_raw(state.create());
        state.fences.insert(fence, signaled);
        state.record(GpuCall::CreateFence(fence));
        Ok(fence)
    }

    fn wait_fence(&self, fence: FenceHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.record(GpuCall::WaitFence(fence));
        match state.fences.get(&fence) {
            Some(true) => Ok(()),
            // Nothing pending can ever signal it; a real device would hang here.
            Some(false) => Err(BackendError::Internal(format!(
                "wait on {:?} which no pending submission will signal",
                fence
            ))),
            None => Err(BackendError::InvalidParameter(format!("unknown {:?}", fence))),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.record(GpuCall::ResetFence(fence));
        match state.fences.get_mut(&fence) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(BackendError::InvalidParameter(format!("unknown {:?}", fence))),
        }
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.state.lock();
        state.fences.remove(&fence);
        state.release(fence.as_raw(), "fence");
        state.record(GpuCall::DestroyFence(fence));
    }

    fn allocate_command_buffer(&self) -> Result<CommandBufferHandle, BackendError> {
        let mut state = self.state.lock();
        let command_buffer = CommandBufferHandle::from_raw(state.create());
        state.record(GpuCall::AllocateCommandBuffer(command_buffer));
        Ok(command_buffer)
    }

    fn free_command_buffer(&self, command_buffer: CommandBufferHandle) {
        let mut state = self.state.lock();
        state.release(command_buffer.as_raw(), "command buffer");
        state.record(GpuCall::FreeCommandBuffer(command_buffer));
    }

    fn record_clear(
        &self,
        command_buffer: CommandBufferHandle,
        _image: ImageHandle,
        _color: [f32; 4],
    ) -> Result<(), BackendError> {
        self.state
            .lock()
            .record(GpuCall::RecordClear(command_buffer));
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        _semaphore: SemaphoreHandle,
    ) -> Result<AcquiredImage, BackendError> {
        let mut state = self.state.lock();
        state.record(GpuCall::AcquireImage(swapchain));
        let fault = state.acquire_faults.pop_front();
        match fault {
            Some(DummyFault::OutOfDate) => return Err(BackendError::SurfaceOutOfDate),
            Some(DummyFault::DeviceLost) => return Err(BackendError::DeviceLost),
            Some(DummyFault::Suboptimal) | None => {}
        }
        let record = state
            .swapchains
            .get_mut(&swapchain)
            .ok_or_else(|| BackendError::InvalidParameter(format!("unknown {:?}", swapchain)))?;
        let count = record.images.len() as u32;
        let index = record.next_image % count;
        record.next_image = record.next_image.wrapping_add(1);
        Ok(AcquiredImage {
            index,
            suboptimal: fault == Some(DummyFault::Suboptimal),
        })
    }

    fn submit(&self, submit: &SubmitDescriptor) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.record(GpuCall::Submit(submit.command_buffer));
        match state.fences.get_mut(&submit.fence) {
            Some(signaled) => {
                // Work "completes" immediately.
                *signaled = true;
                Ok(())
            }
            None => Err(BackendError::InvalidParameter(format!(
                "unknown {:?}",
                submit.fence
            ))),
        }
    }

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        _wait_semaphore: SemaphoreHandle,
    ) -> Result<PresentStatus, BackendError> {
        let mut state = self.state.lock();
        state.record(GpuCall::Present {
            swapchain,
            image_index,
        });
        match state.present_faults.pop_front() {
            Some(DummyFault::OutOfDate) => Err(BackendError::SurfaceOutOfDate),
            Some(DummyFault::DeviceLost) => Err(BackendError::DeviceLost),
            Some(DummyFault::Suboptimal) => Ok(PresentStatus::Suboptimal),
            None => Ok(PresentStatus::Optimal),
        }
    }
}

impl Drop for DummyDevice {
    fn drop(&mut self) {
        self.state.lock().record(GpuCall::DestroyDevice);
    }
}

/// Allocator half of the dummy backend.
#[derive(Debug)]
pub struct DummyAllocator {
    state: Arc<Mutex<DummyState>>,
}

impl GpuAllocator for DummyAllocator {
    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
    ) -> Result<BufferHandle, BackendError> {
        let mut state = self.state.lock();
        if state.allocation_fails() {
            return Err(BackendError::OutOfMemory);
        }
        if descriptor.size == 0 {
            return Err(BackendError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        let buffer = BufferHandle::from_raw(state.create());
        let contents = if descriptor.host_visible {
            vec![0; descriptor.size as usize]
        } else {
            Vec::new()
        };
        state.buffers.insert(
            buffer,
            BufferRecord {
                host_visible: descriptor.host_visible,
                contents,
            },
        );
        state.record(GpuCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let record = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| BackendError::InvalidParameter(format!("unknown {:?}", buffer)))?;
        if !record.host_visible {
            return Err(BackendError::InvalidParameter(
                "buffer is not host visible".to_string(),
            ));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > record.contents.len() {
            return Err(BackendError::InvalidParameter(format!(
                "write of {} bytes at {} overflows buffer of {} bytes",
                data.len(),
                offset,
                record.contents.len()
            )));
        }
        record.contents[start..end].copy_from_slice(data);
        state.record(GpuCall::WriteBuffer(buffer));
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer).is_none() {
            state.invalid_destroys += 1;
            return Err(BackendError::InvalidParameter(format!("unknown {:?}", buffer)));
        }
        state.release(buffer.as_raw(), "buffer");
        state.record(GpuCall::DestroyBuffer(buffer));
        Ok(())
    }

    fn create_image(&mut self, descriptor: &ImageDescriptor) -> Result<ImageHandle, BackendError> {
        let mut state = self.state.lock();
        if state.allocation_fails() {
            return Err(BackendError::OutOfMemory);
        }
        if descriptor.extent.is_empty() {
            return Err(BackendError::InvalidParameter(format!(
                "image extent {} has zero area",
                descriptor.extent
            )));
        }
        let image = ImageHandle::from_raw(state.create());
        state.images.insert(image);
        state.record(GpuCall::CreateImage(image));
        Ok(image)
    }

    fn destroy_image(&mut self, image: ImageHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if !state.images.remove(&image) {
            state.invalid_destroys += 1;
            return Err(BackendError::InvalidParameter(format!("unknown {:?}", image)));
        }
        state.release(image.as_raw(), "image");
        state.record(GpuCall::DestroyImage(image));
        Ok(())
    }

    fn live_allocations(&self) -> usize {
        let state = self.state.lock();
        state.buffers.len() + state.images.len()
    }
}

impl Drop for DummyAllocator {
    fn drop(&mut self) {
        self.state.lock().record(GpuCall::DestroyAllocator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageUsage;

    fn device(backend: &DummyBackend) -> Box<dyn GpuDevice> {
        let instance = backend.instance();
        let adapter = DummyBackend::default_adapter();
        instance.open_device(&adapter, 0).unwrap()
    }

    #[test]
    fn test_fence_signaled_by_submit() {
        let backend = DummyBackend::new();
        let device = device(&backend);
        let fence = device.create_fence(false).unwrap();
        assert!(device.wait_fence(fence).is_err());

        let submit = SubmitDescriptor {
            command_buffer: device.allocate_command_buffer().unwrap(),
            wait_semaphore: device.create_semaphore().unwrap(),
            signal_semaphore: device.create_semaphore().unwrap(),
            fence,
        };
        device.submit(&submit).unwrap();
        assert!(device.wait_fence(fence).is_ok());
    }

    #[test]
    fn test_acquire_cycles_images() {
        let backend = DummyBackend::new();
        let device = device(&backend);
        let swapchain = device
            .create_swapchain(&SwapchainDescriptor {
                surface: backend.create_surface(),
                format: SurfaceFormat::default(),
                present_mode: PresentMode::Fifo,
                extent: Extent2D::new(64, 64),
                image_count: 3,
                usage: ImageUsage::COLOR_ATTACHMENT,
            })
            .unwrap();
        let semaphore = device.create_semaphore().unwrap();

        let indices: Vec<u32> = (0..4)
            .map(|_| device.acquire_next_image(swapchain, semaphore).unwrap().index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_injected_faults_are_one_shot() {
        let backend = DummyBackend::new();
        let device = device(&backend);
        let swapchain = device
            .create_swapchain(&SwapchainDescriptor {
                surface: backend.create_surface(),
                format: SurfaceFormat::default(),
                present_mode: PresentMode::Fifo,
                extent: Extent2D::new(64, 64),
                image_count: 2,
                usage: ImageUsage::COLOR_ATTACHMENT,
            })
            .unwrap();
        let semaphore = device.create_semaphore().unwrap();

        backend.inject_acquire_fault(DummyFault::OutOfDate);
        assert_eq!(
            device.acquire_next_image(swapchain, semaphore),
            Err(BackendError::SurfaceOutOfDate)
        );
        assert!(device.acquire_next_image(swapchain, semaphore).is_ok());
    }

    #[test]
    fn test_double_destroy_is_counted() {
        let backend = DummyBackend::new();
        let device = device(&backend);
        let view = device
            .create_image_view(
                ImageHandle::from_raw(1),
                TextureFormat::Bgra8Unorm,
                ImageAspect::Color,
            )
            .unwrap();
        device.destroy_image_view(view);
        assert_eq!(backend.invalid_destroys(), 0);
        device.destroy_image_view(view);
        assert_eq!(backend.invalid_destroys(), 1);
    }

    #[test]
    fn test_buffer_write_requires_host_visible() {
        let backend = DummyBackend::new();
        let device = device(&backend);
        let mut allocator = device.create_allocator().unwrap();

        let local = allocator
            .create_buffer(&BufferDescriptor::new(16, crate::types::BufferUsage::VERTEX))
            .unwrap();
        assert!(allocator.write_buffer(local, 0, &[1, 2, 3]).is_err());

        let mapped = allocator
            .create_buffer(
                &BufferDescriptor::new(4, crate::types::BufferUsage::VERTEX)
                    .with_host_visible(true),
            )
            .unwrap();
        allocator.write_buffer(mapped, 1, &[7, 8]).unwrap();
        assert_eq!(backend.buffer_contents(mapped), Some(vec![0, 7, 8, 0]));
        assert_eq!(allocator.live_allocations(), 2);
    }
}
