//! Generic owned handle.
//!
//! Every destroyable Vulkan object (fences, semaphores, command pools,
//! buffers, images, acceleration structures, ...) is wrapped in an
//! [`OwnedHandle`] paired with whatever knows how to destroy it. The handle
//! is released exactly once, on drop, on every exit path including `?`
//! early returns while an aggregate is still being assembled.

use ash::vk;
use std::mem::ManuallyDrop;
use std::sync::Arc;

/// Something that can release a handle of type `T`.
pub trait Destroyer<T> {
    /// Release `handle`.
    ///
    /// # Safety
    /// `handle` must have been created through this destroyer's device and
    /// must no longer be referenced by pending GPU work.
    unsafe fn destroy(&self, handle: T);
}

impl<T, D: Destroyer<T> + ?Sized> Destroyer<T> for Arc<D> {
    unsafe fn destroy(&self, handle: T) {
        // SAFETY: forwarded from the caller.
        unsafe { (**self).destroy(handle) }
    }
}

/// A handle that is destroyed when dropped.
pub struct OwnedHandle<T, D: Destroyer<T>> {
    handle: ManuallyDrop<T>,
    destroyer: D,
}

/// Owned handle destroyed through the logical device.
pub type DeviceHandle<T> = OwnedHandle<T, Arc<ash::Device>>;

impl<T, D: Destroyer<T>> OwnedHandle<T, D> {
    /// Take ownership of `handle`.
    ///
    /// # Safety
    /// `handle` must be valid for `destroyer` and not owned anywhere else.
    pub unsafe fn new(handle: T, destroyer: D) -> Self {
        Self {
            handle: ManuallyDrop::new(handle),
            destroyer,
        }
    }

    /// Borrow the wrapped handle.
    pub fn get(&self) -> &T {
        &self.handle
    }

    /// The object that will destroy this handle.
    pub fn destroyer(&self) -> &D {
        &self.destroyer
    }

    /// Give up ownership without destroying.
    pub fn into_raw(self) -> T {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the handle is moved out exactly once.
        // The destroyer is dropped in place to release whatever it holds (e.g. an Arc).
        unsafe {
            std::ptr::drop_in_place(&mut this.destroyer);
            ManuallyDrop::take(&mut this.handle)
        }
    }
}

impl<T: Copy, D: Destroyer<T>> OwnedHandle<T, D> {
    /// Copy of the raw handle.
    pub fn raw(&self) -> T {
        *self.handle
    }
}

impl<T, D: Destroyer<T>> Drop for OwnedHandle<T, D> {
    fn drop(&mut self) {
        // SAFETY: the handle is taken once, here, and never touched again.
        unsafe {
            let handle = ManuallyDrop::take(&mut self.handle);
            self.destroyer.destroy(handle);
        }
    }
}

impl<T: std::fmt::Debug, D: Destroyer<T>> std::fmt::Debug for OwnedHandle<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("OwnedHandle").field(&*self.handle).finish()
    }
}

macro_rules! device_destroyers {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl Destroyer<$ty> for ash::Device {
                unsafe fn destroy(&self, handle: $ty) {
                    // SAFETY: forwarded from the caller.
                    unsafe { self.$method(handle, None) }
                }
            }
        )*
    };
}

device_destroyers! {
    vk::Fence => destroy_fence,
    vk::Semaphore => destroy_semaphore,
    vk::CommandPool => destroy_command_pool,
    vk::ImageView => destroy_image_view,
    vk::Framebuffer => destroy_framebuffer,
    vk::RenderPass => destroy_render_pass,
    vk::Pipeline => destroy_pipeline,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::ShaderModule => destroy_shader_module,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::DescriptorPool => destroy_descriptor_pool,
}

impl Destroyer<vk::SwapchainKHR> for ash::khr::swapchain::Device {
    unsafe fn destroy(&self, handle: vk::SwapchainKHR) {
        // SAFETY: forwarded from the caller.
        unsafe { self.destroy_swapchain(handle, None) }
    }
}

impl Destroyer<vk::SurfaceKHR> for ash::khr::surface::Instance {
    unsafe fn destroy(&self, handle: vk::SurfaceKHR) {
        // SAFETY: forwarded from the caller.
        unsafe { self.destroy_surface(handle, None) }
    }
}

impl Destroyer<vk::AccelerationStructureKHR> for ash::khr::acceleration_structure::Device {
    unsafe fn destroy(&self, handle: vk::AccelerationStructureKHR) {
        // SAFETY: forwarded from the caller.
        unsafe { self.destroy_acceleration_structure(handle, None) }
    }
}

impl Destroyer<vk::DebugUtilsMessengerEXT> for ash::ext::debug_utils::Instance {
    unsafe fn destroy(&self, handle: vk::DebugUtilsMessengerEXT) {
        // SAFETY: forwarded from the caller.
        unsafe { self.destroy_debug_utils_messenger(handle, None) }
    }
}

/// Wrap a freshly created device object.
///
/// # Safety
/// `handle` must have been created from `device` and not be owned elsewhere.
pub unsafe fn device_handle<T>(device: &Arc<ash::Device>, handle: T) -> DeviceHandle<T>
where
    ash::Device: Destroyer<T>,
{
    // SAFETY: forwarded from the caller.
    unsafe { OwnedHandle::new(handle, Arc::clone(device)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Recorder {
        destroyed: Rc<RefCell<Vec<u64>>>,
    }

    impl Destroyer<u64> for Recorder {
        unsafe fn destroy(&self, handle: u64) {
            self.destroyed.borrow_mut().push(handle);
        }
    }

    fn owned(recorder: &Recorder, raw: u64) -> OwnedHandle<u64, Recorder> {
        unsafe { OwnedHandle::new(raw, recorder.clone()) }
    }

    struct Pair {
        _first: OwnedHandle<u64, Recorder>,
        _second: OwnedHandle<u64, Recorder>,
    }

    fn build_pair(recorder: &Recorder, fail_after_first: bool) -> Result<Pair, &'static str> {
        let first = owned(recorder, 1);
        if fail_after_first {
            return Err("second creation failed");
        }
        let second = owned(recorder, 2);
        Ok(Pair {
            _first: first,
            _second: second,
        })
    }

    #[test]
    fn drop_destroys_exactly_once() {
        let recorder = Recorder::default();
        {
            let handle = owned(&recorder, 42);
            assert_eq!(handle.raw(), 42);
            assert!(recorder.destroyed.borrow().is_empty());
        }
        assert_eq!(*recorder.destroyed.borrow(), vec![42]);
    }

    #[test]
    fn into_raw_releases_ownership() {
        let recorder = Recorder::default();
        let raw = owned(&recorder, 7).into_raw();
        assert_eq!(raw, 7);
        assert!(recorder.destroyed.borrow().is_empty());
        assert_eq!(Rc::strong_count(&recorder.destroyed), 1);
    }

    #[test]
    fn partial_construction_is_unwound() {
        let recorder = Recorder::default();
        assert!(build_pair(&recorder, true).is_err());
        assert_eq!(*recorder.destroyed.borrow(), vec![1]);
    }

    #[test]
    fn aggregate_fields_drop_in_declaration_order() {
        let recorder = Recorder::default();
        let pair = build_pair(&recorder, false);
        assert!(pair.is_ok());
        drop(pair);
        assert_eq!(*recorder.destroyed.borrow(), vec![1, 2]);
    }

    #[test]
    fn arc_forwards_to_inner_destroyer() {
        let recorder = Recorder::default();
        let shared = Arc::new(recorder.clone());
        drop(unsafe { OwnedHandle::new(9_u64, shared) });
        assert_eq!(*recorder.destroyed.borrow(), vec![9]);
    }
}
