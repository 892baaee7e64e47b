//! Platform layer for the ember renderer.
//!
//! Provides a winit window that satisfies the renderer's window contract
//! (drawable size, required instance extensions, surface creation).

mod window;

pub use window::Window;

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
