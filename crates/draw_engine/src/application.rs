//! Application shell and lifecycle management
//!
//! [`AppShell`] turns platform lifecycle commands and touch events into calls
//! on a [`GraphicsStack`]: it initializes the stack when the window appears,
//! gates the per-frame draw on focus, and tears the stack down exactly once.

use ash::vk;
use thiserror::Error;

use crate::assets::{AssetError, TextureData};
use crate::config::{ConfigError, InputConfig, TextureConfig};
use crate::input::{TouchController, TouchEvent};
use crate::render::vulkan::{TextureRegistry, VulkanError};

/// Platform lifecycle commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// A window is ready for rendering
    InitWindow,
    /// The window is going away
    TermWindow,
    /// The app came to the foreground
    GainedFocus,
    /// The app left the foreground
    LostFocus,
    /// The platform asks the app to persist state
    SaveState,
}

/// Everything the shell drives: device setup, resources and per-frame drawing
pub trait GraphicsStack {
    /// Create the device, textures and drawables
    fn initialize(&mut self) -> Result<(), AppError>;

    /// Record and submit one frame using the current touch rotation and mode
    fn draw_frame(&mut self, touch: &TouchController) -> Result<(), AppError>;

    /// Release every GPU resource
    fn shutdown(&mut self);
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// GPU resource or submission failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Asset loading error
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}

/// Lifecycle state machine around a graphics stack
pub struct AppShell<G: GraphicsStack> {
    stack: G,
    touch: TouchController,
    initialized: bool,
    drawing: bool,
    shut_down: bool,
}

impl<G: GraphicsStack> AppShell<G> {
    /// Wrap `stack`; nothing is initialized until [`LifecycleCommand::InitWindow`]
    pub fn new(stack: G, input: InputConfig) -> Self {
        Self {
            stack,
            touch: TouchController::new(input),
            initialized: false,
            drawing: false,
            shut_down: false,
        }
    }

    /// React to a lifecycle command
    pub fn handle_command(&mut self, command: LifecycleCommand) -> Result<(), AppError> {
        log::info!("Lifecycle command {:?}", command);
        match command {
            LifecycleCommand::InitWindow => {
                if self.shut_down {
                    return Err(AppError::Custom("graphics stack already shut down".to_string()));
                }
                if !self.initialized {
                    self.stack.initialize()?;
                    self.initialized = true;
                }
                self.drawing = true;
            }
            LifecycleCommand::TermWindow | LifecycleCommand::LostFocus => {
                self.drawing = false;
            }
            LifecycleCommand::GainedFocus => {
                self.drawing = self.initialized && !self.shut_down;
            }
            LifecycleCommand::SaveState => {}
        }
        Ok(())
    }

    /// Feed a touch event. Returns the new mode when a click cycled it.
    pub fn handle_touch(&mut self, event: TouchEvent) -> Option<u32> {
        self.touch.handle(event)
    }

    /// Draw one frame if drawing is active. Returns whether a frame was drawn.
    pub fn frame(&mut self) -> Result<bool, AppError> {
        if !self.drawing {
            return Ok(false);
        }
        self.stack.draw_frame(&self.touch)?;
        Ok(true)
    }

    /// Tear the stack down. Only the first call after initialization reaches it.
    pub fn shutdown(&mut self) {
        self.drawing = false;
        if self.initialized && !self.shut_down {
            self.stack.shutdown();
            log::info!("Graphics stack shut down");
        }
        self.shut_down = true;
    }

    /// Whether frames are currently drawn
    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Whether the stack has been initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Get touch controller
    pub fn touch(&self) -> &TouchController {
        &self.touch
    }

    /// Get graphics stack
    pub fn stack(&self) -> &G {
        &self.stack
    }

    /// Get graphics stack mutably
    pub fn stack_mut(&mut self) -> &mut G {
        &mut self.stack
    }
}

/// Build the sampler pool and upload every configured texture, in order.
///
/// Intended for [`GraphicsStack::initialize`]; the first decode or upload
/// failure aborts the load.
pub fn load_textures(
    registry: &mut TextureRegistry,
    config: &TextureConfig,
    format: vk::Format,
) -> Result<(), AppError> {
    registry.init_samplers(config.sampler_count)?;
    for entry in &config.textures {
        let data = TextureData::from_file(&entry.path)?;
        registry.init_texture(&entry.name, format, data)?;
    }
    log::info!("Loaded {} textures", registry.len());
    Ok(())
}

impl<G: GraphicsStack> Drop for AppShell<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
