use anyhow::Result;
use minifb::{Key, Window, WindowOptions};

use crate::render::canvas::Canvas;

/// minifb window presenting a [`Canvas`].
pub struct DebugWindow {
    window: Window,
}

impl DebugWindow {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self { window })
    }

    /// Open and Escape not pressed
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn present(&mut self, canvas: &Canvas) -> Result<()> {
        self.window
            .update_with_buffer(canvas.buffer(), canvas.width(), canvas.height())?;
        Ok(())
    }
}
