use super::{Chip8Error, DISPLAY_X, DISPLAY_Y, Display};

/// 64x32 monochrome framebuffer with XOR drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    pixels: Display<bool>,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self {
            pixels: [[false; DISPLAY_X]; DISPLAY_Y],
        }
    }

    pub fn clear(&mut self) {
        self.pixels = [[false; DISPLAY_X]; DISPLAY_Y];
    }

    /// Get the state of a pixel (true = on). Out of range pixels read as off.
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.pixels
            .get(y)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or(false)
    }

    /// Flips the pixel at (x, y) and returns true if it was turned off (a collision).
    ///
    /// No wraparound or clipping is done; coordinates outside the 64x32 grid are an error.
    pub fn xor_pixel(&mut self, x: usize, y: usize) -> Result<bool, Chip8Error> {
        let pixel = self
            .pixels
            .get_mut(y)
            .and_then(|row| row.get_mut(x))
            .ok_or(Chip8Error::PixelOutOfRange { x, y })?;

        *pixel ^= true;
        Ok(!*pixel)
    }

    /// Read-only view of the pixel rows, for presentation.
    pub fn snapshot(&self) -> &Display<bool> {
        &self.pixels
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_twice_collides_on_second_flip() {
        let mut fb = Framebuffer::new();
        assert_eq!(fb.xor_pixel(3, 4), Ok(false));
        assert!(fb.get(3, 4));
        assert_eq!(fb.xor_pixel(3, 4), Ok(true));
        assert!(!fb.get(3, 4));
    }

    #[test]
    fn xor_outside_the_grid_is_an_error() {
        let mut fb = Framebuffer::new();
        assert_eq!(
            fb.xor_pixel(DISPLAY_X, 0),
            Err(Chip8Error::PixelOutOfRange { x: 64, y: 0 })
        );
        assert_eq!(
            fb.xor_pixel(0, DISPLAY_Y),
            Err(Chip8Error::PixelOutOfRange { x: 0, y: 32 })
        );
        assert_eq!(fb, Framebuffer::new());
    }

    #[test]
    fn clear_turns_everything_off() {
        let mut fb = Framebuffer::new();
        fb.xor_pixel(63, 31).unwrap();
        fb.clear();
        assert!(fb.snapshot().iter().flatten().all(|p| !p));
    }
}
