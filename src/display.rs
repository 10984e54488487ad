use bitvec::{BitArr, array::BitArray};

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;
pub const FONT_HEIGHT: usize = 5;

/// Hex digit sprites 0-F, five rows each, loaded at address 0x000.
pub const FONT: [u8; 16 * FONT_HEIGHT] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

/// The 64x32 monochrome screen.
///
/// Pixels are only ever toggled by [`Framebuffer::draw_sprite`] and only ever
/// cleared by [`Framebuffer::clear`]. Both raise the redraw flag, which the
/// presentation layer lowers with [`Framebuffer::acknowledge_redraw`] once it
/// has shown the frame.
#[derive(Clone, Debug)]
pub struct Framebuffer {
    pixels: BitArr!(for DISPLAY_WIDTH * DISPLAY_HEIGHT),
    redraw: bool,
}

impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer {
            pixels: BitArray::ZERO,
            redraw: false,
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(false);
        self.redraw = true;
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        self.pixels[(y % DISPLAY_HEIGHT) * DISPLAY_WIDTH + (x % DISPLAY_WIDTH)]
    }

    /// XOR `sprite` onto the screen with its top-left corner at `(x, y)`.
    ///
    /// Each byte is one row, most significant bit leftmost. Coordinates wrap
    /// independently on both axes. Returns true if any lit pixel was turned
    /// off.
    pub fn draw_sprite(&mut self, x: usize, y: usize, sprite: &[u8]) -> bool {
        let mut collision = false;

        for (row, &byte) in sprite.iter().enumerate() {
            for bit in 0..8 {
                if (byte >> (7 - bit)) & 1 == 0 {
                    continue;
                }

                let pixel_x = (x + bit) % DISPLAY_WIDTH;
                let pixel_y = (y + row) % DISPLAY_HEIGHT;
                let index = pixel_y * DISPLAY_WIDTH + pixel_x;

                let current_pixel = self.pixels[index];
                if current_pixel {
                    collision = true;
                }
                self.pixels.set(index, !current_pixel);
                self.redraw = true;
            }
        }
        collision
    }

    pub fn redraw_requested(&self) -> bool {
        self.redraw
    }

    pub fn request_redraw(&mut self) {
        self.redraw = true;
    }

    pub fn acknowledge_redraw(&mut self) {
        self.redraw = false;
    }

    pub fn lit_pixels(&self) -> usize {
        self.pixels.count_ones()
    }

    /// Rows top to bottom, each as `DISPLAY_WIDTH` pixel states.
    pub fn rows(&self) -> impl Iterator<Item = [bool; DISPLAY_WIDTH]> + '_ {
        (0..DISPLAY_HEIGHT).map(move |y| {
            let mut row = [false; DISPLAY_WIDTH];
            for (x, pixel) in row.iter_mut().enumerate() {
                *pixel = self.pixels[y * DISPLAY_WIDTH + x];
            }
            row
        })
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
    fn test_draw_sets_pixels_and_redraw() {
        let mut fb = Framebuffer::new();
        let collision = fb.draw_sprite(2, 3, &[0b1010_0000]);

        assert!(!collision);
        assert!(fb.pixel(2, 3));
        assert!(!fb.pixel(3, 3));
        assert!(fb.pixel(4, 3));
        assert_eq!(fb.lit_pixels(), 2);
        assert!(fb.redraw_requested());
    }

    #[test]
    fn test_draw_twice_restores_and_collides() {
        let mut fb = Framebuffer::new();
        let sprite = &FONT[0..FONT_HEIGHT];

        assert!(!fb.draw_sprite(10, 10, sprite));
        assert!(fb.draw_sprite(10, 10, sprite));
        assert_eq!(fb.lit_pixels(), 0);
    }

    #[test]
    fn test_draw_wraps_horizontally() {
        let mut fb = Framebuffer::new();
        fb.draw_sprite(63, 0, &[0b1100_0000]);

        assert!(fb.pixel(63, 0));
        assert!(fb.pixel(0, 0));
        assert_eq!(fb.lit_pixels(), 2);
    }

    #[test]
    fn test_draw_wraps_vertically() {
        let mut fb = Framebuffer::new();
        fb.draw_sprite(0, 31, &[0x80, 0x80]);

        assert!(fb.pixel(0, 31));
        assert!(fb.pixel(0, 0));
    }

    #[test]
    fn test_blank_sprite_does_not_request_redraw() {
        let mut fb = Framebuffer::new();
        assert!(!fb.draw_sprite(0, 0, &[0x00, 0x00]));
        assert!(!fb.redraw_requested());
    }

    #[test]
    fn test_clear() {
        let mut fb = Framebuffer::new();
        fb.draw_sprite(0, 0, &[0xFF]);
        fb.acknowledge_redraw();

        fb.clear();
        assert_eq!(fb.lit_pixels(), 0);
        assert!(fb.redraw_requested());
    }

    #[test]
    fn test_rows() {
        let mut fb = Framebuffer::new();
        fb.draw_sprite(1, 1, &[0x80]);
        let rows: Vec<_> = fb.rows().collect();

        assert_eq!(rows.len(), DISPLAY_HEIGHT);
        assert!(rows[1][1]);
        assert!(!rows[0][1]);
    }
}
