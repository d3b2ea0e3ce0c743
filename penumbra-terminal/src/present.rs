/// Terminal presentation of rendered frames
use std::io::Write;

use crossterm::{
    cursor::MoveTo,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    QueueableCommand,
};

use crate::raster::Frame;

/// Character luminosity ramp for shading (darkest to lightest)
const LUMINOSITY_RAMP: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

const UPPER_HALF_BLOCK: char = '\u{2580}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentMode {
    /// Two pixels per cell: the top one as the glyph colour of an upper half
    /// block, the bottom one as the cell background.
    #[default]
    HalfBlock,
    /// One ramp character per cell, coloured with the mean of its two pixels.
    Ascii,
}

/// Writes frames to a terminal. Every cell covers two vertically adjacent
/// pixels, so a frame for an `cols x rows` terminal is `cols x 2*rows`.
#[derive(Debug, Clone)]
pub struct Presenter {
    mode: PresentMode,
    /// Rows kept free at the top for the status line.
    top_margin: u16,
}

impl Presenter {
    pub fn new(mode: PresentMode, top_margin: u16) -> Self {
        Self { mode, top_margin }
    }

    pub fn mode(&self) -> PresentMode {
        self.mode
    }

    /// Frame size in pixels for a terminal of the given size.
    pub fn frame_size(&self, columns: u16, rows: u16) -> (u32, u32) {
        let rows = rows.saturating_sub(self.top_margin).max(1);
        (columns.max(1) as u32, rows as u32 * 2)
    }

    pub fn draw<W: Write>(&self, frame: &Frame, writer: &mut W) -> std::io::Result<()> {
        for row in 0..frame.height() / 2 {
            writer.queue(MoveTo(0, row as u16 + self.top_margin))?;

            let mut foreground = None;
            let mut background = None;
            for x in 0..frame.width() {
                let top = frame.rgb8(x, row * 2);
                let bottom = frame.rgb8(x, row * 2 + 1);

                let (glyph, fg, bg) = match self.mode {
                    PresentMode::HalfBlock => (UPPER_HALF_BLOCK, rgb(top), Some(rgb(bottom))),
                    PresentMode::Ascii => {
                        let mean = average(top, bottom);
                        (ramp_char(luminance(mean)), rgb(mean), None)
                    }
                };

                if foreground != Some(fg) {
                    writer.queue(SetForegroundColor(fg))?;
                    foreground = Some(fg);
                }
                if let Some(bg) = bg {
                    if background != Some(bg) {
                        writer.queue(SetBackgroundColor(bg))?;
                        background = Some(bg);
                    }
                }
                writer.queue(Print(glyph))?;
            }
        }
        writer.queue(ResetColor)?;
        Ok(())
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb { r, g, b }
}

fn average(a: (u8, u8, u8), b: (u8, u8, u8)) -> (u8, u8, u8) {
    let mean = |x: u8, y: u8| ((x as u16 + y as u16) / 2) as u8;
    (mean(a.0, b.0), mean(a.1, b.1), mean(a.2, b.2))
}

/// Relative luminance in [0, 1].
fn luminance((r, g, b): (u8, u8, u8)) -> f32 {
    (0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32) / 255.0
}

/// Map brightness to character
fn ramp_char(brightness: f32) -> char {
    let index = (brightness.clamp(0.0, 1.0) * (LUMINOSITY_RAMP.len() - 1) as f32) as usize;
    LUMINOSITY_RAMP[index.min(LUMINOSITY_RAMP.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::SoftwareGpu;
    use penumbra_core::Gpu;

    fn solid_frame(width: u32, height: u32, colour: [f32; 4]) -> Frame {
        let software = SoftwareGpu::new(width, height);
        software.clear(Some(colour), true);
        software.present();
        software.frame().unwrap()
    }

    #[test]
    fn test_ramp_ends() {
        assert_eq!(ramp_char(0.0), ' ');
        assert_eq!(ramp_char(1.0), '@');
        assert_eq!(ramp_char(7.0), '@');
        assert_eq!(ramp_char(-1.0), ' ');
    }

    #[test]
    fn test_frame_size_reserves_status_line() {
        let presenter = Presenter::new(PresentMode::HalfBlock, 1);
        assert_eq!(presenter.frame_size(80, 24), (80, 46));
        assert_eq!(presenter.frame_size(0, 0), (1, 2));
    }

    #[test]
    fn test_half_block_output() {
        let frame = solid_frame(3, 4, [1.0, 0.0, 0.0, 1.0]);
        let mut out = Vec::new();
        Presenter::new(PresentMode::HalfBlock, 0).draw(&frame, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches(UPPER_HALF_BLOCK).count(), 6);
        // one colour change per row on a solid frame
        assert_eq!(text.matches("38;2;255;0;0").count(), 2);
    }

    #[test]
    fn test_ascii_output_uses_ramp() {
        let frame = solid_frame(4, 2, [1.0, 1.0, 1.0, 1.0]);
        let mut out = Vec::new();
        Presenter::new(PresentMode::Ascii, 0).draw(&frame, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches('@').count(), 4);
    }
}
