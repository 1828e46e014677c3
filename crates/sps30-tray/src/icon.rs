//! Procedurally drawn application and tray icons.
//!
//! The icon is a filled disc in the status colour with a darker rim, so the
//! tray reflects the sampler state at a glance without shipping image assets.

use std::sync::Arc;

use eframe::egui::IconData;

/// Side length of the tray icon in pixels.
pub const TRAY_ICON_SIZE: u32 = 32;
/// Side length of the window icon in pixels.
pub const WINDOW_ICON_SIZE: u32 = 64;

/// What the icon colour signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconStatus {
    /// A reading arrived recently.
    Connected,
    /// No recent reading: searching for the sensor or polls failing.
    Disconnected,
    Paused,
}

impl IconStatus {
    /// Fill colour as RGB.
    pub fn color(&self) -> (u8, u8, u8) {
        match self {
            IconStatus::Connected => (46, 160, 67),
            IconStatus::Disconnected => (218, 54, 51),
            IconStatus::Paused => (128, 128, 128),
        }
    }
}

/// Render a `size` x `size` RGBA image of the status disc.
pub fn render_rgba(status: IconStatus, size: u32) -> Vec<u8> {
    let (r, g, b) = status.color();
    let rim = (r / 2, g / 2, b / 2);

    let center = size as f32 / 2.0;
    let outer = center - 1.0;
    let inner = outer - (size as f32 / 10.0).max(1.0);

    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 + 0.5 - center;
            let dy = y as f32 + 0.5 - center;
            let dist = (dx * dx + dy * dy).sqrt();

            let pixel = if dist <= inner {
                [r, g, b, 255]
            } else if dist <= outer {
                [rim.0, rim.1, rim.2, 255]
            } else if dist <= outer + 1.0 {
                // One pixel of anti-aliasing on the edge.
                let alpha = ((outer + 1.0 - dist) * 255.0) as u8;
                [rim.0, rim.1, rim.2, alpha]
            } else {
                [0, 0, 0, 0]
            };
            rgba.extend_from_slice(&pixel);
        }
    }
    rgba
}

/// Window icon for the eframe viewport.
pub fn window_icon() -> Arc<IconData> {
    Arc::new(IconData {
        rgba: render_rgba(IconStatus::Connected, WINDOW_ICON_SIZE),
        width: WINDOW_ICON_SIZE,
        height: WINDOW_ICON_SIZE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(rgba: &[u8], size: u32, x: u32, y: u32) -> &[u8] {
        let i = ((y * size + x) * 4) as usize;
        &rgba[i..i + 4]
    }

    #[test]
    fn test_render_size() {
        let rgba = render_rgba(IconStatus::Connected, TRAY_ICON_SIZE);
        assert_eq!(rgba.len(), (TRAY_ICON_SIZE * TRAY_ICON_SIZE * 4) as usize);
    }

    #[test]
    fn test_corners_are_transparent() {
        let size = TRAY_ICON_SIZE;
        let rgba = render_rgba(IconStatus::Paused, size);
        for (x, y) in [(0, 0), (size - 1, 0), (0, size - 1), (size - 1, size - 1)] {
            assert_eq!(pixel(&rgba, size, x, y)[3], 0, "corner ({x}, {y})");
        }
    }

    #[test]
    fn test_center_uses_status_color() {
        let size = TRAY_ICON_SIZE;
        for status in [
            IconStatus::Connected,
            IconStatus::Disconnected,
            IconStatus::Paused,
        ] {
            let rgba = render_rgba(status, size);
            let (r, g, b) = status.color();
            assert_eq!(pixel(&rgba, size, size / 2, size / 2), [r, g, b, 255]);
        }
    }

    #[test]
    fn test_window_icon_dimensions() {
        let icon = window_icon();
        assert_eq!(icon.width, WINDOW_ICON_SIZE);
        assert_eq!(icon.rgba.len(), (WINDOW_ICON_SIZE * WINDOW_ICON_SIZE * 4) as usize);
    }
}
