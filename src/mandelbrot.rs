/// Square Mandelbrot render over a fixed region of the complex plane.
///
/// The work unit handed to the scheduler is one image row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MandelbrotParams {
    /// Width and height in pixels
    pub size: usize,
    pub max_iterations: u32,
    pub escape_radius: f64,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl MandelbrotParams {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn pixel_width(&self) -> f64 {
        (self.x_max - self.x_min) / self.size as f64
    }

    pub fn pixel_height(&self) -> f64 {
        (self.y_max - self.y_min) / self.size as f64
    }

    /// Imaginary part of a row; snapped to the real axis within half a pixel.
    pub fn row_imaginary(&self, row: usize) -> f64 {
        let pixel_height = self.pixel_height();
        let cy = self.y_min + row as f64 * pixel_height;
        if cy.abs() < pixel_height / 2.0 {
            0.0
        } else {
            cy
        }
    }

    /// Total escape iterations over one row.
    pub fn row_iterations(&self, row: usize) -> u64 {
        let cy = self.row_imaginary(row);
        let pixel_width = self.pixel_width();
        let er2 = self.escape_radius * self.escape_radius;

        (0..self.size)
            .map(|col| {
                let cx = self.x_min + col as f64 * pixel_width;
                escape_time(cx, cy, self.max_iterations, er2) as u64
            })
            .sum()
    }
}

impl Default for MandelbrotParams {
    fn default() -> Self {
        Self {
            size: 1000,
            max_iterations: 500,
            escape_radius: 2.0,
            x_min: -2.5,
            x_max: 1.5,
            y_min: -2.0,
            y_max: 2.0,
        }
    }
}

/// Iterations until `z` leaves the escape circle, capped at `max_iterations`.
#[inline]
pub fn escape_time(cx: f64, cy: f64, max_iterations: u32, escape_radius_sq: f64) -> u32 {
    let (mut zx, mut zy) = (0.0f64, 0.0f64);
    let (mut zx2, mut zy2) = (0.0f64, 0.0f64);
    let mut iteration = 0;
    while iteration < max_iterations && zx2 + zy2 < escape_radius_sq {
        zy = 2.0 * zx * zy + cy;
        zx = zx2 - zy2 + cx;
        zx2 = zx * zx;
        zy2 = zy * zy;
        iteration += 1;
    }
    iteration
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_time() {
        // Origin and -1 are in the set
        assert_eq!(escape_time(0.0, 0.0, 500, 4.0), 500);
        assert_eq!(escape_time(-1.0, 0.0, 500, 4.0), 500);
        // Far outside escapes after the first step
        assert_eq!(escape_time(2.0, 2.0, 500, 4.0), 1);
        assert!(escape_time(0.5, 0.5, 500, 4.0) < 10);
    }

    #[test]
    fn test_row_on_real_axis_is_snapped() {
        let params = MandelbrotParams::new(10);
        // Row 5 of 10 sits on the real axis
        assert_eq!(params.row_imaginary(5), 0.0);
        assert!((params.row_imaginary(0) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_row_iterations() {
        let params = MandelbrotParams::new(64).with_max_iterations(100);
        let middle = params.row_iterations(32);
        let edge = params.row_iterations(0);
        // The middle row crosses the set; the top row barely iterates
        assert!(middle > edge);
        assert_eq!(middle, params.row_iterations(32));
        assert!(edge >= 64);
    }
}
