use super::{MAX_HEIGHT, MAX_WIDTH, RenderError};

/// Character raster. Out of bounds writes are clipped.
#[derive(Debug, Clone, PartialEq)]
pub struct TextCanvas {
    width: usize,
    height: usize,
    cells: Vec<char>,
}

impl TextCanvas {
    pub fn new(width: usize, height: usize) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::ZeroSize { width, height });
        }
        if width > MAX_WIDTH || height > MAX_HEIGHT {
            return Err(RenderError::TooLarge { width, height });
        }
        let size = width
            .checked_mul(height)
            .ok_or(RenderError::TooLarge { width, height })?;
        Ok(Self {
            width,
            height,
            cells: vec![' '; size],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[cfg(test)]
    pub fn get(&self, x: usize, y: usize) -> Option<char> {
        if x < self.width && y < self.height {
            Some(self.cells[y * self.width + x])
        } else {
            None
        }
    }

    /// Writes `glyph` at the cell nearest to (x, y)
    pub fn plot(&mut self, x: f64, y: f64, glyph: char) {
        let (x, y) = (x.round(), y.round());
        if x < 0.0 || y < 0.0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = glyph;
        }
    }

    /// Writes `text` left to right, starting at (x, y)
    pub fn text(&mut self, x: f64, y: f64, text: &str) {
        for (offset, c) in text.chars().enumerate() {
            self.plot(x + offset as f64, y, c);
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.cells
            .chunks(self.width)
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
            .collect()
    }
}
