//! Moving-window shapes and D8 direction tables

/// Shape of a moving window centred on a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighborhood {
    /// Square window of given radius (side = 2r + 1)
    Square(usize),
    /// Circular window of given radius (in cells)
    Circle(usize),
}

impl Neighborhood {
    /// Square window with an odd side length. Even sizes round up.
    pub fn square_of_size(size: usize) -> Self {
        Neighborhood::Square(size / 2)
    }

    /// Get the radius of the neighborhood
    pub fn radius(&self) -> usize {
        match self {
            Neighborhood::Square(r) | Neighborhood::Circle(r) => *r,
        }
    }

    /// Get the size of the neighborhood (width and height)
    pub fn size(&self) -> usize {
        self.radius() * 2 + 1
    }

    /// Check if a relative position is within this neighborhood
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        match self {
            Neighborhood::Square(r) => {
                let r = *r as isize;
                dr.abs() <= r && dc.abs() <= r
            }
            Neighborhood::Circle(r) => {
                let r = *r as f64;
                ((dr * dr + dc * dc) as f64).sqrt() <= r
            }
        }
    }

    /// Relative positions covered by this neighborhood, center included
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        let mut offsets = Vec::with_capacity(self.size() * self.size());

        for dr in -r..=r {
            for dc in -r..=r {
                if self.contains(dr, dc) {
                    offsets.push((dr, dc));
                }
            }
        }

        offsets
    }
}

/// D8 flow directions (standard encoding)
pub mod d8 {
    /// Direction offsets: (row_offset, col_offset)
    /// Indexed by direction code (1-8), 0 is unused
    pub const OFFSETS: [(isize, isize); 9] = [
        (0, 0),   // 0: no flow / pit
        (0, 1),   // 1: E
        (-1, 1),  // 2: NE
        (-1, 0),  // 3: N
        (-1, -1), // 4: NW
        (0, -1),  // 5: W
        (1, -1),  // 6: SW
        (1, 0),   // 7: S
        (1, 1),   // 8: SE
    ];

    /// Distance multipliers for each direction
    pub const DISTANCES: [f64; 9] = [
        0.0,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
        1.0,
        std::f64::consts::SQRT_2,
    ];

    /// Get the opposite direction
    pub fn opposite(dir: u8) -> u8 {
        if dir == 0 { 0 } else { ((dir - 1 + 4) % 8) + 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighborhood_offsets() {
        assert_eq!(Neighborhood::Square(1).offsets().len(), 9);
        assert_eq!(Neighborhood::Square(2).offsets().len(), 25);
        // radius-1 circle drops the corners
        assert_eq!(Neighborhood::Circle(1).offsets().len(), 5);
        assert_eq!(Neighborhood::square_of_size(3), Neighborhood::Square(1));
        assert_eq!(Neighborhood::square_of_size(1).offsets(), vec![(0, 0)]);
    }

    #[test]
    fn test_d8_opposite() {
        assert_eq!(d8::opposite(1), 5); // E -> W
        assert_eq!(d8::opposite(3), 7); // N -> S
        assert_eq!(d8::opposite(2), 6); // NE -> SW
        assert_eq!(d8::opposite(0), 0);
    }
}
