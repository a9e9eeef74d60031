//! Sample interpolation modes

/// How the mixer reads between sample frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Nearest neighbor (no interpolation)
    Nearest,
    /// Linear interpolation between two frames
    Linear,
    /// Four-point cubic (Catmull-Rom) spline
    #[default]
    Spline,
}

impl Interpolation {
    /// All modes, in index order
    pub const ALL: [Self; 3] = [Self::Nearest, Self::Linear, Self::Spline];

    /// Mode for a numeric index (0 = nearest, 1 = linear, 2 = spline)
    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(Self::Nearest),
            1 => Some(Self::Linear),
            2 => Some(Self::Spline),
            _ => None,
        }
    }

    pub fn index(self) -> i32 {
        match self {
            Self::Nearest => 0,
            Self::Linear => 1,
            Self::Spline => 2,
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Nearest => "Nearest Neighbor",
            Self::Linear => "Linear",
            Self::Spline => "Spline",
        }
    }

    /// Interpolate at `frac` (0..1) past frame 0
    ///
    /// `frame(offset)` returns the frame at the given offset from the current
    /// integer position; the mixer resolves loop wrap-around there.
    #[inline]
    pub(crate) fn sample(self, frame: impl Fn(isize) -> f32, frac: f32) -> f32 {
        match self {
            Self::Nearest => frame(0),
            Self::Linear => {
                let a = frame(0);
                a + (frame(1) - a) * frac
            }
            Self::Spline => {
                let p0 = frame(-1);
                let p1 = frame(0);
                let p2 = frame(1);
                let p3 = frame(2);
                let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
                let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
                let c = -0.5 * p0 + 0.5 * p2;
                ((a * frac + b) * frac + c) * frac + p1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAMP: [f32; 4] = [0.0, 1.0, 2.0, 3.0];

    fn ramp(offset: isize) -> f32 {
        RAMP[(1 + offset) as usize]
    }

    #[test]
    fn test_index_roundtrip_and_names() {
        for mode in Interpolation::ALL {
            assert_eq!(Interpolation::from_index(mode.index()), Some(mode));
        }
        assert_eq!(Interpolation::from_index(3), None);
        assert_eq!(Interpolation::from_index(-1), None);
        assert_eq!(Interpolation::Nearest.name(), "Nearest Neighbor");
        assert_eq!(Interpolation::default(), Interpolation::Spline);
    }

    #[test]
    fn test_interpolation_on_a_ramp() {
        // Frame 0 of the ramp is 1.0, frame 1 is 2.0
        assert_eq!(Interpolation::Nearest.sample(ramp, 0.5), 1.0);
        assert_eq!(Interpolation::Linear.sample(ramp, 0.25), 1.25);
        // A cubic through collinear points stays on the line
        assert!((Interpolation::Spline.sample(ramp, 0.5) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_spline_hits_frames_exactly() {
        assert_eq!(Interpolation::Spline.sample(ramp, 0.0), 1.0);
        assert!((Interpolation::Spline.sample(ramp, 1.0) - 2.0).abs() < 1e-6);
    }
}
