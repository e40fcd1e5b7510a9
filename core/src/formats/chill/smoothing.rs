/// Units in a full circle for CHILL antenna angles.
pub const CHILL_CIRCLE: i32 = 4096;

const SMALL_STEP: i32 = 64;
const WRAP_STEP: i32 = 4000;

/// Averages an antenna angle with the previous reading.
///
/// Small steps are averaged and steps across the 0/4096 seam are averaged in
/// signed space; anything in between is passed through unchanged. The
/// result is always in `0..CHILL_CIRCLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AngleSmoother {
    last: i32,
}

impl Default for AngleSmoother {
    fn default() -> Self {
        Self { last: CHILL_CIRCLE / 2 }
    }
}

impl AngleSmoother {
    pub fn smooth(&mut self, raw: i32) -> i32 {
        let mut this = raw;
        let step = (this - self.last).abs();
        let smoothed = if step < SMALL_STEP {
            (this + self.last + 1) >> 1
        } else if step > WRAP_STEP {
            let half = CHILL_CIRCLE / 2;
            if this >= half {
                this -= CHILL_CIRCLE;
            }
            let last = if self.last >= half {
                self.last - CHILL_CIRCLE
            } else {
                self.last
            };
            (this + last + 1) >> 1
        } else {
            this
        };
        self.last = this;
        smoothed.rem_euclid(CHILL_CIRCLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_steps_are_averaged() {
        let mut smoother = AngleSmoother::default();
        smoother.smooth(100);
        assert_eq!(smoother.smooth(102), 101);
    }

    #[test]
    fn wrap_is_averaged_across_the_seam() {
        let mut smoother = AngleSmoother::default();
        smoother.smooth(4090);
        assert_eq!(smoother.smooth(10), 2);
    }

    #[test]
    fn small_step_after_seam_wraps() {
        let mut smoother = AngleSmoother::default();
        let smoothed: Vec<i32> = [10, 4090, 0].iter().map(|&raw| smoother.smooth(raw)).collect();
        assert_eq!(smoothed, vec![10, 2, 4093]);
    }

    #[test]
    fn wrap_backwards_stays_in_range() {
        let mut smoother = AngleSmoother::default();
        smoother.smooth(4);
        let smoothed = smoother.smooth(4080);
        assert_eq!(smoothed, 4090);
    }

    #[test]
    fn large_jumps_pass_through() {
        let mut smoother = AngleSmoother::default();
        smoother.smooth(100);
        assert_eq!(smoother.smooth(1100), 1100);
    }
}
