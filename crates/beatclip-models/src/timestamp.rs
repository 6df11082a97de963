//! Second-granularity time helpers.
//!
//! The pipeline works in whole output seconds; these helpers map between
//! media timestamps (fractional seconds) and second indices.

/// Number of whole output seconds needed to cover `duration` seconds.
///
/// # Examples
/// ```
/// use beatclip_models::timestamp::whole_seconds;
/// assert_eq!(whole_seconds(10.0), 10);
/// assert_eq!(whole_seconds(10.2), 11);
/// assert_eq!(whole_seconds(-1.0), 0);
/// ```
pub fn whole_seconds(duration: f64) -> usize {
    if !duration.is_finite() || duration <= 0.0 {
        return 0;
    }
    duration.ceil() as usize
}

/// Index of the second containing `time`, if `time` is a valid timestamp.
pub fn second_of(time: f64) -> Option<usize> {
    if !time.is_finite() || time < 0.0 {
        return None;
    }
    Some(time.floor() as usize)
}

/// Midpoint timestamp of a second.
pub fn second_midpoint(second_index: usize) -> f64 {
    second_index as f64 + 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_seconds_rounds_up() {
        assert_eq!(whole_seconds(0.0), 0);
        assert_eq!(whole_seconds(0.1), 1);
        assert_eq!(whole_seconds(59.0), 59);
        assert_eq!(whole_seconds(f64::NAN), 0);
    }

    #[test]
    fn test_second_of() {
        assert_eq!(second_of(0.0), Some(0));
        assert_eq!(second_of(0.9), Some(0));
        assert_eq!(second_of(7.5), Some(7));
        assert_eq!(second_of(-0.1), None);
        assert_eq!(second_of(f64::INFINITY), None);
    }
}
