//! Security limits and configuration

/// Limits bounding work and allocation during encode and decode.
///
/// A value of zero means unbounded for every knob except
/// `max_recursion_depth`, which is always enforced.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum nesting depth of containers and references
    pub max_recursion_depth: usize,
    /// Maximum entries per sequence (0: unbounded)
    pub max_num_array_entries: usize,
    /// Maximum pairs per mapping (0: unbounded)
    pub max_num_map_entries: usize,
    /// Maximum byte length per string (0: unbounded)
    pub max_string_length: usize,
    /// Maximum uncompressed body size accepted from a compression frame
    /// (0: unbounded); guards against decompression bombs
    pub max_uncompressed_body_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 10_000,
            max_num_array_entries: 0,
            max_num_map_entries: 0,
            max_string_length: 0,
            max_uncompressed_body_size: 0,
        }
    }
}

impl Limits {
    /// True when `count` exceeds a nonzero limit
    pub fn exceeds(limit: usize, count: usize) -> bool {
        limit != 0 && count > limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_unbounded() {
        assert!(!Limits::exceeds(0, usize::MAX));
        assert!(Limits::exceeds(3, 4));
        assert!(!Limits::exceeds(3, 3));
    }
}
