/// Hardware buffering targets requested during negotiation.
///
/// Every value is a "near" request; the device is free to round each one and the
/// granted values are reported back in [`NegotiatedParams`](crate::negotiate::NegotiatedParams).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiationPolicy {
    /// Period size target in frames.
    pub period_frames: usize,
    /// Total hardware buffer target in microseconds.
    pub buffer_time_us: u32,
    /// Period duration target in microseconds.
    pub period_time_us: u32,
}

impl NegotiationPolicy {
    pub const DEFAULT_PERIOD_FRAMES: usize = 128;
    pub const DEFAULT_BUFFER_TIME_US: u32 = 1_000_000;
    pub const DEFAULT_PERIOD_TIME_US: u32 = 100_000;
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            period_frames: Self::DEFAULT_PERIOD_FRAMES,
            buffer_time_us: Self::DEFAULT_BUFFER_TIME_US,
            period_time_us: Self::DEFAULT_PERIOD_TIME_US,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_targets() {
        let policy = NegotiationPolicy::default();
        assert_eq!(policy.period_frames, 128);
        assert_eq!(policy.buffer_time_us, 1_000_000);
        assert_eq!(policy.period_time_us, 100_000);
    }
}
