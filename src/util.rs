pub const JOULES_PER_KWH: f64 = 3_600_000.0;

/// Distance travelled by a counter that rolls over to zero after `max`.
pub fn counter_delta(current: u64, initial: u64, max: u64) -> u64 {
    if current >= initial {
        current - initial
    } else {
        max.saturating_sub(initial) + current
    }
}

pub fn joules_to_kwh(joules: f64) -> f64 {
    joules / JOULES_PER_KWH
}
