use std::time::Duration;

const NS_PER_US: u128 = 1_000;
const NS_PER_MS: u128 = 1_000_000;
const NS_PER_S: u128 = 1_000_000_000;

/// Single rounded component in `us`, `ms` or `s`, with two decimals above microseconds.
pub(crate) fn format_duration(d: Duration) -> String {
    let ns = d.as_nanos();

    if ns >= NS_PER_S {
        return format!("{:.2}s", d.as_secs_f64());
    }
    if ns >= NS_PER_MS {
        return format!("{:.2}ms", ns as f64 / NS_PER_MS as f64);
    }
    // Round to nearest integer (ties round up).
    format!("{}us", (ns + NS_PER_US / 2) / NS_PER_US)
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.2}")
    } else {
        "0".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_pick_one_unit() {
        assert_eq!(format_duration(Duration::ZERO), "0us");
        assert_eq!(format_duration(Duration::from_nanos(1_500)), "2us");
        assert_eq!(format_duration(Duration::from_micros(2_346)), "2.35ms");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1.50s");
    }

    #[test]
    fn rates_ignore_non_finite_values() {
        assert_eq!(format_rate(12.346), "12.35");
        assert_eq!(format_rate(f64::INFINITY), "0");
        assert_eq!(format_rate(f64::NAN), "0");
    }
}
