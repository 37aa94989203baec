use indicatif::{ProgressBar, ProgressStyle};
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use regex::Regex;
use std::sync::LazyLock;

// --- SHARED SPINNER ---
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

// --- RESOURCE QUANTITIES ---

/// Number, then an optional exponent, binary suffix or decimal suffix.
/// e.g. "250m", "1.5", "128Mi", "1e3", "500000n"
static QUANTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?(\d+)?(?:\.(\d*))?([eE][+-]?\d+|Ki|Mi|Gi|Ti|Pi|Ei|[numkMGTPE])?$")
        .expect("quantity regex is valid")
});

/// Parses a quantity and scales it by 10^`scale10`, rounding up like
/// apimachinery's `MilliValue()`/`Value()` do.
fn scaled_value(raw: &str, scale10: i32) -> Option<u64> {
    let caps = QUANTITY_REGEX.captures(raw.trim())?;
    let int_part = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let frac_part = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let (exp10, bin_shift): (i32, u32) = match caps.get(3).map(|m| m.as_str()) {
        None => (0, 0),
        Some("Ki") => (0, 10),
        Some("Mi") => (0, 20),
        Some("Gi") => (0, 30),
        Some("Ti") => (0, 40),
        Some("Pi") => (0, 50),
        Some("Ei") => (0, 60),
        Some("n") => (-9, 0),
        Some("u") => (-6, 0),
        Some("m") => (-3, 0),
        Some("k") => (3, 0),
        Some("M") => (6, 0),
        Some("G") => (9, 0),
        Some("T") => (12, 0),
        Some("P") => (15, 0),
        Some("E") => (18, 0),
        Some(exp) => (exp[1..].parse().ok()?, 0),
    };

    let digits: u128 = format!("{int_part}{frac_part}").parse().ok()?;
    let mantissa = digits.checked_mul(1u128 << bin_shift)?;
    let power = exp10
        .checked_add(scale10)?
        .checked_sub(i32::try_from(frac_part.len()).ok()?)?;

    let value = if power >= 0 {
        mantissa.checked_mul(10u128.checked_pow(power as u32)?)?
    } else {
        match 10u128.checked_pow(power.unsigned_abs()) {
            Some(divisor) => mantissa.div_ceil(divisor),
            // divisor larger than anything representable: only the rounding survives
            None => u128::from(mantissa > 0),
        }
    };
    Some(u64::try_from(value).unwrap_or(u64::MAX))
}

/// CPU quantity in millicores ("250m" -> 250, "1" -> 1000).
pub fn parse_cpu_millis(raw: &str) -> Option<u64> {
    scaled_value(raw, 3)
}

/// Memory quantity in bytes ("128Mi" -> 134217728, "1G" -> 1000000000).
pub fn parse_memory_bytes(raw: &str) -> Option<u64> {
    scaled_value(raw, 0)
}

pub fn cpu_millis(q: Option<&Quantity>) -> u64 {
    quantity_or_zero(q, parse_cpu_millis)
}

pub fn memory_bytes(q: Option<&Quantity>) -> u64 {
    quantity_or_zero(q, parse_memory_bytes)
}

fn quantity_or_zero(q: Option<&Quantity>, parse: fn(&str) -> Option<u64>) -> u64 {
    let Some(q) = q else { return 0 };
    parse(&q.0).unwrap_or_else(|| {
        log::warn!("ignoring unparseable resource quantity {:?}", q.0);
        0
    })
}

/// A container's request for `key` ("cpu" or "memory").
pub fn requested<'a>(resources: Option<&'a ResourceRequirements>, key: &str) -> Option<&'a Quantity> {
    resources.and_then(|r| r.requests.as_ref()).and_then(|m| m.get(key))
}

/// A container's limit for `key` ("cpu" or "memory").
pub fn limited<'a>(resources: Option<&'a ResourceRequirements>, key: &str) -> Option<&'a Quantity> {
    resources.and_then(|r| r.limits.as_ref()).and_then(|m| m.get(key))
}
