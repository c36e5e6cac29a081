use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;

/// What `/monitor` reports. Field names are part of the wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    #[serde(rename = "handleLine")]
    pub handle_line: u64,
    pub tps: f64,
    #[serde(rename = "readChanLen")]
    pub read_chan_len: usize,
    #[serde(rename = "writeChanLen")]
    pub write_chan_len: usize,
    #[serde(rename = "runTime")]
    pub run_time: String,
    #[serde(rename = "errNum")]
    pub err_num: u64,
}

impl MetricsSnapshot {
    /// Serialize with one tab per indent level.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(160);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(buf)
    }
}

/// Render a duration as `1h2m3.5s`, `4m0s`, `1.5s` or `250ms`.
///
/// Hours and minutes are only shown once they are non-zero; sub-second
/// durations switch to `ms`, `µs` or `ns`.
pub fn format_uptime(d: Duration) -> String {
    let nanos = d.as_nanos();
    match nanos {
        0 => return "0s".to_string(),
        1..=999 => return format!("{nanos}ns"),
        1_000..=999_999 => return format!("{}µs", decimal(nanos, 1_000)),
        1_000_000..=999_999_999 => return format!("{}ms", decimal(nanos, 1_000_000)),
        _ => {}
    }

    let secs = d.as_secs();
    let hours = secs / 3600;
    let minutes = secs % 3600 / 60;
    let rest = u128::from(secs % 60) * 1_000_000_000 + u128::from(d.subsec_nanos());

    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    let _ = write!(out, "{}s", decimal(rest, 1_000_000_000));
    out
}

/// `value / unit` with trailing fractional zeros removed.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let digits = format!("{frac:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
