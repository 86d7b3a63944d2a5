use crate::connection::ConnectionInfo;
use crate::types::{ECO_THRESHOLD, OptimizationLevel};

/// Intensity above which images are always served aggressively.
const AGGRESSIVE_INTENSITY: f64 = 500.0;
/// Downlink (Mbps) below which the connection is treated as constrained.
const SLOW_DOWNLINK_MBPS: f64 = 1.5;
/// Downlink (Mbps) above which the connection is treated as fast.
const FAST_DOWNLINK_MBPS: f64 = 10.0;

/// Pick the image optimization level for a client connection under the
/// given grid intensity. Pure; repeated calls with equal inputs agree.
pub fn level_for(connection: &ConnectionInfo, intensity: f64) -> OptimizationLevel {
    use OptimizationLevel::{Aggressive, Medium, Minimal};

    let mut level = if intensity > AGGRESSIVE_INTENSITY {
        Aggressive
    } else if intensity < ECO_THRESHOLD {
        Minimal
    } else {
        Medium
    };

    match connection.effective_type.as_str() {
        _ if connection.save_data => level = Aggressive,
        "slow-2g" | "2g" => level = Aggressive,
        "3g" => level = level.max(Medium),
        "4g" if level == Minimal => level = Medium,
        _ => {}
    }

    if let Some(downlink) = connection.downlink_mbps {
        if downlink < SLOW_DOWNLINK_MBPS {
            level = Aggressive;
        } else if downlink > FAST_DOWNLINK_MBPS && level != Aggressive {
            level = if intensity < ECO_THRESHOLD { Minimal } else { Medium };
        }
    }

    level
}
